//! Property-based tests for the store's read/write and image laws
//!
//! Uses proptest to verify record semantics hold across many random scenarios

use idstore::{RamMedium, Store, StoreConfig};
use proptest::prelude::*;
use std::collections::HashMap;

const CAPACITY: usize = 16 * 1024;

fn fresh_store(entry_slots: usize) -> Store {
    Store::init_with(RamMedium::new(CAPACITY), StoreConfig { entry_slots }).unwrap()
}

fn name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}"
}

proptest! {
    #[test]
    fn prop_write_then_read_identity(
        records in prop::collection::hash_map(
            name_strategy(),
            prop::collection::vec(any::<u8>(), 0..256),
            1..16,
        )
    ) {
        let mut store = fresh_store(16);

        for (name, payload) in &records {
            store.write(name, 0, payload).unwrap();
        }

        prop_assert_eq!(store.get_count(), records.len());
        for (name, payload) in &records {
            prop_assert_eq!(store.get_data_length(name).unwrap(), payload.len());
            let mut buf = vec![0u8; payload.len()];
            let read = store.read(name, 0, &mut buf).unwrap();
            prop_assert_eq!(read, payload.len());
            prop_assert_eq!(&buf, payload, "payload mismatch for {}", name);
        }
    }

    #[test]
    fn prop_sparse_write_zero_fills_gap(
        gap in 1usize..512,
        payload in prop::collection::vec(1u8..=255, 1..64),
    ) {
        let mut store = fresh_store(8);
        store.write("rec", gap, &payload).unwrap();

        prop_assert_eq!(store.get_data_length("rec").unwrap(), gap + payload.len());

        let mut buf = vec![0xAAu8; gap + payload.len()];
        store.read("rec", 0, &mut buf).unwrap();
        prop_assert!(buf[..gap].iter().all(|&b| b == 0), "gap not zero-filled");
        prop_assert_eq!(&buf[gap..], &payload[..]);
    }

    #[test]
    fn prop_export_import_round_trip(
        records in prop::collection::hash_map(
            name_strategy(),
            prop::collection::vec(any::<u8>(), 1..128),
            1..12,
        )
    ) {
        let mut source = fresh_store(16);
        for (name, payload) in &records {
            source.write(name, 0, payload).unwrap();
        }

        let mut image = vec![0u8; CAPACITY];
        let len = source.export(&mut image).unwrap();

        let mut target = fresh_store(16);
        target.import(&image[..len]).unwrap();

        prop_assert_eq!(target.get_count(), records.len());
        for (name, payload) in &records {
            let mut buf = vec![0u8; payload.len()];
            target.read(name, 0, &mut buf).unwrap();
            prop_assert_eq!(&buf, payload);
        }
    }

    #[test]
    fn prop_save_reopen_preserves_records(
        records in prop::collection::hash_map(
            name_strategy(),
            prop::collection::vec(any::<u8>(), 1..128),
            1..12,
        )
    ) {
        let mut store = fresh_store(16);
        for (name, payload) in &records {
            store.write(name, 0, payload).unwrap();
        }
        store.save().unwrap();

        let mut image = vec![0u8; CAPACITY];
        let len = store.export(&mut image).unwrap();

        let reopened =
            Store::init(RamMedium::from_bytes(CAPACITY, &image[..len]).unwrap()).unwrap();
        prop_assert_eq!(reopened.get_count(), records.len());
        for (name, payload) in &records {
            let mut buf = vec![0u8; payload.len()];
            reopened.read(name, 0, &mut buf).unwrap();
            prop_assert_eq!(&buf, payload);
        }
    }

    #[test]
    fn prop_failed_write_leaves_state_unchanged(
        payload in prop::collection::vec(any::<u8>(), 1..64),
    ) {
        let mut store = fresh_store(4);
        store.write("keep", 0, &payload).unwrap();

        let arena_capacity = store.stats().arena_capacity;
        let before = store.stats();

        // Larger than the whole arena, guaranteed to fail.
        let oversized = vec![0u8; arena_capacity + 1];
        prop_assert!(store.write("big", 0, &oversized).is_err());

        let after = store.stats();
        prop_assert_eq!(after.arena_used, before.arena_used);
        prop_assert_eq!(after.live_entries, before.live_entries);

        let mut buf = vec![0u8; payload.len()];
        store.read("keep", 0, &mut buf).unwrap();
        prop_assert_eq!(&buf, &payload);
    }

    #[test]
    fn prop_remove_then_rewrite(
        names in prop::collection::hash_set(name_strategy(), 2..8),
        payload in prop::collection::vec(any::<u8>(), 1..64),
    ) {
        let names: Vec<String> = names.into_iter().collect();
        let mut store = fresh_store(16);

        let mut expected: HashMap<&str, Vec<u8>> = HashMap::new();
        for name in &names {
            store.write(name, 0, &payload).unwrap();
            expected.insert(name, payload.clone());
        }

        // Remove every other record, then write one of them back with
        // different content.
        for name in names.iter().step_by(2) {
            store.remove(name).unwrap();
            expected.remove(name.as_str());
        }
        let revived = &names[0];
        store.write(revived, 0, b"revived").unwrap();
        expected.insert(revived, b"revived".to_vec());

        store.save().unwrap();

        prop_assert_eq!(store.get_count(), expected.len());
        for (name, payload) in &expected {
            let mut buf = vec![0u8; payload.len()];
            store.read(name, 0, &mut buf).unwrap();
            prop_assert_eq!(&buf, payload);
        }
    }
}
