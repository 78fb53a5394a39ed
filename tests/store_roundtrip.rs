//! Persistence round-trip tests against a file-backed medium.

use idstore::{FileMedium, RamMedium, Store, StoreConfig};
use tempfile::TempDir;

const CAPACITY: usize = 4096;

fn config() -> StoreConfig {
    StoreConfig { entry_slots: 8 }
}

#[test]
fn test_provisioning_scenario() {
    // Fresh 4096-byte region, 8 entry slots.
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("identity.bin");

    {
        let medium = FileMedium::create(&path, CAPACITY).unwrap();
        let mut store = Store::init_with(medium, config()).unwrap();
        assert_eq!(store.get_count(), 0);

        store.write("serial", 0, b"SN-0001").unwrap();
        assert_eq!(store.get_data_length("serial").unwrap(), 7);

        let mut buf = [0u8; 4];
        store.read("serial", 3, &mut buf).unwrap();
        assert_eq!(&buf, b"0001");

        store.save().unwrap();
    }

    // Reopen the same medium.
    let medium = FileMedium::open(&path, CAPACITY).unwrap();
    let store = Store::init(medium).unwrap();

    assert_eq!(store.get_count(), 1);
    let mut buf = [0u8; 7];
    store.read("serial", 0, &mut buf).unwrap();
    assert_eq!(&buf, b"SN-0001");
}

#[test]
fn test_multiple_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("identity.bin");

    {
        let medium = FileMedium::create(&path, CAPACITY).unwrap();
        let mut store = Store::init_with(medium, config()).unwrap();
        store.write("serial", 0, b"SN-0001").unwrap();
        store.write("mac0", 0, &[0x02, 0xAB, 0xCD, 0x00, 0x00, 0x01]).unwrap();
        store.write("calib", 0, &vec![0x5A; 512]).unwrap();
        store.remove("mac0").unwrap();
        store.save().unwrap();
    }

    let store = Store::init(FileMedium::open(&path, CAPACITY).unwrap()).unwrap();
    assert_eq!(store.get_count(), 2);

    let names: Vec<_> = store.names().map(str::to_string).collect();
    assert_eq!(names, vec!["serial", "calib"]);

    let mut calib = vec![0u8; 512];
    store.read("calib", 0, &mut calib).unwrap();
    assert!(calib.iter().all(|&b| b == 0x5A));

    let mut buf = [0u8; 1];
    assert!(store.read("mac0", 0, &mut buf).is_err());
}

#[test]
fn test_generation_increments_across_saves() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("identity.bin");

    {
        let medium = FileMedium::create(&path, CAPACITY).unwrap();
        let mut store = Store::init_with(medium, config()).unwrap();
        store.write("serial", 0, b"SN-0001").unwrap();
        store.save().unwrap();
        assert_eq!(store.generation(), 1);

        store.write("serial", 0, b"SN-0002").unwrap();
        store.save().unwrap();
        assert_eq!(store.generation(), 2);
    }

    let store = Store::init(FileMedium::open(&path, CAPACITY).unwrap()).unwrap();
    assert_eq!(store.generation(), 2);
    let mut buf = [0u8; 7];
    store.read("serial", 0, &mut buf).unwrap();
    assert_eq!(&buf, b"SN-0002");
}

#[test]
fn test_unsaved_mutations_are_discarded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("identity.bin");

    {
        let medium = FileMedium::create(&path, CAPACITY).unwrap();
        let mut store = Store::init_with(medium, config()).unwrap();
        store.write("serial", 0, b"SN-0001").unwrap();
        store.save().unwrap();

        // Mutate without saving; drop discards.
        store.write("serial", 0, b"SN-9999").unwrap();
        store.write("extra", 0, b"junk").unwrap();
        assert!(store.is_dirty());
    }

    let store = Store::init(FileMedium::open(&path, CAPACITY).unwrap()).unwrap();
    assert_eq!(store.get_count(), 1);
    let mut buf = [0u8; 7];
    store.read("serial", 0, &mut buf).unwrap();
    assert_eq!(&buf, b"SN-0001");
}

#[test]
fn test_boot_handover_via_export_import() {
    // Bootloader side: RAM-backed store, exported to a flat buffer.
    let mut boot = Store::init_with(RamMedium::new(CAPACITY), config()).unwrap();
    boot.write("serial", 0, b"SN-0001").unwrap();
    boot.write("key", 0, &[0x11; 32]).unwrap();

    let mut handover = vec![0u8; CAPACITY];
    let len = boot.export(&mut handover).unwrap();
    assert!(len <= CAPACITY);

    // OS side: import the handed-over image, then persist it.
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("identity.bin");
    let medium = FileMedium::create(&path, CAPACITY).unwrap();
    let mut os_store = Store::init_with(medium, config()).unwrap();
    os_store.import(&handover[..len]).unwrap();
    os_store.save().unwrap();

    let reopened = Store::init(FileMedium::open(&path, CAPACITY).unwrap()).unwrap();
    assert_eq!(reopened.get_count(), 2);
    let mut key = [0u8; 32];
    reopened.read("key", 0, &mut key).unwrap();
    assert_eq!(key, [0x11; 32]);
}

#[test]
fn test_save_to_second_medium() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("golden.bin");

    let mut store = Store::init_with(RamMedium::new(CAPACITY), config()).unwrap();
    store.write("serial", 0, b"SN-0001").unwrap();

    let mut golden = FileMedium::create(&path, CAPACITY).unwrap();
    store.save_to(&mut golden).unwrap();

    let reopened = Store::init(FileMedium::open(&path, CAPACITY).unwrap()).unwrap();
    let mut buf = [0u8; 7];
    reopened.read("serial", 0, &mut buf).unwrap();
    assert_eq!(&buf, b"SN-0001");
}

#[test]
fn test_save_to_leaves_primary_pending() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("identity.bin");

    {
        let medium = FileMedium::create(&path, CAPACITY).unwrap();
        let mut store = Store::init_with(medium, config()).unwrap();
        store.write("serial", 0, b"SN-0001").unwrap();

        // Committing to a second medium must not count as saving the
        // primary; the mutation is still pending there.
        let mut golden = RamMedium::new(CAPACITY);
        store.save_to(&mut golden).unwrap();
        assert!(store.is_dirty());

        store.save().unwrap();
        assert!(!store.is_dirty());
    }

    let reopened = Store::init(FileMedium::open(&path, CAPACITY).unwrap()).unwrap();
    assert_eq!(reopened.get_count(), 1);
    let mut buf = [0u8; 7];
    reopened.read("serial", 0, &mut buf).unwrap();
    assert_eq!(&buf, b"SN-0001");
}

#[test]
fn test_overwrite_shrinks_nothing_grows_in_place() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("identity.bin");

    let medium = FileMedium::create(&path, CAPACITY).unwrap();
    let mut store = Store::init_with(medium, config()).unwrap();

    store.write("blob", 0, &[1u8; 100]).unwrap();
    // Overwrite a middle window; length must not change.
    store.write("blob", 40, &[9u8; 20]).unwrap();
    assert_eq!(store.get_data_length("blob").unwrap(), 100);

    let mut buf = [0u8; 100];
    store.read("blob", 0, &mut buf).unwrap();
    assert!(buf[..40].iter().all(|&b| b == 1));
    assert!(buf[40..60].iter().all(|&b| b == 9));
    assert!(buf[60..].iter().all(|&b| b == 1));
}
