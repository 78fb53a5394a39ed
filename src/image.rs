//! Transfer codec: the flat serialized form of the whole store.
//!
//! The same byte layout serves three paths: `save` (image -> medium),
//! `export`/`import` (image <-> caller buffer, used for the bootloader
//! to OS handover), and `init` (medium -> image -> in-memory model).
//! Serialization always compacts: tombstones are dropped and live
//! payloads are re-packed from arena offset 0 in directory order.

use crate::arena::Arena;
use crate::directory::{DirEntry, Directory, ENTRY_SIZE};
use crate::error::{Result, StoreError};
use crate::header::{Header, CHECKSUM_START, HEADER_SIZE};

/// crc32 over everything past the magic and checksum fields.
pub fn checksum(image: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&image[CHECKSUM_START..]);
    hasher.finalize()
}

/// A decoded image, ready to replace a store's in-memory model.
#[derive(Debug)]
pub struct DecodedImage {
    pub header: Header,
    pub entries: Vec<DirEntry>,
    pub payload: Vec<u8>,
}

/// Serialize the live entry set into a fresh, compacted image.
///
/// `generation` is the value stamped into the header, not necessarily the
/// store's current one (save stamps generation + 1 before committing).
pub fn encode(generation: u32, directory: &Directory, arena: &Arena) -> Vec<u8> {
    let entry_slots = directory.slots() as u32;
    let arena_used: u32 = directory.live().map(|e| e.length).sum();

    let mut header = Header::new(entry_slots, arena.capacity());
    header.generation = generation;
    header.entry_count = directory.live_count() as u32;
    header.arena_used = arena_used;

    let mut image = vec![0u8; header.image_len() as usize];

    // Directory table + packed payloads, in enumeration order.
    let mut table_off = HEADER_SIZE;
    let mut payload_off: u32 = 0;
    let payload_base = HEADER_SIZE + entry_slots as usize * ENTRY_SIZE;
    for entry in directory.live() {
        let packed = DirEntry::new(&entry.name, payload_off, entry.length);
        image[table_off..table_off + ENTRY_SIZE].copy_from_slice(&packed.to_bytes());
        table_off += ENTRY_SIZE;

        let dst = payload_base + payload_off as usize;
        image[dst..dst + entry.length as usize]
            .copy_from_slice(arena.slice(entry.offset, entry.length));
        payload_off += entry.length;
    }

    header.checksum = 0;
    image[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    header.checksum = checksum(&image);
    image[..HEADER_SIZE].copy_from_slice(&header.to_bytes());

    image
}

/// Parse and validate a serialized image.
///
/// Rejects bad magic, unsupported versions, checksum mismatches, and
/// directory entries whose spans fall outside the serialized payload.
pub fn decode(buf: &[u8]) -> Result<DecodedImage> {
    let header = Header::from_bytes(buf)?;

    // Length claim first, in u64: once the buffer covers the claim, the
    // table and payload arithmetic below fits usize.
    if (buf.len() as u64) < header.image_len() {
        return Err(StoreError::CorruptImage("image shorter than header claims"));
    }
    let image_len = header.image_len() as usize;
    if checksum(&buf[..image_len]) != header.checksum {
        return Err(StoreError::CorruptImage("checksum mismatch"));
    }

    let mut entries = Vec::with_capacity(header.entry_count as usize);
    let mut table_off = HEADER_SIZE;
    for _ in 0..header.entry_count {
        let entry = DirEntry::from_bytes(&buf[table_off..table_off + ENTRY_SIZE])?;
        if entry
            .offset
            .checked_add(entry.length)
            .map_or(true, |end| end > header.arena_used)
        {
            return Err(StoreError::CorruptImage("record span outside arena"));
        }
        entries.push(entry);
        table_off += ENTRY_SIZE;
    }

    let payload_base = HEADER_SIZE + header.entry_slots as usize * ENTRY_SIZE;
    let payload = buf[payload_base..payload_base + header.arena_used as usize].to_vec();

    Ok(DecodedImage {
        header,
        entries,
        payload,
    })
}
