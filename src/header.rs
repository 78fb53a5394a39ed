//! On-media image header.
//!
//! The header is the first 40 bytes of the serialized store image and is
//! the bit-exact contract shared by the bootloader-side and OS-side
//! readers: fixed field widths, little-endian byte order.

use crate::directory::ENTRY_SIZE;
use crate::error::{Result, StoreError};

pub const MAGIC: [u8; 8] = *b"IDST\x00\x01\x00\x00";
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;
pub const HEADER_SIZE: usize = 40;

/// First byte covered by the image checksum. Everything before it
/// (magic + the checksum field itself) is excluded.
pub const CHECKSUM_START: usize = 12;

/// Store image header
///
/// Layout (all integers little-endian):
///
/// ```text
/// 0..8    magic "IDST\x00\x01\x00\x00"
/// 8..12   checksum: crc32 over bytes 12..image_len
/// 12..14  version_major
/// 14..16  version_minor
/// 16..20  generation (increments on every committed save)
/// 20..24  entry_slots (directory table capacity)
/// 24..28  entry_count (entries serialized in the table)
/// 28..32  arena_capacity (declared payload capacity)
/// 32..36  arena_used (payload bytes following the table)
/// 36..40  reserved (zero)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 8],
    pub checksum: u32,
    pub version_major: u16,
    pub version_minor: u16,
    pub generation: u32,
    pub entry_slots: u32,
    pub entry_count: u32,
    pub arena_capacity: u32,
    pub arena_used: u32,
}

impl Header {
    pub fn new(entry_slots: u32, arena_capacity: u32) -> Self {
        Header {
            magic: MAGIC,
            checksum: 0,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            generation: 0,
            entry_slots,
            entry_count: 0,
            arena_capacity,
            arena_used: 0,
        }
    }

    /// Total serialized image length described by this header. Computed
    /// in u64: the fields are untrusted, and a hostile slot count must
    /// not overflow the arithmetic on 32-bit targets.
    pub fn image_len(&self) -> u64 {
        HEADER_SIZE as u64 + self.entry_slots as u64 * ENTRY_SIZE as u64 + self.arena_used as u64
    }

    /// Validate magic, version, and internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(StoreError::CorruptImage("bad magic marker"));
        }
        if self.version_major != VERSION_MAJOR {
            return Err(StoreError::CorruptImage("unsupported format version"));
        }
        if self.entry_count > self.entry_slots {
            return Err(StoreError::CorruptImage("entry count exceeds table slots"));
        }
        if self.arena_used > self.arena_capacity {
            return Err(StoreError::CorruptImage("arena length exceeds capacity"));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..8].copy_from_slice(&self.magic);
        bytes[8..12].copy_from_slice(&self.checksum.to_le_bytes());
        bytes[12..14].copy_from_slice(&self.version_major.to_le_bytes());
        bytes[14..16].copy_from_slice(&self.version_minor.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.generation.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.entry_slots.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.entry_count.to_le_bytes());
        bytes[28..32].copy_from_slice(&self.arena_capacity.to_le_bytes());
        bytes[32..36].copy_from_slice(&self.arena_used.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(StoreError::CorruptImage("short header"));
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&bytes[0..8]);

        let header = Header {
            magic,
            checksum: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            version_major: u16::from_le_bytes(bytes[12..14].try_into().unwrap()),
            version_minor: u16::from_le_bytes(bytes[14..16].try_into().unwrap()),
            generation: u32::from_le_bytes(bytes[16..20].try_into().unwrap()),
            entry_slots: u32::from_le_bytes(bytes[20..24].try_into().unwrap()),
            entry_count: u32::from_le_bytes(bytes[24..28].try_into().unwrap()),
            arena_capacity: u32::from_le_bytes(bytes[28..32].try_into().unwrap()),
            arena_used: u32::from_le_bytes(bytes[32..36].try_into().unwrap()),
        };

        header.validate()?;

        Ok(header)
    }
}
