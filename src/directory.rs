//! Record directory: the in-memory index mapping names to arena spans.
//!
//! Entries keep insertion order, which is the enumeration order exposed
//! to callers. A removed entry becomes a tombstone: invisible to lookup
//! and enumeration, but still occupying a table slot until the next save
//! compacts it away.

use crate::error::{Result, StoreError};

/// Fixed width of the on-media name field, including NUL padding.
pub const NAME_SIZE: usize = 64;

/// Longest allowed record name in bytes.
pub const MAX_NAME_LEN: usize = NAME_SIZE - 1;

/// Fixed width of one on-media directory entry: name + offset + length + flags.
pub const ENTRY_SIZE: usize = NAME_SIZE + 12;

pub const FLAG_TOMBSTONE: u32 = 1;

/// Default directory table capacity when the medium holds no prior image.
pub const DEFAULT_ENTRY_SLOTS: usize = 32;

/// One named record's location in the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub offset: u32,
    pub length: u32,
    pub tombstone: bool,
}

impl DirEntry {
    pub fn new(name: &str, offset: u32, length: u32) -> Self {
        DirEntry {
            name: name.to_string(),
            offset,
            length,
            tombstone: false,
        }
    }

    /// Serialize to the fixed-width on-media form.
    pub fn to_bytes(&self) -> [u8; ENTRY_SIZE] {
        let mut bytes = [0u8; ENTRY_SIZE];
        bytes[..self.name.len()].copy_from_slice(self.name.as_bytes());
        bytes[NAME_SIZE..NAME_SIZE + 4].copy_from_slice(&self.offset.to_le_bytes());
        bytes[NAME_SIZE + 4..NAME_SIZE + 8].copy_from_slice(&self.length.to_le_bytes());
        let flags: u32 = if self.tombstone { FLAG_TOMBSTONE } else { 0 };
        bytes[NAME_SIZE + 8..NAME_SIZE + 12].copy_from_slice(&flags.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ENTRY_SIZE {
            return Err(StoreError::CorruptImage("short directory entry"));
        }

        let name_len = bytes[..NAME_SIZE]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_SIZE);
        if name_len == 0 || name_len > MAX_NAME_LEN {
            return Err(StoreError::CorruptImage("entry name length out of range"));
        }
        // The padding after the terminator must stay zero.
        if bytes[name_len..NAME_SIZE].iter().any(|&b| b != 0) {
            return Err(StoreError::CorruptImage("entry name padding not zeroed"));
        }
        let name = std::str::from_utf8(&bytes[..name_len])
            .map_err(|_| StoreError::CorruptImage("entry name is not valid UTF-8"))?;

        let offset = u32::from_le_bytes(bytes[NAME_SIZE..NAME_SIZE + 4].try_into().unwrap());
        let length = u32::from_le_bytes(bytes[NAME_SIZE + 4..NAME_SIZE + 8].try_into().unwrap());
        let flags = u32::from_le_bytes(bytes[NAME_SIZE + 8..NAME_SIZE + 12].try_into().unwrap());
        if flags & !FLAG_TOMBSTONE != 0 {
            return Err(StoreError::CorruptImage("unknown entry flags"));
        }

        Ok(DirEntry {
            name: name.to_string(),
            offset,
            length,
            tombstone: flags & FLAG_TOMBSTONE != 0,
        })
    }
}

/// In-memory directory, rebuilt from the on-media table at load time.
#[derive(Debug, Clone)]
pub struct Directory {
    entries: Vec<DirEntry>,
    slots: usize,
}

impl Directory {
    pub fn new(slots: usize) -> Self {
        Directory {
            entries: Vec::new(),
            slots,
        }
    }

    /// Rebuild from decoded entries. Tombstones never come off the media,
    /// but imported buffers may carry them; they keep their slot.
    pub fn from_entries(slots: usize, entries: Vec<DirEntry>) -> Result<Self> {
        if entries.len() > slots {
            return Err(StoreError::CorruptImage("entry count exceeds table slots"));
        }
        let dir = Directory { entries, slots };
        for entry in dir.live() {
            if dir
                .live()
                .filter(|other| other.name == entry.name)
                .count()
                > 1
            {
                return Err(StoreError::CorruptImage("duplicate record name"));
            }
        }
        Ok(dir)
    }

    /// Name rules: non-empty, at most [`MAX_NAME_LEN`] bytes, no NUL.
    pub fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(StoreError::InvalidName("name is empty"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(StoreError::InvalidName("name exceeds 63 bytes"));
        }
        if name.bytes().any(|b| b == 0) {
            return Err(StoreError::InvalidName("name contains NUL"));
        }
        Ok(())
    }

    /// Exact, case-sensitive lookup. Tombstoned entries are invisible.
    pub fn lookup(&self, name: &str) -> Option<&DirEntry> {
        self.entries
            .iter()
            .find(|e| !e.tombstone && e.name == name)
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut DirEntry> {
        self.entries
            .iter_mut()
            .find(|e| !e.tombstone && e.name == name)
    }

    /// Whether a new entry can be inserted without exceeding the table.
    /// Tombstones count: they still occupy media slots until compaction.
    pub fn has_free_slot(&self) -> bool {
        self.entries.len() < self.slots
    }

    pub fn insert(&mut self, name: &str, offset: u32, length: u32) -> Result<()> {
        Self::validate_name(name)?;
        if self.lookup(name).is_some() {
            return Err(StoreError::NameExists(name.to_string()));
        }
        if !self.has_free_slot() {
            return Err(StoreError::DirectoryFull(self.slots));
        }
        self.entries.push(DirEntry::new(name, offset, length));
        Ok(())
    }

    pub fn update(&mut self, name: &str, offset: u32, length: u32) -> Result<()> {
        let entry = self
            .lookup_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        entry.offset = offset;
        entry.length = length;
        Ok(())
    }

    pub fn tombstone(&mut self, name: &str) -> Result<()> {
        let entry = self
            .lookup_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        entry.tombstone = true;
        Ok(())
    }

    /// Live (non-tombstoned) entry count.
    pub fn live_count(&self) -> usize {
        self.live().count()
    }

    /// Entry slots the table can hold on media.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Occupied slots, tombstones included.
    pub fn slot_count(&self) -> usize {
        self.entries.len()
    }

    /// Live entries in insertion order.
    pub fn live(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter().filter(|e| !e.tombstone)
    }

    /// Restartable enumeration of `(index, name)` over live entries.
    pub fn enumerate(&self) -> impl Iterator<Item = (usize, &str)> {
        self.live().enumerate().map(|(i, e)| (i, e.name.as_str()))
    }

    /// Tombstoned entries (their arena spans are reclaimed at save time).
    pub fn tombstoned(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter().filter(|e| e.tombstone)
    }
}
