//! Store controller: the public operation surface.
//!
//! A [`Store`] is the single open handle onto one medium. All operations
//! mutate the in-memory model only; persistence is the explicit [`Store::save`]
//! step, which compacts tombstones and commits through the medium's
//! atomic swap. Dropping a store discards unsaved mutations.

use crate::arena::Arena;
use crate::directory::{DirEntry, Directory, DEFAULT_ENTRY_SLOTS, ENTRY_SIZE};
use crate::error::{Result, StoreError};
use crate::header::HEADER_SIZE;
use crate::image::{self, DecodedImage};
use crate::medium::Medium;
use parking_lot::Mutex;
use std::sync::Arc;

/// Geometry knobs for a store opened on a medium with no prior image.
/// A valid on-media header always wins over the config: the format is
/// self-describing so both boot-stage readers derive the same layout.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// Directory table capacity (fixed-width slots reserved on media).
    pub entry_slots: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            entry_slots: DEFAULT_ENTRY_SLOTS,
        }
    }
}

/// Named-blob store over one backing medium.
pub struct Store {
    medium: Box<dyn Medium + Send>,
    directory: Directory,
    arena: Arena,
    generation: u32,
    dirty: bool,
}

impl Store {
    /// Open the store against a medium with default geometry.
    pub fn init(medium: impl Medium + Send + 'static) -> Result<Self> {
        Self::init_with(medium, StoreConfig::default())
    }

    /// Open the store against a medium.
    ///
    /// A missing or corrupt image is not fatal: after consulting the
    /// medium's shadow copy, the store degrades to empty - a fresh device
    /// has no image yet. Only real I/O failures propagate.
    pub fn init_with(medium: impl Medium + Send + 'static, config: StoreConfig) -> Result<Self> {
        let mut medium: Box<dyn Medium + Send> = Box::new(medium);
        let capacity = medium.capacity();
        let raw = medium.load()?;

        match Self::parse_model(&raw, capacity) {
            Ok((directory, arena, generation)) => {
                tracing::debug!(
                    generation,
                    entries = directory.live_count(),
                    "loaded store image"
                );
                Ok(Store {
                    medium,
                    directory,
                    arena,
                    generation,
                    dirty: false,
                })
            }
            Err(StoreError::CorruptImage(reason)) => {
                // Primary failed validation: a torn commit may have left a
                // complete shadow behind. Fall back before declaring empty.
                if let Some(shadow) = medium.load_shadow()? {
                    if let Ok((directory, arena, generation)) =
                        Self::parse_model(&shadow, capacity)
                    {
                        tracing::info!(
                            generation,
                            "primary image invalid ({reason}); recovered from shadow copy"
                        );
                        return Ok(Store {
                            medium,
                            directory,
                            arena,
                            generation,
                            // Dirty so the next save heals the primary.
                            dirty: true,
                        });
                    }
                }

                tracing::warn!("no valid store image ({reason}); starting empty");
                let (directory, arena) = Self::empty_model(capacity, config)?;
                Ok(Store {
                    medium,
                    directory,
                    arena,
                    generation: 0,
                    dirty: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn empty_model(capacity: usize, config: StoreConfig) -> Result<(Directory, Arena)> {
        let arena_capacity = Self::arena_capacity_for(capacity, config.entry_slots)?;
        Ok((Directory::new(config.entry_slots), Arena::new(arena_capacity)))
    }

    /// Payload capacity left after the header and directory table.
    fn arena_capacity_for(capacity: usize, entry_slots: usize) -> Result<u32> {
        let overhead = HEADER_SIZE + entry_slots * ENTRY_SIZE;
        if capacity <= overhead {
            return Err(StoreError::OutOfSpace {
                needed: overhead + 1,
                available: capacity,
            });
        }
        Ok((capacity - overhead).min(u32::MAX as usize) as u32)
    }

    /// Decode a raw image and rebuild directory + arena, sized to this medium.
    fn parse_model(raw: &[u8], capacity: usize) -> Result<(Directory, Arena, u32)> {
        let decoded = image::decode(raw)?;
        Self::build_model(&decoded, capacity)
    }

    /// Rebuild directory + arena from a decoded image, sized to this medium.
    fn build_model(
        decoded: &DecodedImage,
        capacity: usize,
    ) -> Result<(Directory, Arena, u32)> {
        let slots = decoded.header.entry_slots as usize;
        let arena_capacity = Self::arena_capacity_for(capacity, slots)?;
        if decoded.header.arena_used > arena_capacity {
            return Err(StoreError::CorruptImage("arena length exceeds capacity"));
        }

        let live: Vec<DirEntry> = decoded
            .entries
            .iter()
            .filter(|e| !e.tombstone)
            .cloned()
            .collect();
        let spans: Vec<(u32, u32)> = live.iter().map(|e| (e.offset, e.length)).collect();

        let arena = Arena::restore(arena_capacity, &decoded.payload, &spans)?;
        let directory = Directory::from_entries(slots, live)?;

        Ok((directory, arena, decoded.header.generation))
    }

    /// Live (non-tombstoned) record count.
    pub fn get_count(&self) -> usize {
        self.directory.live_count()
    }

    /// Fill `buf` with the name of the record at `index` (enumeration
    /// order) and return the name length. The order is stable within a
    /// session but not across saves that compact tombstones.
    pub fn get_name(&self, index: usize, buf: &mut [u8]) -> Result<usize> {
        let name = self
            .directory
            .enumerate()
            .nth(index)
            .map(|(_, name)| name)
            .ok_or(StoreError::InvalidIndex {
                index,
                count: self.directory.live_count(),
            })?;

        if buf.len() < name.len() {
            return Err(StoreError::BufferTooSmall { needed: name.len() });
        }
        buf[..name.len()].copy_from_slice(name.as_bytes());
        Ok(name.len())
    }

    /// Restartable enumeration of live record names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.directory.enumerate().map(|(_, name)| name)
    }

    pub fn get_data_length(&self, name: &str) -> Result<usize> {
        self.directory
            .lookup(name)
            .map(|e| e.length as usize)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    /// Copy exactly `buf.len()` bytes from the record, starting at
    /// `offset` relative to the record. No partial copy: a read past the
    /// record's length fails whole with `OutOfBounds`.
    pub fn read(&self, name: &str, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let entry = self
            .directory
            .lookup(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        let end = offset as u64 + buf.len() as u64;
        if end > entry.length as u64 {
            return Err(StoreError::OutOfBounds {
                offset,
                len: buf.len(),
                record_len: entry.length as usize,
            });
        }
        if buf.is_empty() {
            return Ok(0);
        }
        self.arena
            .read_at(entry.offset, entry.length, offset as u32, buf)?;
        Ok(buf.len())
    }

    /// Write `data` at `offset` relative to the record, creating or
    /// growing it as needed. A record created or grown past its old
    /// length is zero-filled up to `offset`. On `DirectoryFull` or
    /// `OutOfSpace` the in-memory model is left untouched.
    pub fn write(&mut self, name: &str, offset: usize, data: &[u8]) -> Result<()> {
        Directory::validate_name(name)?;

        let end = offset as u64 + data.len() as u64;
        if end > self.arena.capacity() as u64 {
            return Err(StoreError::OutOfSpace {
                needed: end as usize,
                available: self.arena.free_bytes() as usize,
            });
        }
        let end = end as u32;

        match self.directory.lookup(name) {
            Some(entry) => {
                let (cur_offset, cur_length) = (entry.offset, entry.length);
                if end > cur_length {
                    let new_offset = self.arena.resize(cur_offset, cur_length, end)?;
                    self.directory.update(name, new_offset, end)?;
                    if !data.is_empty() {
                        self.arena.write_at(new_offset, end, offset as u32, data)?;
                    }
                } else {
                    if data.is_empty() {
                        return Ok(());
                    }
                    self.arena
                        .write_at(cur_offset, cur_length, offset as u32, data)?;
                }
            }
            None => {
                // Capacity checks come first so a failure mutates nothing.
                if !self.directory.has_free_slot() {
                    return Err(StoreError::DirectoryFull(self.directory.slots()));
                }
                if end > 0 {
                    let new_offset = self.arena.allocate(end)?;
                    self.arena.write_at(new_offset, end, offset as u32, data)?;
                    self.directory.insert(name, new_offset, end)?;
                } else {
                    self.directory.insert(name, 0, 0)?;
                }
            }
        }

        self.dirty = true;
        Ok(())
    }

    /// Tombstone a record. Its arena span is reclaimed at the next save,
    /// and its directory slot stays occupied until then.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.directory.tombstone(name)?;
        self.dirty = true;
        Ok(())
    }

    /// Commit the live entry set to the owned medium. Compacts tombstones,
    /// bumps the generation, and replaces the in-memory model with the
    /// committed layout. A no-op when nothing changed since the last save,
    /// so repeated saves leave byte-identical media. On I/O failure the
    /// in-memory model is unchanged and the previous image survives.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            tracing::debug!("save skipped: no unsaved mutations");
            return Ok(());
        }
        let image = image::encode(self.generation.wrapping_add(1), &self.directory, &self.arena);
        self.medium.store(&image)?;
        self.adopt_image(&image)
    }

    /// Commit to a different medium (provisioning a second region or a
    /// pre-built device image). Writes the same compacted image as `save`,
    /// but leaves this store's model, generation, and dirty flag alone:
    /// only a commit to the owned medium counts as saved, so unsaved
    /// mutations still reach the primary on the next `save`.
    pub fn save_to(&self, target: &mut dyn Medium) -> Result<()> {
        let generation = if self.dirty {
            self.generation.wrapping_add(1)
        } else {
            self.generation
        };
        let image = image::encode(generation, &self.directory, &self.arena);
        if image.len() > target.capacity() {
            return Err(StoreError::OutOfSpace {
                needed: image.len(),
                available: target.capacity(),
            });
        }
        target.store(&image)?;
        tracing::debug!(generation, bytes = image.len(), "committed image to secondary medium");
        Ok(())
    }

    fn adopt_image(&mut self, raw: &[u8]) -> Result<()> {
        let (directory, arena, generation) = Self::parse_model(raw, self.medium.capacity())?;
        self.directory = directory;
        self.arena = arena;
        self.generation = generation;
        self.dirty = false;
        tracing::debug!(
            generation,
            entries = self.directory.live_count(),
            "adopted committed image"
        );
        Ok(())
    }

    /// Serialize the full live image into a caller-owned buffer and
    /// return its length. The buffer must hold at least the image; size
    /// it to [`Store::capacity`] to be safe.
    pub fn export(&self, buf: &mut [u8]) -> Result<usize> {
        let image = image::encode(self.generation, &self.directory, &self.arena);
        if buf.len() < image.len() {
            return Err(StoreError::BufferTooSmall { needed: image.len() });
        }
        buf[..image.len()].copy_from_slice(&image);
        Ok(image.len())
    }

    /// Replace the in-memory model wholesale from a serialized image.
    ///
    /// Unlike `init`, an invalid buffer propagates `CorruptImage`: an
    /// explicit import means the caller expects validation. The current
    /// model survives any failure. The imported content must fit this
    /// store's geometry; tombstoned entries are not carried over.
    pub fn import(&mut self, buf: &[u8]) -> Result<()> {
        let decoded = image::decode(buf)?;

        let live: Vec<DirEntry> = decoded
            .entries
            .iter()
            .filter(|e| !e.tombstone)
            .cloned()
            .collect();
        if live.len() > self.directory.slots() {
            return Err(StoreError::DirectoryFull(self.directory.slots()));
        }
        if decoded.header.arena_used > self.arena.capacity() {
            return Err(StoreError::OutOfSpace {
                needed: decoded.header.arena_used as usize,
                available: self.arena.capacity() as usize,
            });
        }

        let spans: Vec<(u32, u32)> = live.iter().map(|e| (e.offset, e.length)).collect();
        let arena = Arena::restore(self.arena.capacity(), &decoded.payload, &spans)?;
        let directory = Directory::from_entries(self.directory.slots(), live)?;

        self.directory = directory;
        self.arena = arena;
        self.generation = decoded.header.generation;
        self.dirty = true;
        Ok(())
    }

    /// Total medium capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.medium.capacity()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Whether the in-memory model has mutations not yet saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            capacity: self.medium.capacity(),
            arena_capacity: self.arena.capacity() as usize,
            arena_used: self.arena.used_bytes() as usize,
            arena_free: self.arena.free_bytes() as usize,
            live_entries: self.directory.live_count(),
            entry_slots: self.directory.slots(),
            occupied_slots: self.directory.slot_count(),
            generation: self.generation,
            dirty: self.dirty,
        }
    }
}

/// Store metrics snapshot.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub capacity: usize,
    pub arena_capacity: usize,
    pub arena_used: usize,
    pub arena_free: usize,
    pub live_entries: usize,
    pub entry_slots: usize,
    pub occupied_slots: usize,
    pub generation: u32,
    pub dirty: bool,
}

/// Clonable handle serializing all operations on one [`Store`] behind an
/// exclusive lock, for embedders running the store inside a
/// multi-threaded runtime. The store itself is strictly single-writer.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<Store>>,
}

impl SharedStore {
    pub fn new(store: Store) -> Self {
        SharedStore {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Run `f` with exclusive access to the store.
    pub fn with<R>(&self, f: impl FnOnce(&mut Store) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
