//! Record arena: the contiguous payload region behind the directory.
//!
//! Free space is tracked as spans in a `BTreeMap` keyed by offset, so
//! first-fit allocation naturally picks the lowest offset (deterministic
//! layout) and freeing can coalesce with both neighbors to bound
//! fragmentation.

use crate::error::{Result, StoreError};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Arena {
    data: Vec<u8>,
    /// Free spans: offset -> length, non-adjacent by construction.
    free: BTreeMap<u32, u32>,
    capacity: u32,
}

impl Arena {
    pub fn new(capacity: u32) -> Self {
        let mut free = BTreeMap::new();
        if capacity > 0 {
            free.insert(0, capacity);
        }
        Arena {
            data: vec![0u8; capacity as usize],
            free,
            capacity,
        }
    }

    /// Rebuild an arena from a serialized payload and the spans the
    /// directory claims. Offsets are taken as-is; everything outside the
    /// claimed spans becomes free space.
    pub fn restore(capacity: u32, payload: &[u8], spans: &[(u32, u32)]) -> Result<Self> {
        if payload.len() > capacity as usize {
            return Err(StoreError::CorruptImage("arena length exceeds capacity"));
        }

        let mut sorted: Vec<(u32, u32)> = spans.iter().copied().filter(|&(_, l)| l > 0).collect();
        sorted.sort_unstable();

        let mut arena = Arena {
            data: vec![0u8; capacity as usize],
            free: BTreeMap::new(),
            capacity,
        };
        arena.data[..payload.len()].copy_from_slice(payload);

        // Free spans are the complement of the claimed spans.
        let mut cursor: u32 = 0;
        for &(offset, length) in &sorted {
            let end = offset
                .checked_add(length)
                .ok_or(StoreError::CorruptImage("record span overflows"))?;
            if end > payload.len() as u32 {
                return Err(StoreError::CorruptImage("record span outside arena"));
            }
            if offset < cursor {
                return Err(StoreError::CorruptImage("overlapping records"));
            }
            if offset > cursor {
                arena.free.insert(cursor, offset - cursor);
            }
            cursor = end;
        }
        if cursor < capacity {
            arena.free.insert(cursor, capacity - cursor);
        }

        Ok(arena)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn free_bytes(&self) -> u32 {
        self.free.values().sum()
    }

    pub fn used_bytes(&self) -> u32 {
        self.capacity - self.free_bytes()
    }

    /// First-fit allocation over free spans, lowest offset wins.
    /// The returned span is zero-filled.
    pub fn allocate(&mut self, length: u32) -> Result<u32> {
        if length == 0 {
            return Ok(0);
        }

        let found = self
            .free
            .iter()
            .find(|(_, &span_len)| span_len >= length)
            .map(|(&offset, &span_len)| (offset, span_len));

        let (offset, span_len) = found.ok_or(StoreError::OutOfSpace {
            needed: length as usize,
            available: self.free_bytes() as usize,
        })?;

        self.free.remove(&offset);
        if span_len > length {
            self.free.insert(offset + length, span_len - length);
        }

        self.data[offset as usize..(offset + length) as usize].fill(0);

        Ok(offset)
    }

    /// Return a span to the free pool, merging with adjacent free spans.
    pub fn free(&mut self, offset: u32, length: u32) {
        if length == 0 {
            return;
        }

        let mut start = offset;
        let mut end = offset + length;

        // Merge with the preceding span if it ends where we begin.
        if let Some((&prev_off, &prev_len)) = self.free.range(..offset).next_back() {
            if prev_off + prev_len == start {
                self.free.remove(&prev_off);
                start = prev_off;
            }
        }

        // Merge with the following span if it begins where we end.
        if let Some((&next_off, &next_len)) = self.free.range(end..).next() {
            if next_off == end {
                self.free.remove(&next_off);
                end = next_off + next_len;
            }
        }

        self.free.insert(start, end - start);
    }

    /// Change a record's span length. Grows in place when the trailing
    /// space is free; otherwise relocates (allocate, copy, free old).
    /// Callers must adopt the returned offset. On failure nothing moves.
    pub fn resize(&mut self, offset: u32, old_length: u32, new_length: u32) -> Result<u32> {
        if new_length == old_length {
            return Ok(offset);
        }
        if old_length == 0 {
            return self.allocate(new_length);
        }
        if new_length == 0 {
            self.free(offset, old_length);
            return Ok(0);
        }
        if new_length < old_length {
            self.free(offset + new_length, old_length - new_length);
            return Ok(offset);
        }

        let grow = new_length - old_length;
        let tail = offset + old_length;

        // Grow in place if the span right behind us is free and large enough.
        if let Some(&tail_len) = self.free.get(&tail) {
            if tail_len >= grow {
                self.free.remove(&tail);
                if tail_len > grow {
                    self.free.insert(tail + grow, tail_len - grow);
                }
                self.data[tail as usize..(tail + grow) as usize].fill(0);
                return Ok(offset);
            }
        }

        // Relocate: allocate first so a failed grow leaves the record intact.
        let new_offset = self.allocate(new_length)?;
        let old = offset as usize;
        let moved = old_length as usize;
        self.data
            .copy_within(old..old + moved, new_offset as usize);
        self.free(offset, old_length);

        Ok(new_offset)
    }

    /// Read within a record. `local_offset` is relative to the record,
    /// and bounds are the record's own length, not the arena's.
    pub fn read_at(
        &self,
        offset: u32,
        record_length: u32,
        local_offset: u32,
        buf: &mut [u8],
    ) -> Result<()> {
        let end = local_offset as usize + buf.len();
        if end > record_length as usize {
            return Err(StoreError::OutOfBounds {
                offset: local_offset as usize,
                len: buf.len(),
                record_len: record_length as usize,
            });
        }
        let start = (offset + local_offset) as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    /// Overwrite within a record's current bounds. Growth is the caller's
    /// job via [`Arena::resize`], which keeps span bookkeeping in one place.
    pub fn write_at(
        &mut self,
        offset: u32,
        record_length: u32,
        local_offset: u32,
        bytes: &[u8],
    ) -> Result<()> {
        let end = local_offset as usize + bytes.len();
        if end > record_length as usize {
            return Err(StoreError::OutOfBounds {
                offset: local_offset as usize,
                len: bytes.len(),
                record_len: record_length as usize,
            });
        }
        let start = (offset + local_offset) as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Raw view of a record's bytes, for serialization.
    pub fn slice(&self, offset: u32, length: u32) -> &[u8] {
        &self.data[offset as usize..(offset + length) as usize]
    }

    /// Number of distinct free spans (fragmentation indicator).
    pub fn free_span_count(&self) -> usize {
        self.free.len()
    }
}
