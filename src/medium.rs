//! Backing medium adapters.
//!
//! A medium is a fixed-capacity byte region: a raw flash partition
//! exposed as a device node, an ordinary file standing in for one, or a
//! caller-owned buffer during the boot handover. The store never touches
//! physical storage through anything else, and never retries I/O - retry
//! policy belongs to the caller.

use crate::error::{Result, StoreError};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Fixed-size byte region the store persists into.
///
/// `store` must be atomic at the image level: after a crash the region
/// yields either the previous image or the new one, never a blend. Media
/// that cannot swap atomically expose the surviving copy via
/// [`Medium::load_shadow`] instead.
pub trait Medium {
    /// Total region size in bytes.
    fn capacity(&self) -> usize;

    /// Read the entire region. Short reads are an error.
    fn load(&mut self) -> Result<Vec<u8>>;

    /// Replace the region contents with `image` (zero-padded to capacity).
    fn store(&mut self, image: &[u8]) -> Result<()>;

    /// Bytes of an interrupted commit's surviving copy, if the medium
    /// keeps one. Consulted only when the primary image fails validation.
    fn load_shadow(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// File-backed medium: a regular file or partition device node.
///
/// Commits go through a shadow file next to the primary: write the full
/// image there, sync, then rename over the primary. A crash mid-commit
/// leaves the old primary intact; a crash between sync and rename leaves
/// a complete shadow that [`FileMedium::load_shadow`] recovers.
pub struct FileMedium {
    path: PathBuf,
    capacity: usize,
}

impl FileMedium {
    /// Open an existing region. The file must already be at least
    /// `capacity` bytes (partitions always are).
    pub fn open<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
        let meta = std::fs::metadata(&path)?;
        if (meta.len() as usize) < capacity {
            return Err(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                format!(
                    "medium {} is {} bytes, {} required",
                    path.as_ref().display(),
                    meta.len(),
                    capacity
                ),
            )
            .into());
        }
        Ok(FileMedium {
            path: path.as_ref().to_path_buf(),
            capacity,
        })
    }

    /// Create a zero-filled region file (provisioning a fresh device image).
    pub fn create<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(capacity as u64)?;
        file.sync_all()?;
        Ok(FileMedium {
            path: path.as_ref().to_path_buf(),
            capacity,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn shadow_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".shadow");
        PathBuf::from(name)
    }
}

impl Medium for FileMedium {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn load(&mut self) -> Result<Vec<u8>> {
        let mut file = File::open(&self.path)?;
        let mut buf = vec![0u8; self.capacity];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn store(&mut self, image: &[u8]) -> Result<()> {
        if image.len() > self.capacity {
            return Err(std::io::Error::new(
                ErrorKind::WriteZero,
                format!(
                    "image of {} bytes exceeds medium capacity {}",
                    image.len(),
                    self.capacity
                ),
            )
            .into());
        }

        let shadow = self.shadow_path();
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&shadow)?;
            file.write_all(image)?;
            if image.len() < self.capacity {
                file.write_all(&vec![0u8; self.capacity - image.len()])?;
            }
            file.sync_all()?;
        }

        // The swap itself: a single rename.
        std::fs::rename(&shadow, &self.path)?;

        // Best-effort directory sync so the rename survives power loss.
        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                dir.sync_all().ok();
            }
        }

        tracing::debug!(path = %self.path.display(), bytes = image.len(), "committed image");
        Ok(())
    }

    fn load_shadow(&mut self) -> Result<Option<Vec<u8>>> {
        let shadow = self.shadow_path();
        match File::open(&shadow) {
            Ok(mut file) => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf)?;
                tracing::info!(path = %shadow.display(), "found shadow copy");
                Ok(Some(buf))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory medium for the boot-handover path and for tests.
/// Replacing the buffer wholesale makes `store` inherently atomic.
pub struct RamMedium {
    data: Vec<u8>,
    capacity: usize,
}

impl RamMedium {
    pub fn new(capacity: usize) -> Self {
        RamMedium {
            data: vec![0u8; capacity],
            capacity,
        }
    }

    /// Wrap existing bytes (e.g. an image handed over by the bootloader),
    /// zero-padded to `capacity`. An input longer than the region is an
    /// error, not a truncation: a clipped image would just fail its
    /// checksum later with no hint of the real cause.
    pub fn from_bytes(capacity: usize, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > capacity {
            return Err(StoreError::OutOfSpace {
                needed: bytes.len(),
                available: capacity,
            });
        }
        let mut data = vec![0u8; capacity];
        data[..bytes.len()].copy_from_slice(bytes);
        Ok(RamMedium { data, capacity })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Medium for RamMedium {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn load(&mut self) -> Result<Vec<u8>> {
        Ok(self.data.clone())
    }

    fn store(&mut self, image: &[u8]) -> Result<()> {
        if image.len() > self.capacity {
            return Err(std::io::Error::new(
                ErrorKind::WriteZero,
                format!(
                    "image of {} bytes exceeds medium capacity {}",
                    image.len(),
                    self.capacity
                ),
            )
            .into());
        }
        self.data.fill(0);
        self.data[..image.len()].copy_from_slice(image);
        Ok(())
    }
}
