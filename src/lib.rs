//! Named-blob persistent store for per-device identity data.
//!
//! Identity data - serial numbers, MAC addresses, provisioning keys,
//! calibration blobs - lives in a small reserved region of non-volatile
//! storage. The same on-media image is read by a pre-OS bootloader and
//! by the installed OS, so the format is fixed-width, little-endian,
//! checksummed, and self-describing.
//!
//! ## On-media layout
//!
//! ```text
//! +--------------------------------------------------+
//! | Header (40 bytes)                                |
//! |  magic "IDST", version, generation,              |
//! |  entry slots/count, arena sizes, crc32           |
//! +--------------------------------------------------+
//! | Directory table (entry_slots x 76 bytes)         |
//! |  name[64] | offset u32 | length u32 | flags u32  |
//! +--------------------------------------------------+
//! | Arena (record payloads, packed at save time)     |
//! +--------------------------------------------------+
//! ```
//!
//! ## Design
//!
//! - [`medium`] - fixed-capacity backing region (file, partition, RAM)
//! - [`directory`] - name -> span index with tombstoned removal
//! - [`arena`] - payload region with first-fit allocation and coalescing
//! - [`image`] - transfer codec for save/export/import
//! - [`store`] - the public operation surface
//!
//! Mutations touch memory only; [`Store::save`] compacts tombstones and
//! commits through a write-shadow-then-swap protocol, so power loss mid
//! update always leaves one consistent image behind.
//!
//! ## Example
//!
//! ```
//! use idstore::{RamMedium, Store};
//!
//! let mut store = Store::init(RamMedium::new(4096))?;
//! store.write("serial", 0, b"SN-0001")?;
//!
//! let mut buf = [0u8; 7];
//! store.read("serial", 0, &mut buf)?;
//! assert_eq!(&buf, b"SN-0001");
//!
//! store.save()?;
//! # Ok::<(), idstore::StoreError>(())
//! ```

pub mod arena;
pub mod directory;
pub mod error;
pub mod header;
pub mod image;
pub mod medium;
pub mod store;

pub use arena::Arena;
pub use directory::{DirEntry, Directory, DEFAULT_ENTRY_SLOTS, ENTRY_SIZE, MAX_NAME_LEN};
pub use error::{Result, StoreError};
pub use header::{Header, HEADER_SIZE, MAGIC};
pub use medium::{FileMedium, Medium, RamMedium};
pub use store::{SharedStore, Store, StoreConfig, StoreStats};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
