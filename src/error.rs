use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record already exists: {0}")]
    NameExists(String),

    #[error("directory full: all {0} entry slots in use")]
    DirectoryFull(usize),

    #[error("out of arena space: {needed} bytes needed, {available} free")]
    OutOfSpace { needed: usize, available: usize },

    #[error("offset {offset} + length {len} exceeds record length {record_len}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        record_len: usize,
    },

    #[error("buffer too small: {needed} bytes required")]
    BufferTooSmall { needed: usize },

    #[error("corrupt image: {0}")]
    CorruptImage(&'static str),

    #[error("index {index} outside live entry range 0..{count}")]
    InvalidIndex { index: usize, count: usize },

    #[error("invalid record name: {0}")]
    InvalidName(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
