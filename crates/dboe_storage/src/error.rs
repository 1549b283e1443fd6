//! Storage errors.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a [`crate::StorageBackend`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read asked for bytes that were never written.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: usize,
        /// Size of the store at the time of the read.
        size: u64,
    },

    /// Truncation target lies beyond the end of the store.
    #[error("cannot truncate to {requested}: store holds only {size} bytes")]
    TruncateBeyondEnd {
        /// Requested size.
        requested: u64,
        /// Current size.
        size: u64,
    },

    /// Another process holds the file lock.
    #[error("storage file is locked by another process: {}", path.display())]
    Locked {
        /// Path of the locked file.
        path: PathBuf,
    },

    /// The store was closed.
    #[error("storage is closed")]
    Closed,
}
