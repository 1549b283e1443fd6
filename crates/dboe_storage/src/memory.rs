//! In-memory byte store.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A byte store held in memory.
///
/// Handles obtained from [`InMemoryBackend::share`] point at the same
/// buffer. Closing one handle does not close the others, so a test can drop
/// a coordinator mid-transaction and open a fresh one over the bytes it left.
///
/// ```rust
/// use dboe_storage::{InMemoryBackend, StorageBackend};
///
/// let mut first = InMemoryBackend::new();
/// let second = first.share();
/// first.append(b"abc").unwrap();
/// assert_eq!(second.size().unwrap(), 3);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
    closed: bool,
}

impl InMemoryBackend {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store preloaded with `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            closed: false,
        }
    }

    /// Returns a second open handle onto the same bytes.
    #[must_use]
    pub fn share(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            closed: false,
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.ensure_open()?;
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        self.ensure_open()?;
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.ensure_open()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.ensure_open()
    }

    fn size(&self) -> StorageResult<u64> {
        self.ensure_open()?;
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.ensure_open()?;
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        self.closed = true;
        Ok(())
    }
}
