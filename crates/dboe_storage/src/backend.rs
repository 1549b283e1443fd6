//! The byte store trait.

use crate::error::StorageResult;

/// An append-only byte store.
///
/// # Invariants
///
/// - `append` returns the offset the bytes were written at, which is the
///   store size before the call
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - after `sync` returns, every appended byte survives process termination
/// - `truncate` only ever shrinks the store
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range is not
    /// fully inside the store.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it starts at.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or if the store is closed.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    fn flush(&mut self) -> StorageResult<()>;

    /// Forces data and metadata to durable media.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size, which is where the next append lands.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Discards everything at and after `new_size`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::TruncateBeyondEnd`] if `new_size` is
    /// larger than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Releases the store. Further operations fail with
    /// [`crate::StorageError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns an error if final buffered data cannot be written.
    fn close(&mut self) -> StorageResult<()>;
}
