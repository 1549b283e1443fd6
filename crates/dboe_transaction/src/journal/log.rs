//! Journal writer and random-access reader.

use crate::error::{TxnError, TxnResult};
use crate::journal::entry::{JournalEntry, ENTRY_CRC_LEN, ENTRY_HEADER_LEN};
use crate::journal::iterator::JournalEntries;
use dboe_storage::{FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub(crate) type SharedBackend = Arc<Mutex<Box<dyn StorageBackend>>>;

/// Append-only journal over a [`StorageBackend`].
///
/// Positions returned by [`Journal::write`] are byte offsets and increase
/// monotonically until the journal is reset.
pub struct Journal {
    backend: SharedBackend,
    location: Option<PathBuf>,
}

impl Journal {
    /// Creates a journal over any backend.
    #[must_use]
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
            location: None,
        }
    }

    /// Creates an empty in-memory journal.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Box::new(InMemoryBackend::new()))
    }

    /// Opens (or creates) a file-backed journal at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or is locked by
    /// another process.
    pub fn open(path: &Path) -> TxnResult<Self> {
        let backend = FileBackend::open_with_create_dirs(path)?;
        Ok(Self {
            backend: Arc::new(Mutex::new(Box::new(backend))),
            location: Some(path.to_path_buf()),
        })
    }

    /// File location, for file-backed journals.
    #[must_use]
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Appends an entry and returns its position.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be encoded or written.
    pub fn write(&self, entry: &JournalEntry) -> TxnResult<u64> {
        let bytes = entry.encode()?;
        Ok(self.backend.lock().append(&bytes)?)
    }

    /// Reads the entry at `position`.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if no complete entry starts there, or a
    /// checksum error if the bytes are damaged.
    pub fn read(&self, position: u64) -> TxnResult<JournalEntry> {
        let backend = self.backend.lock();
        let end = backend.size()?;
        read_entry_at(backend.as_ref(), position, end)?.ok_or_else(|| {
            TxnError::journal_corruption(format!("no complete entry at position {position}"))
        })
    }

    /// Streams entries from `from` to the end of the journal as it is now.
    ///
    /// Entries appended after this call are not seen. The iterator does
    /// not hold the journal lock between entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal size cannot be read.
    pub fn entries(&self, from: u64) -> TxnResult<JournalEntries> {
        let end = self.position()?;
        Ok(JournalEntries::new(Arc::clone(&self.backend), from, end))
    }

    /// Forces everything written so far to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or sync fails.
    pub fn sync(&self) -> TxnResult<()> {
        let mut backend = self.backend.lock();
        backend.flush()?;
        backend.sync()?;
        Ok(())
    }

    /// Whether the journal holds no bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be read.
    pub fn is_empty(&self) -> TxnResult<bool> {
        Ok(self.position()? == 0)
    }

    /// Position the next entry will be written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be read.
    pub fn position(&self) -> TxnResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Discards every entry.
    ///
    /// # Errors
    ///
    /// Returns an error if truncation fails.
    pub fn reset(&self) -> TxnResult<()> {
        self.truncate(0)
    }

    /// Discards entries at and after `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if `position` is past the end or truncation fails.
    pub fn truncate(&self, position: u64) -> TxnResult<()> {
        Ok(self.backend.lock().truncate(position)?)
    }

    /// Syncs and closes the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails.
    pub fn close(&self) -> TxnResult<()> {
        let mut backend = self.backend.lock();
        backend.flush()?;
        backend.sync()?;
        backend.close()?;
        Ok(())
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Reads one entry at `position`, treating anything that would run past
/// `end` as a truncated tail (`Ok(None)`).
pub(crate) fn read_entry_at(
    backend: &dyn StorageBackend,
    position: u64,
    end: u64,
) -> TxnResult<Option<JournalEntry>> {
    if position.saturating_add(ENTRY_HEADER_LEN as u64) > end {
        return Ok(None);
    }
    let header = backend.read_at(position, ENTRY_HEADER_LEN)?;
    let (_, _, len) = JournalEntry::decode_header(&header, position)?;
    let total = ENTRY_HEADER_LEN + len + ENTRY_CRC_LEN;
    if position.saturating_add(total as u64) > end {
        return Ok(None);
    }
    let bytes = backend.read_at(position, total)?;
    JournalEntry::decode(&bytes, position).map(Some)
}
