//! Forward-only journal iteration.

use crate::error::TxnResult;
use crate::journal::entry::JournalEntry;
use crate::journal::log::{read_entry_at, SharedBackend};

/// Lazy iterator over `(position, entry)` pairs.
///
/// Bounded by the journal size when it was created. Stops cleanly at a
/// truncated tail; yields one error and stops on corruption. To start
/// again from an earlier position, call [`crate::Journal::entries`] anew.
pub struct JournalEntries {
    backend: SharedBackend,
    position: u64,
    end: u64,
    finished: bool,
}

impl JournalEntries {
    pub(crate) fn new(backend: SharedBackend, position: u64, end: u64) -> Self {
        Self {
            backend,
            position,
            end,
            finished: false,
        }
    }

    /// Position of the next entry to be read.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    fn read_next(&mut self) -> TxnResult<Option<(u64, JournalEntry)>> {
        let backend = self.backend.lock();
        // The journal may have been reset underneath us.
        let end = self.end.min(backend.size()?);
        let Some(entry) = read_entry_at(backend.as_ref(), self.position, end)? else {
            return Ok(None);
        };
        let position = self.position;
        self.position += entry.encoded_len() as u64;
        Ok(Some((position, entry)))
    }
}

impl Iterator for JournalEntries {
    type Item = TxnResult<(u64, JournalEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl std::fmt::Debug for JournalEntries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalEntries")
            .field("position", &self.position)
            .field("end", &self.end)
            .field("finished", &self.finished)
            .finish()
    }
}
