//! Journal replay.

use crate::error::TxnResult;
use crate::journal::entry::{JournalEntry, JournalEntryType};
use tracing::{debug, warn};

/// Counts from one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// `COMMIT` entries seen.
    pub committed: usize,
    /// `ABORT` entries seen.
    pub aborted: usize,
    /// Redo entries left without a terminal entry at the end of the log.
    pub incomplete: usize,
    /// Redo entries handed to `apply`.
    pub replayed: usize,
}

impl RecoveryStats {
    /// Whether the pass found anything to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.committed == 0 && self.aborted == 0 && self.incomplete == 0
    }
}

/// Replays a journal in one forward pass.
///
/// Redo entries are buffered until the next control entry. On `COMMIT`
/// each buffered entry is passed to `apply` in journal order; on `ABORT`
/// the buffer is dropped. Entries still buffered at the end belong to a
/// transaction that never reached its commit point and are discarded.
///
/// # Errors
///
/// Returns the first read error from `entries` or the first error from
/// `apply`.
pub fn replay<I, F>(entries: I, mut apply: F) -> TxnResult<RecoveryStats>
where
    I: IntoIterator<Item = TxnResult<(u64, JournalEntry)>>,
    F: FnMut(&JournalEntry) -> TxnResult<()>,
{
    let mut stats = RecoveryStats::default();
    let mut pending: Vec<JournalEntry> = Vec::new();

    for item in entries {
        let (position, entry) = item?;
        match entry.entry_type {
            JournalEntryType::Redo => pending.push(entry),
            JournalEntryType::Undo => {
                warn!(position, component = %entry.component_id, "ignoring UNDO entry");
            }
            JournalEntryType::Commit => {
                debug!(position, txn = ?entry.txn_id(), redo = pending.len(), "replaying commit");
                for redo in pending.drain(..) {
                    apply(&redo)?;
                    stats.replayed += 1;
                }
                stats.committed += 1;
            }
            JournalEntryType::Abort => {
                debug!(position, txn = ?entry.txn_id(), redo = pending.len(), "discarding aborted");
                pending.clear();
                stats.aborted += 1;
            }
        }
    }

    if !pending.is_empty() {
        warn!(entries = pending.len(), "discarding redo entries with no commit");
        stats.incomplete = pending.len();
    }
    Ok(stats)
}
