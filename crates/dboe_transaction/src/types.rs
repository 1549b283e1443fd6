//! Transaction modes and states.

use crate::id::TxnId;
use std::fmt;

/// How a transaction is begun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnType {
    /// Read only; never promotes.
    Read,
    /// Writer from the start.
    Write,
    /// Reader that may promote to writer if no writer committed since it
    /// began.
    ReadPromote,
    /// Reader that may promote to writer, seeing commits made since it
    /// began.
    ReadCommittedPromote,
}

impl TxnType {
    /// Mode the transaction starts in.
    #[must_use]
    pub const fn initial_mode(self) -> ReadWrite {
        match self {
            Self::Write => ReadWrite::Write,
            Self::Read | Self::ReadPromote | Self::ReadCommittedPromote => ReadWrite::Read,
        }
    }

    /// Whether `promote()` can ever succeed.
    #[must_use]
    pub const fn can_promote(self) -> bool {
        matches!(self, Self::ReadPromote | Self::ReadCommittedPromote)
    }
}

/// Current mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadWrite {
    /// Reading.
    Read,
    /// Writing.
    Write,
}

/// Lifecycle state. Transitions only move forward:
/// `Active → Prepared → Committed`, `Active|Prepared → Aborted`,
/// then `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnState {
    /// Running.
    Active,
    /// Redo collected and journaled, not yet committed.
    Prepared,
    /// Committed.
    Committed,
    /// Aborted.
    Aborted,
    /// Finished; the coordinator slot has been released.
    Ended,
}

impl TxnState {
    /// Whether commit or abort has happened.
    #[must_use]
    pub const fn is_decided(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "ACTIVE",
            Self::Prepared => "PREPARED",
            Self::Committed => "COMMITTED",
            Self::Aborted => "ABORTED",
            Self::Ended => "ENDED",
        };
        f.write_str(s)
    }
}

/// What components are told about a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnInfo {
    /// Transaction id.
    pub id: TxnId,
    /// How it was begun.
    pub txn_type: TxnType,
    /// Current mode.
    pub mode: ReadWrite,
    /// Data version the transaction's view is based on.
    pub data_version: u64,
}

impl TxnInfo {
    /// Whether the transaction is currently a writer.
    #[must_use]
    pub fn is_write(&self) -> bool {
        self.mode == ReadWrite::Write
    }
}
