//! Error types for the transaction coordinator.

use crate::id::{ComponentId, TxnId};
use crate::types::TxnState;
use std::io;
use thiserror::Error;

/// Result type for transaction operations.
pub type TxnResult<T> = Result<T, TxnError>;

/// Errors raised by the coordinator, transactions, journal and components.
///
/// Usage errors (see [`TxnError::is_usage_error`]) leave the transaction and
/// coordinator in a well-defined state; `end()` remains safe to call.
/// Journal errors during commit are fatal to the coordinator.
#[derive(Debug, Error)]
pub enum TxnError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] dboe_storage::StorageError),

    /// I/O error outside the journal backend (component files).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The journal holds bytes that do not parse as an entry.
    #[error("journal corruption: {message}")]
    JournalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// A journal entry failed its checksum.
    #[error("journal checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// Configuration change after `start()`.
    #[error("coordinator configuration is locked: already started")]
    ConfigurationLocked,

    /// Operation needs a started coordinator.
    #[error("coordinator has not been started")]
    NotStarted,

    /// Operation on a coordinator that has been shut down.
    #[error("coordinator has been shut down")]
    Shutdown,

    /// A journal failure during commit left the coordinator unusable.
    #[error("coordinator is unusable after a journal failure")]
    Poisoned,

    /// Two components registered with one id.
    #[error("component {id} is already registered")]
    DuplicateComponent {
        /// The repeated id.
        id: ComponentId,
    },

    /// The calling thread already has a transaction.
    #[error("already in a transaction: {txn}")]
    NestedTransaction {
        /// The transaction bound to the thread.
        txn: TxnId,
    },

    /// The calling thread has no transaction.
    #[error("not in a transaction")]
    NotInTransaction,

    /// `attach` on a thread that already holds a transaction.
    #[error("thread already holds transaction {txn}; detach or end it before attaching")]
    AlreadyAttached {
        /// The transaction bound to the thread.
        txn: TxnId,
    },

    /// A transaction was handed to a coordinator that did not create it.
    #[error("transaction {txn} belongs to a different coordinator")]
    WrongCoordinator {
        /// The foreign transaction.
        txn: TxnId,
    },

    /// Commit or abort of a transaction that already decided.
    #[error("transaction {txn} already decided: {state}")]
    AlreadyDecided {
        /// The transaction.
        txn: TxnId,
        /// Its state.
        state: TxnState,
    },

    /// Any operation other than `end` on an ended transaction.
    #[error("transaction {txn} has ended")]
    TransactionEnded {
        /// The transaction.
        txn: TxnId,
    },

    /// `end()` on a writer that neither committed nor aborted. The writer
    /// has been aborted.
    #[error("write transaction {txn} ended without commit or abort; aborted")]
    EndWithoutDecision {
        /// The transaction.
        txn: TxnId,
    },

    /// A mutation attempted in a read transaction.
    #[error("transaction {txn} is not a write transaction")]
    NotWriteTransaction {
        /// The transaction.
        txn: TxnId,
    },

    /// `enable_writers` without a matching block.
    #[error("enable_writers without a matching block_writers")]
    UnmatchedEnableWriters,

    /// `finish_exclusive_mode` without a matching start.
    #[error("finish_exclusive_mode without a matching start_exclusive_mode")]
    UnmatchedFinishExclusive,

    /// A component's per-transaction state is missing or inconsistent.
    #[error("component {component}: {message}")]
    Component {
        /// The component.
        component: ComponentId,
        /// What went wrong.
        message: String,
    },

    /// Components failed after the commit point. The commit is durable in
    /// the journal and the coordinator is poisoned; the next start
    /// replays it.
    #[error("transaction {txn} committed but component apply failed: {message}")]
    PostCommit {
        /// The transaction.
        txn: TxnId,
        /// Collected component failures.
        message: String,
    },
}

impl TxnError {
    /// Creates a journal corruption error.
    pub fn journal_corruption(message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            message: message.into(),
        }
    }

    /// Creates a component error.
    pub fn component(component: ComponentId, message: impl Into<String>) -> Self {
        Self::Component {
            component,
            message: message.into(),
        }
    }

    /// Returns `true` for protocol misuse by the caller, as opposed to
    /// I/O, corruption or component failures.
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationLocked
                | Self::NotStarted
                | Self::Shutdown
                | Self::DuplicateComponent { .. }
                | Self::NestedTransaction { .. }
                | Self::NotInTransaction
                | Self::AlreadyAttached { .. }
                | Self::WrongCoordinator { .. }
                | Self::AlreadyDecided { .. }
                | Self::TransactionEnded { .. }
                | Self::EndWithoutDecision { .. }
                | Self::NotWriteTransaction { .. }
                | Self::UnmatchedEnableWriters
                | Self::UnmatchedFinishExclusive
        )
    }

    /// Returns `true` for errors that make the coordinator unusable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Storage(_)
                | Self::JournalCorruption { .. }
                | Self::ChecksumMismatch { .. }
                | Self::Poisoned
                | Self::PostCommit { .. }
        )
    }
}
