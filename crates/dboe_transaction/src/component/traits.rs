//! The participant interface.

use crate::error::TxnResult;
use crate::id::ComponentId;
use crate::types::TxnInfo;

/// A participant in coordinated transactions.
///
/// The coordinator calls every registered component, in registration order,
/// at each step of a transaction's life:
///
/// ```text
/// begin ─┬─ promote? ─ prepare ─ commit ─┬─ complete
///        └──────────── abort ────────────┘
/// ```
///
/// `complete` is called exactly once per transaction whatever the outcome.
/// Hooks receive the transaction's [`TxnInfo`]; components key their
/// private state by `info.id` so the state follows a transaction that is
/// detached and attached on another thread.
///
/// On start the coordinator either calls [`clean_start`](Self::clean_start)
/// (empty journal) or runs recovery: `start_recovery`, `recover` once per
/// committed redo entry for this component, then `finish_recovery`.
pub trait TransactionalComponent: Send + Sync {
    /// Identifier tagging this component's journal entries.
    fn component_id(&self) -> ComponentId;

    /// Called on start when there is nothing to recover.
    fn clean_start(&self) -> TxnResult<()> {
        Ok(())
    }

    /// Called before the first `recover`.
    fn start_recovery(&self) -> TxnResult<()> {
        Ok(())
    }

    /// Installs the redo bytes of one committed transaction.
    fn recover(&self, redo: &[u8]) -> TxnResult<()>;

    /// Called after the last `recover`.
    fn finish_recovery(&self) -> TxnResult<()> {
        Ok(())
    }

    /// Sets up the transaction's view of this component.
    fn begin(&self, txn: &TxnInfo) -> TxnResult<()>;

    /// The transaction has become a writer. With `read_committed`, the view
    /// must move to the latest committed state.
    fn promote(&self, txn: &TxnInfo, read_committed: bool) -> TxnResult<()>;

    /// Produces redo bytes for the journal, if this transaction changed
    /// anything. Called only for writers. Must not make changes visible.
    fn prepare(&self, txn: &TxnInfo) -> TxnResult<Option<Vec<u8>>>;

    /// Makes the transaction's changes permanent and visible.
    fn commit(&self, txn: &TxnInfo) -> TxnResult<()>;

    /// Discards the transaction's changes.
    fn abort(&self, txn: &TxnInfo) -> TxnResult<()>;

    /// Releases everything held for the transaction.
    fn complete(&self, txn: &TxnInfo) -> TxnResult<()>;

    /// The coordinator is shutting down.
    fn shutdown(&self) -> TxnResult<()> {
        Ok(())
    }
}
