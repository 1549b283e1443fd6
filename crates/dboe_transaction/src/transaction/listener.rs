//! Observers of transaction lifecycle steps and of coordinator shutdown.

use crate::types::TxnInfo;

/// Notified around each step of every transaction.
///
/// All methods default to doing nothing. `*_start` runs before the step;
/// `*_finish` runs only if the step succeeded. Calls happen on the thread
/// driving the transaction with no coordinator lock held, so a listener
/// may query the coordinator but must not begin a transaction on it.
pub trait TransactionListener: Send + Sync {
    /// A transaction was admitted and every component has begun it.
    fn on_begin(&self, _txn: &TxnInfo) {}

    /// A promote-capable reader is about to try promotion.
    fn on_promote_start(&self, _txn: &TxnInfo) {}

    /// Promotion was attempted; `promoted` says whether it succeeded.
    fn on_promote_finish(&self, _txn: &TxnInfo, _promoted: bool) {}

    /// Redo is about to be collected.
    fn on_prepare_start(&self, _txn: &TxnInfo) {}

    /// Redo was collected and journaled.
    fn on_prepare_finish(&self, _txn: &TxnInfo) {}

    /// Commit is starting.
    fn on_commit_start(&self, _txn: &TxnInfo) {}

    /// Commit finished and every component applied it.
    fn on_commit_finish(&self, _txn: &TxnInfo) {}

    /// Abort is starting.
    fn on_abort_start(&self, _txn: &TxnInfo) {}

    /// Abort finished.
    fn on_abort_finish(&self, _txn: &TxnInfo) {}

    /// The transaction ended and released its admission slot.
    fn on_end(&self, _txn: &TxnInfo) {}
}

/// Runs once when the coordinator shuts down, after the components.
pub trait ShutdownHook: Send + Sync {
    /// Called from [`crate::TransactionCoordinator::shutdown`].
    fn shutdown(&self);
}

impl<F> ShutdownHook for F
where
    F: Fn() + Send + Sync,
{
    fn shutdown(&self) {
        self()
    }
}
