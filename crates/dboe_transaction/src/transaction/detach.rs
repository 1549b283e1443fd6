//! Detached transactions.

use crate::id::TxnId;
use crate::transaction::Transaction;
use crate::types::{TxnInfo, TxnState};

/// A transaction that no thread is driving.
///
/// Produced by detach and consumed by attach. It cannot be cloned, so it
/// can be attached at most once. It is `Send` and may be attached on any
/// thread. The transaction's view is unchanged while detached: reads after
/// attach see exactly what they saw before detach.
///
/// Dropping a `CoordinatorState` drops the transaction, which aborts it if
/// undecided and ends it.
#[derive(Debug)]
pub struct CoordinatorState {
    txn: Transaction,
}

impl CoordinatorState {
    pub(crate) fn new(txn: Transaction) -> Self {
        Self { txn }
    }

    pub(crate) fn into_transaction(self) -> Transaction {
        self.txn
    }

    /// The detached transaction's id.
    #[must_use]
    pub fn txn_id(&self) -> TxnId {
        self.txn.id()
    }

    /// The detached transaction's info.
    #[must_use]
    pub fn info(&self) -> TxnInfo {
        self.txn.info()
    }

    /// The detached transaction's state.
    #[must_use]
    pub fn state(&self) -> TxnState {
        self.txn.state()
    }
}
