//! Thread-bound transaction handle.

use crate::error::{TxnError, TxnResult};
use crate::transaction::{CoordinatorState, Transaction, TransactionCoordinator};
use crate::types::{TxnInfo, TxnState, TxnType};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::thread::{self, ThreadId};
use tracing::debug;

/// Application-facing handle that binds at most one transaction to each
/// thread.
///
/// Calls act on the calling thread's transaction. A transaction moves to
/// another thread by [`detach`](Self::detach) on one and
/// [`attach`](Self::attach) on the other.
///
/// ```rust
/// use dboe_transaction::{Journal, TransactionCoordinator, Transactional, TxnType};
///
/// let coordinator = TransactionCoordinator::new(Journal::in_memory());
/// coordinator.start().unwrap();
/// let txnl = Transactional::new(coordinator);
///
/// txnl.begin(TxnType::Write).unwrap();
/// let state = txnl.detach().unwrap();
/// assert!(!txnl.is_in_transaction());
///
/// std::thread::scope(|s| {
///     s.spawn(|| {
///         txnl.attach(state).unwrap();
///         txnl.commit().unwrap();
///         txnl.end().unwrap();
///     });
/// });
/// assert_eq!(txnl.coordinator().count_active(), 0);
/// ```
pub struct Transactional {
    coordinator: TransactionCoordinator,
    bound: Mutex<HashMap<ThreadId, Transaction>>,
}

impl Transactional {
    /// Wraps a coordinator.
    #[must_use]
    pub fn new(coordinator: TransactionCoordinator) -> Self {
        Self {
            coordinator,
            bound: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    /// Begins a transaction on this thread, waiting for admission.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::NestedTransaction`] if this thread already has
    /// one, or any coordinator error.
    pub fn begin(&self, txn_type: TxnType) -> TxnResult<TxnInfo> {
        self.begin_inner(txn_type, true)?
            .ok_or(TxnError::NotStarted)
    }

    /// Begins a transaction on this thread if admission is immediate.
    ///
    /// # Errors
    ///
    /// As for [`begin`](Self::begin).
    pub fn try_begin(&self, txn_type: TxnType) -> TxnResult<Option<TxnInfo>> {
        self.begin_inner(txn_type, false)
    }

    fn begin_inner(&self, txn_type: TxnType, can_block: bool) -> TxnResult<Option<TxnInfo>> {
        let key = thread::current().id();
        if let Some(txn) = self.bound.lock().get(&key) {
            return Err(TxnError::NestedTransaction { txn: txn.id() });
        }
        let Some(txn) = self.coordinator.begin(txn_type, can_block)? else {
            return Ok(None);
        };
        let info = txn.info();
        self.bound.lock().insert(key, txn);
        Ok(Some(info))
    }

    /// Commits this thread's transaction. It stays bound until `end`.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::NotInTransaction`] or the commit failure.
    pub fn commit(&self) -> TxnResult<()> {
        self.with_current(Transaction::commit)
    }

    /// Aborts this thread's transaction. It stays bound until `end`.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::NotInTransaction`] or the abort failure.
    pub fn abort(&self) -> TxnResult<()> {
        self.with_current(Transaction::abort)
    }

    /// Promotes this thread's transaction to writer. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::NotInTransaction`] or the promote failure.
    pub fn promote(&self) -> TxnResult<bool> {
        self.with_current(Transaction::promote)
    }

    /// Ends and unbinds this thread's transaction. A no-op if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::EndWithoutDecision`] for an undecided writer,
    /// which has been aborted and unbound.
    pub fn end(&self) -> TxnResult<()> {
        let taken = self.bound.lock().remove(&thread::current().id());
        match taken {
            Some(mut txn) => txn.end(),
            None => Ok(()),
        }
    }

    /// Whether this thread has a transaction.
    #[must_use]
    pub fn is_in_transaction(&self) -> bool {
        self.bound.lock().contains_key(&thread::current().id())
    }

    /// Info for this thread's transaction.
    #[must_use]
    pub fn txn_info(&self) -> Option<TxnInfo> {
        self.bound
            .lock()
            .get(&thread::current().id())
            .map(Transaction::info)
    }

    /// State of this thread's transaction.
    #[must_use]
    pub fn txn_state(&self) -> Option<TxnState> {
        self.bound
            .lock()
            .get(&thread::current().id())
            .map(Transaction::state)
    }

    /// Unbinds this thread's transaction without ending it.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::NotInTransaction`] if this thread has none.
    pub fn detach(&self) -> TxnResult<CoordinatorState> {
        let txn = self
            .bound
            .lock()
            .remove(&thread::current().id())
            .ok_or(TxnError::NotInTransaction)?;
        self.coordinator.detach(txn)
    }

    /// Binds a detached transaction to this thread.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::AlreadyAttached`] if this thread already has a
    /// transaction, or [`TxnError::WrongCoordinator`]. In both cases the
    /// detached transaction is dropped, which aborts and ends it.
    pub fn attach(&self, state: CoordinatorState) -> TxnResult<()> {
        let key = thread::current().id();
        let mut bound = self.bound.lock();
        if let Some(current) = bound.get(&key) {
            return Err(TxnError::AlreadyAttached { txn: current.id() });
        }
        let txn = self.coordinator.attach(state)?;
        debug!(txn = %txn.id(), thread = ?key, "bound to thread");
        bound.insert(key, txn);
        Ok(())
    }

    /// Runs `f` on this thread's transaction with the binding lock released.
    fn with_current<R>(&self, f: impl FnOnce(&mut Transaction) -> TxnResult<R>) -> TxnResult<R> {
        let key = thread::current().id();
        let mut txn = self
            .bound
            .lock()
            .remove(&key)
            .ok_or(TxnError::NotInTransaction)?;
        let result = f(&mut txn);
        self.bound.lock().insert(key, txn);
        result
    }
}

impl std::fmt::Debug for Transactional {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transactional")
            .field("coordinator", &self.coordinator)
            .field("bound", &self.bound.lock().len())
            .finish()
    }
}
