//! Run a unit of work inside a transaction.
//!
//! ```text
//! begin ─ f ─┬─ Ok  ─ commit ─ end ─ Ok(value)
//!            └─ Err ─ abort  ─ end ─ Err(original)
//! ```
//!
//! An error raised while aborting is logged and dropped; the caller sees
//! the error from `f`. If `f` panics the transaction is aborted and ended
//! before the panic continues.

use crate::error::{TxnError, TxnResult};
use crate::transactional::Transactional;
use crate::types::{TxnInfo, TxnState, TxnType};
use tracing::warn;

/// The primitives the helpers in this module are built on.
pub trait TxnOps {
    /// Begins a transaction for the caller.
    fn begin(&self, txn_type: TxnType) -> TxnResult<TxnInfo>;
    /// Commits the caller's transaction.
    fn commit(&self) -> TxnResult<()>;
    /// Aborts the caller's transaction.
    fn abort(&self) -> TxnResult<()>;
    /// Ends the caller's transaction.
    fn end(&self) -> TxnResult<()>;
    /// State of the caller's transaction, if it has one.
    fn txn_state(&self) -> Option<TxnState>;
}

impl TxnOps for Transactional {
    fn begin(&self, txn_type: TxnType) -> TxnResult<TxnInfo> {
        Transactional::begin(self, txn_type)
    }

    fn commit(&self) -> TxnResult<()> {
        Transactional::commit(self)
    }

    fn abort(&self) -> TxnResult<()> {
        Transactional::abort(self)
    }

    fn end(&self) -> TxnResult<()> {
        Transactional::end(self)
    }

    fn txn_state(&self) -> Option<TxnState> {
        Transactional::txn_state(self)
    }
}

/// Aborts and ends on unwind.
struct UnwindGuard<'a, T: TxnOps + ?Sized> {
    ops: &'a T,
    armed: bool,
}

impl<T: TxnOps + ?Sized> Drop for UnwindGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            abort_quietly(self.ops);
            end_quietly(self.ops);
        }
    }
}

fn abort_quietly<T: TxnOps + ?Sized>(ops: &T) {
    if matches!(ops.txn_state(), Some(TxnState::Active | TxnState::Prepared)) {
        if let Err(e) = ops.abort() {
            warn!(error = %e, "abort after failed unit of work also failed");
        }
    }
}

fn end_quietly<T: TxnOps + ?Sized>(ops: &T) {
    if let Err(e) = ops.end() {
        warn!(error = %e, "end after failed unit of work also failed");
    }
}

/// Runs `f` in a transaction of `txn_type` and returns its value.
///
/// Commits if `f` succeeds and the transaction is still undecided. If `f`
/// already committed or aborted, that decision stands.
///
/// # Errors
///
/// Returns `f`'s error after aborting, or a begin, commit or end failure.
pub fn calculate<T, R, E, F>(ops: &T, txn_type: TxnType, f: F) -> Result<R, E>
where
    T: TxnOps + ?Sized,
    E: From<TxnError>,
    F: FnOnce(TxnInfo) -> Result<R, E>,
{
    let info = ops.begin(txn_type)?;
    let mut guard = UnwindGuard { ops, armed: true };
    let outcome = f(info);
    guard.armed = false;

    match outcome {
        Ok(value) => {
            let committed = match ops.txn_state() {
                Some(TxnState::Active | TxnState::Prepared) => ops.commit(),
                _ => Ok(()),
            };
            if committed.is_err() {
                abort_quietly(ops);
            }
            let ended = ops.end();
            committed?;
            ended?;
            Ok(value)
        }
        Err(e) => {
            abort_quietly(ops);
            end_quietly(ops);
            Err(e)
        }
    }
}

/// [`calculate`] without a value.
///
/// # Errors
///
/// As for [`calculate`].
pub fn execute<T, E, F>(ops: &T, txn_type: TxnType, f: F) -> Result<(), E>
where
    T: TxnOps + ?Sized,
    E: From<TxnError>,
    F: FnOnce(TxnInfo) -> Result<(), E>,
{
    calculate(ops, txn_type, f)
}

/// Runs `f` in a read transaction.
///
/// # Errors
///
/// As for [`calculate`].
pub fn execute_read<T, E, F>(ops: &T, f: F) -> Result<(), E>
where
    T: TxnOps + ?Sized,
    E: From<TxnError>,
    F: FnOnce(TxnInfo) -> Result<(), E>,
{
    calculate(ops, TxnType::Read, f)
}

/// Runs `f` in a write transaction.
///
/// # Errors
///
/// As for [`calculate`].
pub fn execute_write<T, E, F>(ops: &T, f: F) -> Result<(), E>
where
    T: TxnOps + ?Sized,
    E: From<TxnError>,
    F: FnOnce(TxnInfo) -> Result<(), E>,
{
    calculate(ops, TxnType::Write, f)
}

/// Computes a value in a read transaction.
///
/// # Errors
///
/// As for [`calculate`].
pub fn calculate_read<T, R, E, F>(ops: &T, f: F) -> Result<R, E>
where
    T: TxnOps + ?Sized,
    E: From<TxnError>,
    F: FnOnce(TxnInfo) -> Result<R, E>,
{
    calculate(ops, TxnType::Read, f)
}

/// Computes a value in a write transaction.
///
/// # Errors
///
/// As for [`calculate`].
pub fn calculate_write<T, R, E, F>(ops: &T, f: F) -> Result<R, E>
where
    T: TxnOps + ?Sized,
    E: From<TxnError>,
    F: FnOnce(TxnInfo) -> Result<R, E>,
{
    calculate(ops, TxnType::Write, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::TransInteger;
    use crate::id::ComponentId;
    use crate::journal::Journal;
    use crate::transaction::TransactionCoordinator;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Arc;

    #[derive(Debug)]
    enum AppError {
        Txn(TxnError),
        Rejected(&'static str),
    }

    impl From<TxnError> for AppError {
        fn from(e: TxnError) -> Self {
            Self::Txn(e)
        }
    }

    fn setup() -> (Transactional, Arc<TransInteger>) {
        let counter = Arc::new(TransInteger::new(ComponentId::from_label("n"), 10));
        let coordinator = TransactionCoordinator::new(Journal::in_memory());
        coordinator.add(counter.clone()).unwrap();
        coordinator.start().unwrap();
        (Transactional::new(coordinator), counter)
    }

    #[test]
    fn write_then_read() {
        let (txnl, counter) = setup();
        execute_write(&txnl, |txn| {
            counter.inc(txn.id)?;
            counter.inc(txn.id)?;
            Ok::<_, TxnError>(())
        })
        .unwrap();
        let value = calculate_read(&txnl, |txn| counter.get(txn.id)).unwrap();
        assert_eq!(value, 12);
        assert!(!txnl.is_in_transaction());
    }

    #[test]
    fn error_aborts_and_is_returned() {
        let (txnl, counter) = setup();
        let result: Result<(), AppError> = execute_write(&txnl, |txn| {
            counter.set(txn.id, 99)?;
            Err(AppError::Rejected("no"))
        });
        assert!(matches!(result, Err(AppError::Rejected("no"))));
        assert_eq!(counter.committed_value(), 10);
        assert!(!txnl.is_in_transaction());
        assert_eq!(txnl.coordinator().count_active(), 0);
    }

    #[test]
    fn begin_failure_converts() {
        let (txnl, _) = setup();
        txnl.begin(TxnType::Read).unwrap();
        let result: Result<(), AppError> = execute_read(&txnl, |_| Ok(()));
        assert!(matches!(
            result,
            Err(AppError::Txn(TxnError::NestedTransaction { .. }))
        ));
        txnl.end().unwrap();
    }

    #[test]
    fn write_in_read_transaction_fails() {
        let (txnl, counter) = setup();
        let result = execute_read(&txnl, |txn| counter.inc(txn.id));
        assert!(matches!(result, Err(TxnError::NotWriteTransaction { .. })));
        assert_eq!(txnl.coordinator().count_active(), 0);
    }

    #[test]
    fn explicit_abort_inside_is_respected() {
        let (txnl, counter) = setup();
        execute_write(&txnl, |txn| {
            counter.set(txn.id, 1)?;
            txnl.abort()
        })
        .unwrap();
        assert_eq!(counter.committed_value(), 10);
    }

    #[test]
    fn panic_aborts_and_ends() {
        let (txnl, counter) = setup();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), TxnError> = execute_write(&txnl, |txn| {
                counter.set(txn.id, 5)?;
                panic!("boom");
            });
        }));
        assert!(result.is_err());
        assert!(!txnl.is_in_transaction());
        assert_eq!(counter.committed_value(), 10);
        assert!(txnl.try_begin(TxnType::Write).unwrap().is_some());
        txnl.abort().unwrap();
        txnl.end().unwrap();
    }

    #[test]
    fn calculate_with_promotable_type() {
        let (txnl, counter) = setup();
        let value = calculate(&txnl, TxnType::ReadPromote, |txn| {
            let before = counter.get(txn.id)?;
            assert!(txnl.promote()?);
            counter.set(txn.id, before * 2)?;
            Ok::<_, TxnError>(before)
        })
        .unwrap();
        assert_eq!(value, 10);
        assert_eq!(counter.committed_value(), 20);
    }
}
