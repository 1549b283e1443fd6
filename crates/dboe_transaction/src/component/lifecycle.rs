//! Per-transaction state bookkeeping for components.

use crate::error::{TxnError, TxnResult};
use crate::id::{ComponentId, TxnId};
use crate::types::{ReadWrite, TxnInfo};
use parking_lot::Mutex;
use std::collections::HashMap;

struct Slot<S> {
    info: TxnInfo,
    /// `None` once the transaction has committed or aborted.
    state: Option<S>,
}

/// Holds a component's private state for every live transaction.
///
/// State is keyed by [`TxnId`], never by thread, so a transaction's view
/// travels with it through detach and attach. A component calls
/// [`begin_with`](Self::begin_with) from its `begin` hook,
/// [`take`](Self::take) from `commit`/`abort`, and
/// [`complete`](Self::complete) from `complete`.
///
/// Closures passed to the accessors run under this lifecycle's lock and
/// must not call back into it.
pub struct ComponentLifecycle<S> {
    component_id: ComponentId,
    slots: Mutex<HashMap<TxnId, Slot<S>>>,
}

impl<S> ComponentLifecycle<S> {
    /// Creates an empty lifecycle for `component_id`.
    #[must_use]
    pub fn new(component_id: ComponentId) -> Self {
        Self {
            component_id,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The owning component.
    #[must_use]
    pub fn component_id(&self) -> ComponentId {
        self.component_id
    }

    /// Registers `state` for a new transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction already has state here.
    pub fn begin_with(&self, info: &TxnInfo, state: S) -> TxnResult<()> {
        let mut slots = self.slots.lock();
        if slots.contains_key(&info.id) {
            return Err(self.error(format!("{} has already begun", info.id)));
        }
        slots.insert(
            info.id,
            Slot {
                info: *info,
                state: Some(state),
            },
        );
        Ok(())
    }

    /// The transaction as this component last saw it.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is unknown here.
    pub fn info(&self, txn: TxnId) -> TxnResult<TxnInfo> {
        self.slots
            .lock()
            .get(&txn)
            .map(|slot| slot.info)
            .ok_or_else(|| self.unknown(txn))
    }

    /// Reads the transaction's state.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is unknown or already decided.
    pub fn with_state<R>(&self, txn: TxnId, f: impl FnOnce(&TxnInfo, &S) -> R) -> TxnResult<R> {
        let slots = self.slots.lock();
        let slot = slots.get(&txn).ok_or_else(|| self.unknown(txn))?;
        let state = slot.state.as_ref().ok_or_else(|| self.decided(txn))?;
        Ok(f(&slot.info, state))
    }

    /// Mutates the transaction's state. Only writers may do this.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::NotWriteTransaction`] for readers, or an error if
    /// the transaction is unknown or already decided.
    pub fn with_state_mut<R>(
        &self,
        txn: TxnId,
        f: impl FnOnce(&TxnInfo, &mut S) -> R,
    ) -> TxnResult<R> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(&txn).ok_or_else(|| self.unknown(txn))?;
        if slot.info.mode != ReadWrite::Write {
            return Err(TxnError::NotWriteTransaction { txn });
        }
        let state = slot.state.as_mut().ok_or_else(|| self.decided(txn))?;
        Ok(f(&slot.info, state))
    }

    /// Fails unless the transaction is currently a writer.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::NotWriteTransaction`] for readers.
    pub fn require_writer(&self, txn: TxnId) -> TxnResult<()> {
        if self.info(txn)?.is_write() {
            Ok(())
        } else {
            Err(TxnError::NotWriteTransaction { txn })
        }
    }

    /// Records the promotion and lets the component adjust its state.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is unknown or already decided.
    pub fn promote_with(&self, info: &TxnInfo, f: impl FnOnce(&mut S)) -> TxnResult<()> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(&info.id).ok_or_else(|| self.unknown(info.id))?;
        let state = slot.state.as_mut().ok_or_else(|| self.decided(info.id))?;
        f(state);
        slot.info = *info;
        Ok(())
    }

    /// Removes the transaction's state for commit or abort. The transaction
    /// stays known until [`complete`](Self::complete).
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is unknown or already decided.
    pub fn take(&self, txn: TxnId) -> TxnResult<(TxnInfo, S)> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(&txn).ok_or_else(|| self.unknown(txn))?;
        let state = slot.state.take().ok_or_else(|| self.decided(txn))?;
        Ok((slot.info, state))
    }

    /// Forgets the transaction. Returns `false` if it was not known.
    pub fn complete(&self, txn: TxnId) -> bool {
        self.slots.lock().remove(&txn).is_some()
    }

    /// Number of transactions with state here.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.slots.lock().len()
    }

    fn error(&self, message: String) -> TxnError {
        TxnError::component(self.component_id, message)
    }

    fn unknown(&self, txn: TxnId) -> TxnError {
        self.error(format!("no state for {txn}"))
    }

    fn decided(&self, txn: TxnId) -> TxnError {
        self.error(format!("{txn} has already committed or aborted"))
    }
}

impl<S> std::fmt::Debug for ComponentLifecycle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentLifecycle")
            .field("component_id", &self.component_id)
            .field("active", &self.active_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxnType;

    fn info(n: u64, txn_type: TxnType) -> TxnInfo {
        TxnInfo {
            id: TxnId::from_u64(n),
            txn_type,
            mode: txn_type.initial_mode(),
            data_version: 0,
        }
    }

    fn lifecycle() -> ComponentLifecycle<i64> {
        ComponentLifecycle::new(ComponentId::from_label("test"))
    }

    #[test]
    fn state_is_per_transaction() {
        let lc = lifecycle();
        let w = info(1, TxnType::Write);
        let r = info(2, TxnType::Read);
        lc.begin_with(&w, 10).unwrap();
        lc.begin_with(&r, 10).unwrap();

        lc.with_state_mut(w.id, |_, v| *v += 1).unwrap();
        assert_eq!(lc.with_state(w.id, |_, v| *v).unwrap(), 11);
        assert_eq!(lc.with_state(r.id, |_, v| *v).unwrap(), 10);
        assert_eq!(lc.active_count(), 2);
    }

    #[test]
    fn double_begin_is_rejected() {
        let lc = lifecycle();
        let w = info(1, TxnType::Write);
        lc.begin_with(&w, 0).unwrap();
        assert!(lc.begin_with(&w, 0).is_err());
    }

    #[test]
    fn readers_cannot_mutate() {
        let lc = lifecycle();
        let r = info(1, TxnType::ReadPromote);
        lc.begin_with(&r, 0).unwrap();
        assert!(matches!(
            lc.with_state_mut(r.id, |_, v| *v = 1),
            Err(TxnError::NotWriteTransaction { .. })
        ));
        assert!(lc.require_writer(r.id).is_err());
    }

    #[test]
    fn promotion_allows_writes() {
        let lc = lifecycle();
        let mut r = info(1, TxnType::ReadCommittedPromote);
        lc.begin_with(&r, 0).unwrap();
        r.mode = ReadWrite::Write;
        lc.promote_with(&r, |v| *v = 42).unwrap();
        lc.require_writer(r.id).unwrap();
        lc.with_state_mut(r.id, |_, v| *v += 1).unwrap();
        assert_eq!(lc.with_state(r.id, |_, v| *v).unwrap(), 43);
    }

    #[test]
    fn take_then_complete() {
        let lc = lifecycle();
        let w = info(1, TxnType::Write);
        lc.begin_with(&w, 5).unwrap();
        let (taken_info, value) = lc.take(w.id).unwrap();
        assert_eq!(taken_info.id, w.id);
        assert_eq!(value, 5);
        assert!(lc.take(w.id).is_err());
        assert!(lc.with_state(w.id, |_, v| *v).is_err());
        assert!(lc.info(w.id).is_ok());

        assert!(lc.complete(w.id));
        assert!(!lc.complete(w.id));
        assert_eq!(lc.active_count(), 0);
        assert!(lc.info(w.id).is_err());
    }
}
