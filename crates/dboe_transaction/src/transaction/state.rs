//! The transaction state machine.

use crate::component::TransactionalComponent;
use crate::error::{TxnError, TxnResult};
use crate::id::TxnId;
use crate::journal::JournalEntry;
use crate::transaction::coordinator::CoordinatorInner;
use crate::types::{ReadWrite, TxnInfo, TxnState, TxnType};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// One in-flight transaction.
///
/// Created by [`crate::TransactionCoordinator::begin`]. The owner drives it
/// through `commit` or `abort` and then `end`:
///
/// ```text
/// Active ─┬─ prepare ─ Prepared ─ commit ─ Committed ─┬─ end ─ Ended
///         └──────────────── abort ─ Aborted ──────────┘
/// ```
///
/// A `Transaction` is `Send` and owned by exactly one party at a time.
/// Dropping one that has not ended aborts it (if undecided) and ends it.
pub struct Transaction {
    coordinator: Arc<CoordinatorInner>,
    info: TxnInfo,
    state: TxnState,
}

impl Transaction {
    pub(crate) fn new(coordinator: Arc<CoordinatorInner>, info: TxnInfo) -> Self {
        Self {
            coordinator,
            info,
            state: TxnState::Active,
        }
    }

    /// Transaction id.
    #[must_use]
    pub fn id(&self) -> TxnId {
        self.info.id
    }

    /// What components are told about this transaction.
    #[must_use]
    pub fn info(&self) -> TxnInfo {
        self.info
    }

    /// How it was begun.
    #[must_use]
    pub fn txn_type(&self) -> TxnType {
        self.info.txn_type
    }

    /// Current mode; changes from `Read` to `Write` on promotion.
    #[must_use]
    pub fn mode(&self) -> ReadWrite {
        self.info.mode
    }

    /// Whether the transaction is currently a writer.
    #[must_use]
    pub fn is_write(&self) -> bool {
        self.info.is_write()
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> TxnState {
        self.state
    }

    pub(crate) fn belongs_to(&self, coordinator: &Arc<CoordinatorInner>) -> bool {
        Arc::ptr_eq(&self.coordinator, coordinator)
    }

    /// Collects redo from every component and appends it to the journal.
    /// Nothing becomes visible. `commit` prepares implicitly.
    ///
    /// On failure the transaction is aborted.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction has decided or ended, or if a
    /// component or the journal fails.
    pub fn prepare(&mut self) -> TxnResult<()> {
        self.ensure_undecided()?;
        if self.state == TxnState::Prepared {
            return Ok(());
        }
        self.coordinator.notify_listeners(|l| l.on_prepare_start(&self.info));
        if self.is_write() {
            if let Err(e) = self.write_redo() {
                self.abort_after_failure("prepare");
                return Err(e);
            }
        }
        self.state = TxnState::Prepared;
        self.coordinator.notify_listeners(|l| l.on_prepare_finish(&self.info));
        Ok(())
    }

    /// Commits.
    ///
    /// For a writer: prepare (if not done), append `COMMIT`, sync the
    /// journal, then commit every component in registration order. The
    /// sync is the commit point. A journal failure before it aborts the
    /// transaction and poisons the coordinator. A component failure after
    /// it is [`TxnError::PostCommit`]; the transaction still counts as
    /// committed, the coordinator is poisoned so the journal keeps its
    /// redo, and the next start replays it.
    ///
    /// Readers write nothing to the journal.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::AlreadyDecided`] or [`TxnError::TransactionEnded`]
    /// on misuse, or the failure described above.
    pub fn commit(&mut self) -> TxnResult<()> {
        self.ensure_undecided()?;
        self.coordinator.notify_listeners(|l| l.on_commit_start(&self.info));
        if !self.is_write() {
            let failures = self.each_component(|c, info| c.commit(info));
            self.state = TxnState::Committed;
            debug!(txn = %self.info.id, "read transaction committed");
            first_failure(failures)?;
            self.coordinator.notify_listeners(|l| l.on_commit_finish(&self.info));
            return Ok(());
        }

        let check = self.coordinator.admission.lock().check_running();
        if let Err(e) = check {
            self.abort_after_failure("commit");
            return Err(e);
        }
        if self.state == TxnState::Active {
            self.prepare()?;
        }

        if let Err(e) = self.write_commit_record() {
            error!(txn = %self.info.id, error = %e, "journal failure at commit; coordinator poisoned");
            self.coordinator.admission.lock().poison();
            let failures = self.each_component(|c, info| c.abort(info));
            for failure in failures {
                warn!(txn = %self.info.id, error = %failure, "component abort failed");
            }
            self.state = TxnState::Aborted;
            return Err(e);
        }

        let failures = {
            let mut version = self.coordinator.view.lock();
            let failures = self.each_component(|c, info| c.commit(info));
            *version += 1;
            failures
        };
        self.state = TxnState::Committed;

        if !failures.is_empty() {
            let message = failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            // Later commits would reset the journal and lose this redo.
            self.coordinator.admission.lock().poison();
            error!(txn = %self.info.id, %message, "component commit failed after the commit point; coordinator poisoned until restart");
            return Err(TxnError::PostCommit {
                txn: self.info.id,
                message,
            });
        }

        if self.coordinator.config.reset_journal_after_commit {
            self.coordinator.journal.reset()?;
        }
        debug!(txn = %self.info.id, "write transaction committed");
        self.coordinator.notify_listeners(|l| l.on_commit_finish(&self.info));
        Ok(())
    }

    /// Aborts, discarding every component's changes. A writer also appends
    /// `ABORT` to the journal.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::AlreadyDecided`] or [`TxnError::TransactionEnded`]
    /// on misuse, otherwise the first journal or component failure. The
    /// transaction is aborted either way.
    pub fn abort(&mut self) -> TxnResult<()> {
        self.ensure_undecided()?;
        self.coordinator.notify_listeners(|l| l.on_abort_start(&self.info));
        let journal_result = if self.is_write() {
            self.write_abort_record()
        } else {
            Ok(())
        };
        let failures = self.each_component(|c, info| c.abort(info));
        self.state = TxnState::Aborted;
        debug!(txn = %self.info.id, "aborted");
        journal_result?;
        first_failure(failures)?;
        self.coordinator.notify_listeners(|l| l.on_abort_finish(&self.info));
        Ok(())
    }

    /// Ends the transaction: every component's `complete` runs and the
    /// admission slot is released. A second call is a no-op.
    ///
    /// # Errors
    ///
    /// On a writer that has neither committed nor aborted, aborts it, ends
    /// it, and returns [`TxnError::EndWithoutDecision`].
    pub fn end(&mut self) -> TxnResult<()> {
        match self.state {
            TxnState::Ended => Ok(()),
            TxnState::Active | TxnState::Prepared if self.is_write() => {
                self.abort_after_failure("end");
                self.finish();
                Err(TxnError::EndWithoutDecision { txn: self.info.id })
            }
            _ => {
                self.finish();
                Ok(())
            }
        }
    }

    /// Tries to become the writer. Never blocks.
    ///
    /// - Already a writer: `true`.
    /// - Begun as [`TxnType::Read`]: `false`.
    /// - Another writer active or writers blocked: `false`.
    /// - [`TxnType::ReadPromote`] after some writer committed since this
    ///   transaction began: `false`.
    /// - [`TxnType::ReadCommittedPromote`]: components move to the latest
    ///   committed state.
    ///
    /// # Errors
    ///
    /// Returns an error after commit, abort or end. A component failure
    /// aborts the transaction and is returned.
    pub fn promote(&mut self) -> TxnResult<bool> {
        self.ensure_undecided()?;
        if self.is_write() {
            return Ok(true);
        }
        let read_committed = match self.info.txn_type {
            TxnType::ReadPromote => false,
            TxnType::ReadCommittedPromote => true,
            TxnType::Read | TxnType::Write => return Ok(false),
        };

        self.coordinator.notify_listeners(|l| l.on_promote_start(&self.info));
        let promoted = self.try_promote(read_committed)?;
        self.coordinator.notify_listeners(|l| l.on_promote_finish(&self.info, promoted));
        Ok(promoted)
    }

    fn try_promote(&mut self, read_committed: bool) -> TxnResult<bool> {
        {
            let mut admission = self.coordinator.admission.lock();
            admission.check_running()?;
            let version = *self.coordinator.view.lock();
            if !read_committed && version != self.info.data_version {
                debug!(txn = %self.info.id, "promote refused: intervening commit");
                return Ok(false);
            }
            if !admission.promote(self.info.id) {
                debug!(txn = %self.info.id, "promote refused: writer active or blocked");
                return Ok(false);
            }
            self.info.mode = ReadWrite::Write;
            self.info.data_version = version;
        }

        let failures = self.each_component(|c, info| c.promote(info, read_committed));
        if let Err(e) = first_failure(failures) {
            self.abort_after_failure("promote");
            return Err(e);
        }
        debug!(txn = %self.info.id, read_committed, "promoted");
        Ok(true)
    }

    fn ensure_undecided(&self) -> TxnResult<()> {
        match self.state {
            TxnState::Ended => Err(TxnError::TransactionEnded { txn: self.info.id }),
            state if state.is_decided() => Err(TxnError::AlreadyDecided {
                txn: self.info.id,
                state,
            }),
            _ => Ok(()),
        }
    }

    fn each_component(
        &self,
        mut f: impl FnMut(&dyn TransactionalComponent, &TxnInfo) -> TxnResult<()>,
    ) -> Vec<TxnError> {
        let components = self.coordinator.components.read();
        components
            .iter()
            .filter_map(|c| f(c.as_ref(), &self.info).err())
            .collect()
    }

    fn write_redo(&self) -> TxnResult<()> {
        let components = self.coordinator.components.read();
        for component in components.iter() {
            if let Some(redo) = component.prepare(&self.info)? {
                let entry = JournalEntry::redo(component.component_id(), redo);
                self.coordinator.journal.write(&entry).map_err(|e| {
                    self.coordinator.admission.lock().poison();
                    e
                })?;
            }
        }
        Ok(())
    }

    fn write_commit_record(&self) -> TxnResult<()> {
        let journal = &self.coordinator.journal;
        let position = journal.write(&JournalEntry::commit(self.info.id))?;
        if self.coordinator.config.sync_on_commit {
            if let Err(e) = journal.sync() {
                // A COMMIT that was reported as failed must not be replayed.
                if let Err(withdraw) = journal.truncate(position) {
                    warn!(txn = %self.info.id, error = %withdraw, "could not withdraw unsynced COMMIT entry");
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn write_abort_record(&self) -> TxnResult<()> {
        {
            let admission = self.coordinator.admission.lock();
            // Recovery discards redo with no COMMIT, so a journal that is
            // closed or broken can be skipped.
            if admission.is_shut_down() || admission.is_poisoned() {
                return Ok(());
            }
        }
        let journal = &self.coordinator.journal;
        journal.write(&JournalEntry::abort(self.info.id))?;
        if self.coordinator.config.reset_journal_after_commit {
            journal.reset()?;
        }
        Ok(())
    }

    fn abort_after_failure(&mut self, during: &'static str) {
        if self.ensure_undecided().is_err() {
            return;
        }
        if let Err(e) = self.abort() {
            warn!(txn = %self.info.id, during, error = %e, "abort after failure also failed");
        }
    }

    fn finish(&mut self) {
        for failure in self.each_component(|c, info| c.complete(info)) {
            warn!(txn = %self.info.id, error = %failure, "component complete failed");
        }
        {
            let mut admission = self.coordinator.admission.lock();
            admission.release(self.info.id, self.info.mode);
        }
        self.coordinator.admission_changed.notify_all();
        self.state = TxnState::Ended;
        debug!(txn = %self.info.id, "ended");
        self.coordinator.notify_listeners(|l| l.on_end(&self.info));
    }
}

fn first_failure(failures: Vec<TxnError>) -> TxnResult<()> {
    failures.into_iter().next().map_or(Ok(()), Err)
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TxnState::Ended {
            return;
        }
        if self.is_write() && !self.state.is_decided() {
            warn!(txn = %self.info.id, "write transaction dropped without commit or abort; aborting");
            self.abort_after_failure("drop");
        }
        self.finish();
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("info", &self.info)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
