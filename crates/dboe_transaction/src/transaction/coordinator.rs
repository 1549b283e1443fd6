//! The transaction coordinator.

use crate::component::{ComponentGroup, TransactionalComponent};
use crate::config::CoordinatorConfig;
use crate::error::{TxnError, TxnResult};
use crate::id::{ComponentId, TxnIdGenerator};
use crate::journal::{replay, Journal, RecoveryStats};
use crate::transaction::admission::{Admission, TxnCounters, WriterGate};
use crate::transaction::{CoordinatorState, ShutdownHook, Transaction, TransactionListener};
use crate::types::{TxnInfo, TxnState, TxnType};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub(crate) struct CoordinatorInner {
    pub(crate) config: CoordinatorConfig,
    pub(crate) journal: Journal,
    pub(crate) components: RwLock<ComponentGroup>,
    pub(crate) admission: Mutex<Admission>,
    pub(crate) admission_changed: Condvar,
    /// Committed data version. Held while components take a begin snapshot
    /// and while a writer's commit is applied, so a snapshot sees all of a
    /// commit or none of it.
    pub(crate) view: Mutex<u64>,
    listeners: RwLock<Vec<Arc<dyn TransactionListener>>>,
    shutdown_hooks: Mutex<Vec<Arc<dyn ShutdownHook>>>,
    ids: Box<dyn TxnIdGenerator>,
}

impl CoordinatorInner {
    /// Calls `f` on every listener, with no lock held during the calls.
    pub(crate) fn notify_listeners(&self, f: impl Fn(&dyn TransactionListener)) {
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            f(listener.as_ref());
        }
    }
}

/// Coordinates transactions across a group of components.
///
/// Any number of readers run alongside at most one writer. Readers are
/// never blocked by the writer; they see the state committed when they
/// began. The coordinator also offers two administrative controls:
///
/// - **Writer blocking** ([`block_writers`](Self::block_writers)): no new
///   writer is admitted; readers continue
/// - **Exclusive mode** ([`start_exclusive_mode`](Self::start_exclusive_mode)):
///   no transaction at all is active or admitted
///
/// Cloning yields another handle on the same coordinator.
///
/// ## Lifecycle
///
/// 1. [`add`](Self::add) components
/// 2. [`start`](Self::start): recover from the journal
/// 3. [`begin`](Self::begin) transactions
/// 4. [`shutdown`](Self::shutdown)
#[derive(Clone)]
pub struct TransactionCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl TransactionCoordinator {
    /// Creates a coordinator with default configuration.
    #[must_use]
    pub fn new(journal: Journal) -> Self {
        Self::with_config(journal, CoordinatorConfig::default())
    }

    /// Creates a coordinator with the given configuration.
    #[must_use]
    pub fn with_config(journal: Journal, config: CoordinatorConfig) -> Self {
        let ids = config.txn_ids.generator();
        Self {
            inner: Arc::new(CoordinatorInner {
                config,
                journal,
                components: RwLock::new(ComponentGroup::new()),
                admission: Mutex::new(Admission::new()),
                admission_changed: Condvar::new(),
                view: Mutex::new(0),
                listeners: RwLock::new(Vec::new()),
                shutdown_hooks: Mutex::new(Vec::new()),
                ids,
            }),
        }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// The journal.
    #[must_use]
    pub fn journal(&self) -> &Journal {
        &self.inner.journal
    }

    /// Registers a component. Components are driven in registration order.
    ///
    /// Legal before `start`, or inside [`modify_config`](Self::modify_config).
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::ConfigurationLocked`] after `start`, or
    /// [`TxnError::DuplicateComponent`] if the id is taken.
    pub fn add(&self, component: Arc<dyn TransactionalComponent>) -> TxnResult<()> {
        self.inner.admission.lock().check_configurable()?;
        let id = component.component_id();
        self.inner.components.write().add(component)?;
        debug!(component = %id, "component registered");
        Ok(())
    }

    /// Unregisters a component, returning it if it was registered.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::ConfigurationLocked`] after `start` outside
    /// [`modify_config`](Self::modify_config).
    pub fn remove(&self, id: ComponentId) -> TxnResult<Option<Arc<dyn TransactionalComponent>>> {
        self.inner.admission.lock().check_configurable()?;
        let removed = self.inner.components.write().remove(id);
        if removed.is_some() {
            debug!(component = %id, "component removed");
        }
        Ok(removed)
    }

    /// Adds a lifecycle listener.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::ConfigurationLocked`] after `start` outside
    /// [`modify_config`](Self::modify_config).
    pub fn add_listener(&self, listener: Arc<dyn TransactionListener>) -> TxnResult<()> {
        self.inner.admission.lock().check_configurable()?;
        self.inner.listeners.write().push(listener);
        Ok(())
    }

    /// Removes a listener previously added, compared by pointer. Returns
    /// whether it was found.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::ConfigurationLocked`] after `start` outside
    /// [`modify_config`](Self::modify_config).
    pub fn remove_listener(&self, listener: &Arc<dyn TransactionListener>) -> TxnResult<bool> {
        self.inner.admission.lock().check_configurable()?;
        let mut listeners = self.inner.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        Ok(listeners.len() != before)
    }

    /// Adds a hook run by [`shutdown`](Self::shutdown). A coordinator that
    /// is never shut down never runs its hooks.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::ConfigurationLocked`] after `start` outside
    /// [`modify_config`](Self::modify_config).
    pub fn add_shutdown_hook(&self, hook: Arc<dyn ShutdownHook>) -> TxnResult<()> {
        self.inner.admission.lock().check_configurable()?;
        self.inner.shutdown_hooks.lock().push(hook);
        Ok(())
    }

    /// Removes a shutdown hook, compared by pointer. Returns whether it
    /// was found.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::ConfigurationLocked`] after `start` outside
    /// [`modify_config`](Self::modify_config).
    pub fn remove_shutdown_hook(&self, hook: &Arc<dyn ShutdownHook>) -> TxnResult<bool> {
        self.inner.admission.lock().check_configurable()?;
        let mut hooks = self.inner.shutdown_hooks.lock();
        let before = hooks.len();
        hooks.retain(|h| !Arc::ptr_eq(h, hook));
        Ok(hooks.len() != before)
    }

    /// Changes configuration after `start`.
    ///
    /// Enters exclusive mode, unlocks [`add`](Self::add),
    /// [`remove`](Self::remove) and the listener and hook methods, runs
    /// `f`, then locks configuration again and leaves exclusive mode.
    /// Components added here get neither `clean_start` nor recovery.
    ///
    /// Deadlocks if the calling thread holds a transaction, or if `f`
    /// begins one.
    pub fn modify_config<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        self.start_exclusive_mode();
        let _exclusive = ExclusiveGuard(self);
        self.inner.admission.lock().begin_reconfigure();
        let _reconfigure = ReconfigureGuard(self);
        debug!("configuration unlocked");
        f(self)
    }

    /// Registered component ids, in order.
    #[must_use]
    pub fn components(&self) -> Vec<ComponentId> {
        self.inner.components.read().ids()
    }

    /// Starts the coordinator.
    ///
    /// If the journal holds entries, every component is taken through
    /// recovery: committed redo is replayed, aborted and incomplete redo
    /// is discarded, and the journal is reset. Otherwise every component
    /// gets `clean_start`.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::ConfigurationLocked`] if already started, or any
    /// journal or component failure during recovery.
    pub fn start(&self) -> TxnResult<RecoveryStats> {
        let inner = &self.inner;
        inner.admission.lock().check_startable()?;

        let components = inner.components.read();
        let stats = if inner.journal.is_empty()? {
            for component in components.iter() {
                component.clean_start()?;
            }
            RecoveryStats::default()
        } else {
            info!(location = ?inner.journal.location(), "recovering from journal");
            for component in components.iter() {
                component.start_recovery()?;
            }
            let stats = replay(inner.journal.entries(0)?, |entry| {
                match components.get(entry.component_id) {
                    Some(component) => component.recover(&entry.payload),
                    None => {
                        warn!(component = %entry.component_id, "redo for unregistered component skipped");
                        Ok(())
                    }
                }
            })?;
            for component in components.iter() {
                component.finish_recovery()?;
            }
            inner.journal.reset()?;
            inner.journal.sync()?;
            info!(
                committed = stats.committed,
                aborted = stats.aborted,
                incomplete = stats.incomplete,
                replayed = stats.replayed,
                "recovery complete"
            );
            stats
        };
        drop(components);

        inner.admission.lock().mark_started()?;
        debug!(components = inner.components.read().len(), "coordinator started");
        Ok(stats)
    }

    /// Whether `start` has run.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.admission.lock().is_started()
    }

    /// Whether `shutdown` has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.admission.lock().is_shut_down()
    }

    /// Begins a transaction.
    ///
    /// A writer waits while another writer is active, writers are blocked,
    /// or exclusive mode is on; a reader waits only for exclusive mode.
    /// With `can_block == false` the call returns `Ok(None)` instead of
    /// waiting, with no side effects.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::NotStarted`], [`TxnError::Shutdown`] or
    /// [`TxnError::Poisoned`], or a component's `begin` failure.
    pub fn begin(&self, txn_type: TxnType, can_block: bool) -> TxnResult<Option<Transaction>> {
        let inner = &self.inner;
        let mode = txn_type.initial_mode();
        let id = {
            let mut admission = inner.admission.lock();
            loop {
                admission.check_running()?;
                if admission.can_admit(mode) {
                    let id = inner.ids.generate();
                    admission.admit(id, mode);
                    break id;
                }
                if !can_block {
                    debug!(?txn_type, "begin refused without blocking");
                    return Ok(None);
                }
                inner.admission_changed.wait(&mut admission);
            }
        };

        let version = inner.view.lock();
        let info = TxnInfo {
            id,
            txn_type,
            mode,
            data_version: *version,
        };
        let components = inner.components.read();
        let mut failed = None;
        for (begun, component) in components.iter().enumerate() {
            if let Err(e) = component.begin(&info) {
                warn!(txn = %id, component = %component.component_id(), error = %e, "component begin failed");
                failed = Some((begun, e));
                break;
            }
        }
        if let Some((begun, _)) = failed {
            for (n, component) in components.iter().enumerate().take(begun + 1) {
                if n < begun {
                    if let Err(e) = component.abort(&info) {
                        warn!(txn = %id, component = %component.component_id(), error = %e, "component abort failed");
                    }
                }
                if let Err(e) = component.complete(&info) {
                    warn!(txn = %id, component = %component.component_id(), error = %e, "component complete failed");
                }
            }
        }
        drop(components);
        drop(version);

        if let Some((_, e)) = failed {
            inner.admission.lock().release(id, mode);
            inner.admission_changed.notify_all();
            return Err(e);
        }

        debug!(txn = %id, ?txn_type, version = info.data_version, "begin");
        inner.notify_listeners(|l| l.on_begin(&info));
        Ok(Some(Transaction::new(Arc::clone(inner), info)))
    }

    /// Stops new writers from being admitted, waiting for an active writer
    /// to end first. Readers are unaffected. Blocks nest; each needs its
    /// own [`enable_writers`](Self::enable_writers).
    ///
    /// Deadlocks if the calling thread is the active writer.
    pub fn block_writers(&self) {
        let mut admission = self.inner.admission.lock();
        while !admission.can_block_writers() {
            self.inner.admission_changed.wait(&mut admission);
        }
        admission.block_writers();
        debug!("writers blocked");
    }

    /// Blocks writers only if no writer is active and none are blocked.
    pub fn try_block_writers(&self) -> bool {
        let blocked = self.inner.admission.lock().try_block_writers();
        if blocked {
            debug!("writers blocked");
        }
        blocked
    }

    /// Removes one writer block.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::UnmatchedEnableWriters`] if writers are not blocked.
    pub fn enable_writers(&self) -> TxnResult<()> {
        self.inner.admission.lock().enable_writers()?;
        self.inner.admission_changed.notify_all();
        debug!("writers enabled");
        Ok(())
    }

    /// Whether new writers are currently blocked.
    #[must_use]
    pub fn writers_blocked(&self) -> bool {
        matches!(self.inner.admission.lock().writer(), WriterGate::Blocked(_))
    }

    /// Waits until no transaction is active, then holds off all admission
    /// until [`finish_exclusive_mode`](Self::finish_exclusive_mode).
    ///
    /// Deadlocks if the calling thread holds a transaction.
    pub fn start_exclusive_mode(&self) {
        let mut admission = self.inner.admission.lock();
        while !admission.can_start_exclusive() {
            self.inner.admission_changed.wait(&mut admission);
        }
        admission.start_exclusive();
        debug!("exclusive mode on");
    }

    /// Enters exclusive mode, waiting only if `can_block`. Returns whether
    /// exclusive mode was entered.
    pub fn try_exclusive_mode(&self, can_block: bool) -> bool {
        if can_block {
            self.start_exclusive_mode();
            return true;
        }
        let mut admission = self.inner.admission.lock();
        if !admission.can_start_exclusive() {
            return false;
        }
        admission.start_exclusive();
        debug!("exclusive mode on");
        true
    }

    /// Leaves exclusive mode.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::UnmatchedFinishExclusive`] if not in exclusive mode.
    pub fn finish_exclusive_mode(&self) -> TxnResult<()> {
        self.inner.admission.lock().finish_exclusive()?;
        self.inner.admission_changed.notify_all();
        debug!("exclusive mode off");
        Ok(())
    }

    /// Whether exclusive mode is on.
    #[must_use]
    pub fn is_exclusive_mode(&self) -> bool {
        self.inner.admission.lock().is_exclusive()
    }

    /// Runs `f` in exclusive mode.
    pub fn exec_exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        self.start_exclusive_mode();
        let _guard = ExclusiveGuard(self);
        f()
    }

    /// Runs `f` with writers blocked.
    pub fn exec_as_writer<R>(&self, f: impl FnOnce() -> R) -> R {
        self.block_writers();
        let _guard = WriterBlockGuard(self);
        f()
    }

    /// Detaches `txn` from its driver. The transaction stays active.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::WrongCoordinator`] if `txn` belongs elsewhere or
    /// [`TxnError::TransactionEnded`] if it has ended; the transaction is
    /// dropped in both cases.
    pub fn detach(&self, txn: Transaction) -> TxnResult<CoordinatorState> {
        if !txn.belongs_to(&self.inner) {
            return Err(TxnError::WrongCoordinator { txn: txn.id() });
        }
        if txn.state() == TxnState::Ended {
            return Err(TxnError::TransactionEnded { txn: txn.id() });
        }
        debug!(txn = %txn.id(), "detach");
        Ok(CoordinatorState::new(txn))
    }

    /// Takes back a detached transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::WrongCoordinator`] if the state came from
    /// another coordinator; that transaction is then dropped (aborted and
    /// ended).
    pub fn attach(&self, state: CoordinatorState) -> TxnResult<Transaction> {
        let txn = state.into_transaction();
        if !txn.belongs_to(&self.inner) {
            return Err(TxnError::WrongCoordinator { txn: txn.id() });
        }
        debug!(txn = %txn.id(), "attach");
        Ok(txn)
    }

    /// Snapshot of all counters, taken atomically.
    #[must_use]
    pub fn counters(&self) -> TxnCounters {
        self.inner.admission.lock().counters()
    }

    /// Transactions begun and not ended.
    #[must_use]
    pub fn count_active(&self) -> u64 {
        self.counters().active()
    }

    /// Transactions begun.
    #[must_use]
    pub fn count_begin(&self) -> u64 {
        self.counters().begun
    }

    /// Transactions ended.
    #[must_use]
    pub fn count_finished(&self) -> u64 {
        self.counters().finished
    }

    /// Transactions begun as readers.
    #[must_use]
    pub fn count_begin_read(&self) -> u64 {
        self.counters().begin_read
    }

    /// Transactions begun as writers.
    #[must_use]
    pub fn count_begin_write(&self) -> u64 {
        self.counters().begin_write
    }

    /// Active readers.
    #[must_use]
    pub fn count_active_readers(&self) -> u64 {
        self.counters().active_readers
    }

    /// Active writers (0 or 1).
    #[must_use]
    pub fn count_active_writers(&self) -> u64 {
        self.counters().active_writers
    }

    /// Number of writer commits applied since start.
    #[must_use]
    pub fn data_version(&self) -> u64 {
        *self.inner.view.lock()
    }

    /// Shuts down: components get `shutdown` and the journal is closed.
    /// Later `begin` calls and writer commits fail with
    /// [`TxnError::Shutdown`]. Transactions still active may only abort or
    /// end. A second call is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the journal close failure, or the first component failure.
    pub fn shutdown(&self) -> TxnResult<()> {
        let inner = &self.inner;
        {
            let mut admission = inner.admission.lock();
            if !admission.mark_shut_down() {
                return Ok(());
            }
            let active = admission.counters().active();
            if active > 0 {
                warn!(active, "shutting down with active transactions");
            }
        }
        inner.admission_changed.notify_all();

        let mut first_error = None;
        for component in inner.components.read().iter() {
            if let Err(e) = component.shutdown() {
                warn!(component = %component.component_id(), error = %e, "component shutdown failed");
                first_error.get_or_insert(e);
            }
        }
        let hooks = inner.shutdown_hooks.lock().clone();
        for hook in &hooks {
            hook.shutdown();
        }
        inner.journal.close()?;
        info!("coordinator shut down");
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("components", &self.components())
            .field("counters", &self.counters())
            .field("journal", &self.inner.journal)
            .finish_non_exhaustive()
    }
}

struct ExclusiveGuard<'a>(&'a TransactionCoordinator);

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.finish_exclusive_mode() {
            warn!(error = %e, "leaving exclusive mode failed");
        }
    }
}

struct ReconfigureGuard<'a>(&'a TransactionCoordinator);

impl Drop for ReconfigureGuard<'_> {
    fn drop(&mut self) {
        self.0.inner.admission.lock().end_reconfigure();
        debug!("configuration locked");
    }
}

struct WriterBlockGuard<'a>(&'a TransactionCoordinator);

impl Drop for WriterBlockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.enable_writers() {
            warn!(error = %e, "re-enabling writers failed");
        }
    }
}
