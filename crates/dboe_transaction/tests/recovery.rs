//! Journal recovery across restarts.

use dboe_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use dboe_transaction::{
    calculate_read, execute_write, ComponentId, CoordinatorConfig, Journal, JournalEntry,
    RecoveryStats, TransBlob, TransInteger, TransactionCoordinator, TransactionalComponent,
    Transactional, TxnError, TxnId, TxnInfo, TxnResult, TxnState, TxnType,
};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

fn counter_id() -> ComponentId {
    ComponentId::from_label("counter")
}

fn start(
    journal: Journal,
    counter: &Arc<TransInteger>,
    config: CoordinatorConfig,
) -> (Transactional, RecoveryStats) {
    let coordinator = TransactionCoordinator::with_config(journal, config);
    coordinator.add(counter.clone()).unwrap();
    let stats = coordinator.start().unwrap();
    (Transactional::new(coordinator), stats)
}

fn keep_journal() -> CoordinatorConfig {
    CoordinatorConfig::new().reset_journal_after_commit(false)
}

fn set(txnl: &Transactional, counter: &TransInteger, value: i64) {
    execute_write(txnl, |txn| counter.set(txn.id, value)).unwrap();
}

#[test]
fn committed_writes_are_replayed_after_restart() {
    let backend = InMemoryBackend::new();
    let counter = Arc::new(TransInteger::new(counter_id(), 0));
    let (txnl, stats) = start(Journal::new(Box::new(backend.share())), &counter, keep_journal());
    assert_eq!(stats, RecoveryStats::default());
    set(&txnl, &counter, 7);
    set(&txnl, &counter, 8);

    // Restart without shutting down: a fresh component knows nothing.
    let restarted = Arc::new(TransInteger::new(counter_id(), 0));
    let (txnl, stats) = start(Journal::new(Box::new(backend.share())), &restarted, keep_journal());
    assert_eq!(stats.committed, 2);
    assert_eq!(stats.replayed, 2);
    assert_eq!(calculate_read(&txnl, |txn| restarted.get(txn.id)).unwrap(), 8);
    assert!(txnl.coordinator().journal().is_empty().unwrap());
}

#[test]
fn aborted_and_incomplete_transactions_are_discarded() {
    let mut backend = InMemoryBackend::new();
    let journal = Journal::new(Box::new(backend.share()));
    journal.write(&JournalEntry::redo(counter_id(), 7i64.to_le_bytes().to_vec())).unwrap();
    journal.write(&JournalEntry::commit(TxnId::from_u64(1))).unwrap();
    journal.write(&JournalEntry::redo(counter_id(), 8i64.to_le_bytes().to_vec())).unwrap();
    journal.write(&JournalEntry::abort(TxnId::from_u64(2))).unwrap();
    journal.write(&JournalEntry::redo(counter_id(), 9i64.to_le_bytes().to_vec())).unwrap();
    // A crash mid-append leaves a torn entry at the end.
    let torn = JournalEntry::commit(TxnId::from_u64(3)).encode().unwrap();
    backend.append(&torn[..torn.len() / 2]).unwrap();

    let counter = Arc::new(TransInteger::new(counter_id(), 0));
    let (_txnl, stats) = start(journal, &counter, CoordinatorConfig::default());
    assert_eq!(
        stats,
        RecoveryStats {
            committed: 1,
            aborted: 1,
            incomplete: 1,
            replayed: 1
        }
    );
    assert_eq!(counter.committed_value(), 7);
    assert!(backend.data().is_empty());
}

#[test]
fn aborted_writer_leaves_nothing_to_replay() {
    let backend = InMemoryBackend::new();
    let counter = Arc::new(TransInteger::new(counter_id(), 5));
    let (txnl, _) = start(Journal::new(Box::new(backend.share())), &counter, keep_journal());

    let info = txnl.begin(TxnType::Write).unwrap();
    counter.set(info.id, 100).unwrap();
    txnl.abort().unwrap();
    txnl.end().unwrap();

    let restarted = Arc::new(TransInteger::new(counter_id(), 5));
    let (_txnl, stats) = start(Journal::new(Box::new(backend.share())), &restarted, keep_journal());
    assert_eq!(stats.committed, 0);
    assert_eq!(restarted.committed_value(), 5);
}

#[test]
fn corrupt_journal_fails_start() {
    let mut bytes = JournalEntry::redo(counter_id(), vec![0; 8]).encode().unwrap();
    bytes[22] ^= 0x01;
    let counter = Arc::new(TransInteger::new(counter_id(), 0));
    let coordinator =
        TransactionCoordinator::new(Journal::new(Box::new(InMemoryBackend::with_data(bytes))));
    coordinator.add(counter).unwrap();
    assert!(matches!(
        coordinator.start(),
        Err(TxnError::ChecksumMismatch { .. })
    ));
    assert!(!coordinator.is_started());
}

#[test]
fn redo_for_unknown_component_is_skipped() {
    let journal = Journal::in_memory();
    journal
        .write(&JournalEntry::redo(ComponentId::from_label("gone"), vec![1, 2, 3]))
        .unwrap();
    journal.write(&JournalEntry::redo(counter_id(), 4i64.to_le_bytes().to_vec())).unwrap();
    journal.write(&JournalEntry::commit(TxnId::from_u64(1))).unwrap();

    let counter = Arc::new(TransInteger::new(counter_id(), 0));
    let (_txnl, stats) = start(journal, &counter, CoordinatorConfig::default());
    assert_eq!(stats.committed, 1);
    assert_eq!(counter.committed_value(), 4);
}

#[test]
fn file_journal_and_components_survive_restart() {
    let dir = tempdir().unwrap();
    let journal_path = dir.path().join("journal.jrnl");
    let value_path = dir.path().join("counter.dat");
    let blob_path = dir.path().join("blob.dat");

    {
        let counter = Arc::new(TransInteger::open(counter_id(), &value_path, 3).unwrap());
        let blob = Arc::new(TransBlob::open(ComponentId::from_label("blob"), &blob_path).unwrap());
        let coordinator = TransactionCoordinator::new(Journal::open(&journal_path).unwrap());
        coordinator.add(counter.clone()).unwrap();
        coordinator.add(blob.clone()).unwrap();
        coordinator.start().unwrap();
        let txnl = Transactional::new(coordinator);

        execute_write(&txnl, |txn| {
            counter.inc(txn.id)?;
            blob.append(txn.id, b"hello")
        })
        .unwrap();
        txnl.coordinator().shutdown().unwrap();
    }

    let counter = Arc::new(TransInteger::open(counter_id(), &value_path, 3).unwrap());
    let blob = TransBlob::open(ComponentId::from_label("blob"), &blob_path).unwrap();
    assert_eq!(counter.committed_value(), 4);
    assert_eq!(blob.committed().as_slice(), b"hello");

    let journal = Journal::open(&journal_path).unwrap();
    assert!(journal.is_empty().unwrap());
}

#[test]
fn journal_file_is_locked_while_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("journal.jrnl");
    let _first = Journal::open(&path).unwrap();
    assert!(matches!(
        Journal::open(&path),
        Err(TxnError::Storage(StorageError::Locked { .. }))
    ));
}

/// Records every hook call in order.
struct Recorder {
    id: ComponentId,
    log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn record(&self, hook: &str) {
        self.log.lock().push(format!("{}:{hook}", self.id));
    }
}

impl TransactionalComponent for Recorder {
    fn component_id(&self) -> ComponentId {
        self.id
    }

    fn clean_start(&self) -> TxnResult<()> {
        self.record("clean_start");
        Ok(())
    }

    fn start_recovery(&self) -> TxnResult<()> {
        self.record("start_recovery");
        Ok(())
    }

    fn recover(&self, redo: &[u8]) -> TxnResult<()> {
        self.record(&format!("recover{redo:?}"));
        Ok(())
    }

    fn finish_recovery(&self) -> TxnResult<()> {
        self.record("finish_recovery");
        Ok(())
    }

    fn begin(&self, _txn: &TxnInfo) -> TxnResult<()> {
        self.record("begin");
        Ok(())
    }

    fn promote(&self, _txn: &TxnInfo, _read_committed: bool) -> TxnResult<()> {
        self.record("promote");
        Ok(())
    }

    fn prepare(&self, _txn: &TxnInfo) -> TxnResult<Option<Vec<u8>>> {
        self.record("prepare");
        Ok(Some(vec![1]))
    }

    fn commit(&self, _txn: &TxnInfo) -> TxnResult<()> {
        self.record("commit");
        Ok(())
    }

    fn abort(&self, _txn: &TxnInfo) -> TxnResult<()> {
        self.record("abort");
        Ok(())
    }

    fn complete(&self, _txn: &TxnInfo) -> TxnResult<()> {
        self.record("complete");
        Ok(())
    }

    fn shutdown(&self) -> TxnResult<()> {
        self.record("shutdown");
        Ok(())
    }
}

fn recorders(log: &Arc<Mutex<Vec<String>>>) -> Vec<Arc<Recorder>> {
    ["a", "b"]
        .into_iter()
        .map(|label| {
            Arc::new(Recorder {
                id: ComponentId::from_label(label),
                log: Arc::clone(log),
            })
        })
        .collect()
}

#[test]
fn hooks_run_in_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let backend = InMemoryBackend::new();
    let coordinator = TransactionCoordinator::with_config(
        Journal::new(Box::new(backend.share())),
        keep_journal(),
    );
    for recorder in recorders(&log) {
        coordinator.add(recorder).unwrap();
    }
    coordinator.start().unwrap();

    let mut txn = coordinator.begin(TxnType::Write, true).unwrap().unwrap();
    txn.commit().unwrap();
    txn.end().unwrap();
    coordinator.shutdown().unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            "a:clean_start",
            "b:clean_start",
            "a:begin",
            "b:begin",
            "a:prepare",
            "b:prepare",
            "a:commit",
            "b:commit",
            "a:complete",
            "b:complete",
            "a:shutdown",
            "b:shutdown",
        ]
    );

    log.lock().clear();
    let coordinator = TransactionCoordinator::new(Journal::new(Box::new(backend.share())));
    for recorder in recorders(&log) {
        coordinator.add(recorder).unwrap();
    }
    coordinator.start().unwrap();
    assert_eq!(
        *log.lock(),
        vec![
            "a:start_recovery",
            "b:start_recovery",
            "a:recover[1]",
            "b:recover[1]",
            "a:finish_recovery",
            "b:finish_recovery",
        ]
    );
}

#[test]
fn failed_component_begin_releases_admission() {
    struct Refuses;

    impl TransactionalComponent for Refuses {
        fn component_id(&self) -> ComponentId {
            ComponentId::from_label("refuses")
        }
        fn recover(&self, _redo: &[u8]) -> TxnResult<()> {
            Ok(())
        }
        fn begin(&self, txn: &TxnInfo) -> TxnResult<()> {
            if txn.is_write() {
                Err(TxnError::component(self.component_id(), "read only"))
            } else {
                Ok(())
            }
        }
        fn promote(&self, _txn: &TxnInfo, _read_committed: bool) -> TxnResult<()> {
            Ok(())
        }
        fn prepare(&self, _txn: &TxnInfo) -> TxnResult<Option<Vec<u8>>> {
            Ok(None)
        }
        fn commit(&self, _txn: &TxnInfo) -> TxnResult<()> {
            Ok(())
        }
        fn abort(&self, _txn: &TxnInfo) -> TxnResult<()> {
            Ok(())
        }
        fn complete(&self, _txn: &TxnInfo) -> TxnResult<()> {
            Ok(())
        }
    }

    let log = Arc::new(Mutex::new(Vec::new()));
    let coordinator = TransactionCoordinator::new(Journal::in_memory());
    let first = recorders(&log).remove(0);
    coordinator.add(first).unwrap();
    coordinator.add(Arc::new(Refuses)).unwrap();
    coordinator.start().unwrap();
    log.lock().clear();

    assert!(matches!(
        coordinator.begin(TxnType::Write, false),
        Err(TxnError::Component { .. })
    ));
    assert_eq!(*log.lock(), vec!["a:begin", "a:abort", "a:complete"]);
    assert_eq!(coordinator.count_active(), 0);
    assert_eq!(coordinator.count_finished(), 1);
    assert!(coordinator.begin(TxnType::Read, false).unwrap().is_some());
}

/// Memory store whose `sync` can be made to fail.
struct FailingSync {
    inner: InMemoryBackend,
    fail: Arc<AtomicBool>,
}

impl StorageBackend for FailingSync {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }
    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.inner.append(data)
    }
    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }
    fn sync(&mut self) -> StorageResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::Io(io::Error::other("eio")));
        }
        self.inner.sync()
    }
    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }
    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
    fn close(&mut self) -> StorageResult<()> {
        self.inner.close()
    }
}

#[test]
fn failed_commit_sync_is_not_reported_as_committed() {
    let backend = InMemoryBackend::new();
    let fail = Arc::new(AtomicBool::new(false));
    let journal = Journal::new(Box::new(FailingSync {
        inner: backend.share(),
        fail: Arc::clone(&fail),
    }));
    let counter = Arc::new(TransInteger::new(counter_id(), 0));
    let coordinator = TransactionCoordinator::new(journal);
    coordinator.add(counter.clone()).unwrap();
    coordinator.start().unwrap();

    fail.store(true, Ordering::SeqCst);
    let mut txn = coordinator.begin(TxnType::Write, false).unwrap().unwrap();
    counter.set(txn.id(), 5).unwrap();
    assert!(matches!(txn.commit(), Err(TxnError::Storage(_))));
    assert_eq!(txn.state(), TxnState::Aborted);
    txn.end().unwrap();

    assert_eq!(counter.committed_value(), 0);
    assert_eq!(coordinator.data_version(), 0);
    assert!(matches!(
        coordinator.begin(TxnType::Read, false),
        Err(TxnError::Poisoned)
    ));

    // The COMMIT entry was withdrawn, so a restart does not apply it.
    let restarted = Arc::new(TransInteger::new(counter_id(), 0));
    let (_txnl, stats) = start(
        Journal::new(Box::new(backend.share())),
        &restarted,
        CoordinatorConfig::default(),
    );
    assert_eq!(stats.committed, 0);
    assert_eq!(stats.incomplete, 1);
    assert_eq!(restarted.committed_value(), 0);
}

#[test]
fn sync_on_commit_off_never_syncs() {
    let fail = Arc::new(AtomicBool::new(true));
    let journal = Journal::new(Box::new(FailingSync {
        inner: InMemoryBackend::new(),
        fail: Arc::clone(&fail),
    }));
    let counter = Arc::new(TransInteger::new(counter_id(), 0));
    let (txnl, _) = start(journal, &counter, CoordinatorConfig::new().sync_on_commit(false));

    set(&txnl, &counter, 9);
    assert_eq!(counter.committed_value(), 9);
    assert!(txnl.coordinator().journal().is_empty().unwrap());
}

/// An integer whose next commit can be made to fail.
struct FailsToApply {
    inner: TransInteger,
    fail_next: AtomicBool,
}

impl TransactionalComponent for FailsToApply {
    fn component_id(&self) -> ComponentId {
        self.inner.component_id()
    }
    fn recover(&self, redo: &[u8]) -> TxnResult<()> {
        self.inner.recover(redo)
    }
    fn begin(&self, txn: &TxnInfo) -> TxnResult<()> {
        self.inner.begin(txn)
    }
    fn promote(&self, txn: &TxnInfo, read_committed: bool) -> TxnResult<()> {
        self.inner.promote(txn, read_committed)
    }
    fn prepare(&self, txn: &TxnInfo) -> TxnResult<Option<Vec<u8>>> {
        self.inner.prepare(txn)
    }
    fn commit(&self, txn: &TxnInfo) -> TxnResult<()> {
        if txn.is_write() && self.fail_next.swap(false, Ordering::SeqCst) {
            self.inner.abort(txn)?;
            return Err(TxnError::component(self.component_id(), "disk full"));
        }
        self.inner.commit(txn)
    }
    fn abort(&self, txn: &TxnInfo) -> TxnResult<()> {
        self.inner.abort(txn)
    }
    fn complete(&self, txn: &TxnInfo) -> TxnResult<()> {
        self.inner.complete(txn)
    }
}

#[test]
fn component_failure_after_commit_point_is_replayed_on_restart() {
    let backend = InMemoryBackend::new();
    let a_id = ComponentId::from_label("a");
    let b_id = ComponentId::from_label("b");
    let a = Arc::new(TransInteger::new(a_id, 0));
    let b = Arc::new(FailsToApply {
        inner: TransInteger::new(b_id, 0),
        fail_next: AtomicBool::new(true),
    });
    let coordinator = TransactionCoordinator::new(Journal::new(Box::new(backend.share())));
    coordinator.add(a.clone()).unwrap();
    coordinator.add(b.clone()).unwrap();
    coordinator.start().unwrap();

    let mut txn = coordinator.begin(TxnType::Write, false).unwrap().unwrap();
    a.set(txn.id(), 1).unwrap();
    b.inner.set(txn.id(), 1).unwrap();
    assert!(matches!(txn.commit(), Err(TxnError::PostCommit { .. })));
    assert_eq!(txn.state(), TxnState::Committed);
    txn.end().unwrap();
    assert_eq!(a.committed_value(), 1);
    assert_eq!(b.inner.committed_value(), 0);

    // No later writer may reset the journal over the unapplied redo.
    assert!(matches!(
        coordinator.begin(TxnType::Write, false),
        Err(TxnError::Poisoned)
    ));
    assert!(!coordinator.journal().is_empty().unwrap());

    let a = Arc::new(TransInteger::new(a_id, 0));
    let b = Arc::new(TransInteger::new(b_id, 0));
    let coordinator = TransactionCoordinator::new(Journal::new(Box::new(backend.share())));
    coordinator.add(a.clone()).unwrap();
    coordinator.add(b.clone()).unwrap();
    let stats = coordinator.start().unwrap();
    assert_eq!(stats.committed, 1);
    assert_eq!(stats.replayed, 2);
    assert_eq!(a.committed_value(), 1);
    assert_eq!(b.committed_value(), 1);
}
