//! Admission state: counters, the writer gate and exclusive mode.
//!
//! Everything here is mutated under the coordinator's admission mutex, so
//! counters and admission decisions always change together.

use crate::error::{TxnError, TxnResult};
use crate::id::TxnId;
use crate::types::ReadWrite;

/// Snapshot of the coordinator's transaction counters.
///
/// At every observation `active() == begun - finished` and
/// `active_readers + active_writers == active()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxnCounters {
    /// Transactions begun.
    pub begun: u64,
    /// Transactions ended.
    pub finished: u64,
    /// Transactions begun in read mode.
    pub begin_read: u64,
    /// Transactions begun in write mode.
    pub begin_write: u64,
    /// Active transactions currently reading.
    pub active_readers: u64,
    /// Active transactions currently writing (0 or 1).
    pub active_writers: u64,
}

impl TxnCounters {
    /// Transactions begun and not yet ended.
    #[must_use]
    pub const fn active(&self) -> u64 {
        self.begun - self.finished
    }
}

/// Who may start writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriterGate {
    /// No writer, no block.
    Open,
    /// The single active writer.
    Held(TxnId),
    /// Writers blocked administratively; the count of unmatched blocks.
    Blocked(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Configuring,
    Running,
    ShutDown,
}

#[derive(Debug)]
pub(crate) struct Admission {
    counters: TxnCounters,
    writer: WriterGate,
    exclusive: bool,
    phase: Phase,
    reconfiguring: bool,
    poisoned: bool,
}

impl Admission {
    pub(crate) fn new() -> Self {
        Self {
            counters: TxnCounters::default(),
            writer: WriterGate::Open,
            exclusive: false,
            phase: Phase::Configuring,
            reconfiguring: false,
            poisoned: false,
        }
    }

    pub(crate) fn counters(&self) -> TxnCounters {
        self.counters
    }

    pub(crate) fn writer(&self) -> WriterGate {
        self.writer
    }

    pub(crate) fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub(crate) fn is_started(&self) -> bool {
        self.phase != Phase::Configuring
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.phase == Phase::ShutDown
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Fails unless transactions may begin or commit.
    pub(crate) fn check_running(&self) -> TxnResult<()> {
        match self.phase {
            Phase::Configuring => Err(TxnError::NotStarted),
            Phase::ShutDown => Err(TxnError::Shutdown),
            Phase::Running if self.poisoned => Err(TxnError::Poisoned),
            Phase::Running => Ok(()),
        }
    }

    /// Fails unless components, listeners or hooks may be changed.
    pub(crate) fn check_configurable(&self) -> TxnResult<()> {
        match self.phase {
            Phase::Running if self.reconfiguring => Ok(()),
            _ => self.check_startable(),
        }
    }

    /// Fails unless `start` may run.
    pub(crate) fn check_startable(&self) -> TxnResult<()> {
        match self.phase {
            Phase::Configuring => Ok(()),
            Phase::Running => Err(TxnError::ConfigurationLocked),
            Phase::ShutDown => Err(TxnError::Shutdown),
        }
    }

    pub(crate) fn mark_started(&mut self) -> TxnResult<()> {
        self.check_startable()?;
        self.phase = Phase::Running;
        Ok(())
    }

    /// Unlocks configuration while running. Only legal in exclusive mode.
    pub(crate) fn begin_reconfigure(&mut self) {
        debug_assert!(self.exclusive);
        self.reconfiguring = true;
    }

    pub(crate) fn end_reconfigure(&mut self) {
        self.reconfiguring = false;
    }

    /// Returns `false` if already shut down.
    pub(crate) fn mark_shut_down(&mut self) -> bool {
        let first = self.phase != Phase::ShutDown;
        self.phase = Phase::ShutDown;
        first
    }

    pub(crate) fn poison(&mut self) {
        self.poisoned = true;
    }

    pub(crate) fn can_admit(&self, mode: ReadWrite) -> bool {
        if self.exclusive {
            return false;
        }
        match mode {
            ReadWrite::Read => true,
            ReadWrite::Write => self.writer == WriterGate::Open,
        }
    }

    /// Counts a new transaction. The caller has checked `can_admit`.
    pub(crate) fn admit(&mut self, txn: TxnId, mode: ReadWrite) {
        self.counters.begun += 1;
        match mode {
            ReadWrite::Read => {
                self.counters.begin_read += 1;
                self.counters.active_readers += 1;
            }
            ReadWrite::Write => {
                self.counters.begin_write += 1;
                self.counters.active_writers += 1;
                self.writer = WriterGate::Held(txn);
            }
        }
    }

    /// Counts a transaction as ended, in its current mode.
    pub(crate) fn release(&mut self, txn: TxnId, mode: ReadWrite) {
        self.counters.finished += 1;
        match mode {
            ReadWrite::Read => self.counters.active_readers -= 1,
            ReadWrite::Write => {
                self.counters.active_writers -= 1;
                if self.writer == WriterGate::Held(txn) {
                    self.writer = WriterGate::Open;
                }
            }
        }
    }

    /// Moves an active reader to writer if the gate is open.
    pub(crate) fn promote(&mut self, txn: TxnId) -> bool {
        if self.writer != WriterGate::Open {
            return false;
        }
        self.writer = WriterGate::Held(txn);
        self.counters.active_readers -= 1;
        self.counters.active_writers += 1;
        true
    }

    /// A block can be added once no writer holds the gate.
    pub(crate) fn can_block_writers(&self) -> bool {
        !matches!(self.writer, WriterGate::Held(_))
    }

    /// Adds a block. The caller has checked `can_block_writers`.
    pub(crate) fn block_writers(&mut self) {
        self.writer = match self.writer {
            WriterGate::Blocked(n) => WriterGate::Blocked(n + 1),
            WriterGate::Open | WriterGate::Held(_) => WriterGate::Blocked(1),
        };
    }

    /// Blocks writers only if nothing holds or blocks the gate.
    pub(crate) fn try_block_writers(&mut self) -> bool {
        if self.writer != WriterGate::Open {
            return false;
        }
        self.writer = WriterGate::Blocked(1);
        true
    }

    pub(crate) fn enable_writers(&mut self) -> TxnResult<()> {
        self.writer = match self.writer {
            WriterGate::Blocked(1) => WriterGate::Open,
            WriterGate::Blocked(n) => WriterGate::Blocked(n - 1),
            WriterGate::Open | WriterGate::Held(_) => {
                return Err(TxnError::UnmatchedEnableWriters)
            }
        };
        Ok(())
    }

    pub(crate) fn can_start_exclusive(&self) -> bool {
        !self.exclusive && self.counters.active() == 0
    }

    pub(crate) fn start_exclusive(&mut self) {
        self.exclusive = true;
    }

    pub(crate) fn finish_exclusive(&mut self) -> TxnResult<()> {
        if !self.exclusive {
            return Err(TxnError::UnmatchedFinishExclusive);
        }
        self.exclusive = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn running() -> Admission {
        let mut admission = Admission::new();
        admission.mark_started().unwrap();
        admission
    }

    fn check_invariants(c: &TxnCounters) {
        assert_eq!(c.active(), c.begun - c.finished);
        assert_eq!(c.active_readers + c.active_writers, c.active());
        assert!(c.active_writers <= 1);
    }

    #[test]
    fn lifecycle_phases() {
        let mut admission = Admission::new();
        assert!(matches!(admission.check_running(), Err(TxnError::NotStarted)));
        admission.check_configurable().unwrap();
        admission.mark_started().unwrap();
        admission.check_running().unwrap();
        assert!(matches!(
            admission.check_configurable(),
            Err(TxnError::ConfigurationLocked)
        ));
        assert!(admission.mark_shut_down());
        assert!(!admission.mark_shut_down());
        assert!(matches!(admission.check_running(), Err(TxnError::Shutdown)));
    }

    #[test]
    fn reconfigure_unlocks_configuration_but_not_start() {
        let mut admission = running();
        admission.start_exclusive();
        admission.begin_reconfigure();
        admission.check_configurable().unwrap();
        assert!(matches!(
            admission.mark_started(),
            Err(TxnError::ConfigurationLocked)
        ));
        admission.end_reconfigure();
        assert!(matches!(
            admission.check_configurable(),
            Err(TxnError::ConfigurationLocked)
        ));
    }

    #[test]
    fn poison_stops_admission() {
        let mut admission = running();
        admission.poison();
        assert!(matches!(admission.check_running(), Err(TxnError::Poisoned)));
    }

    #[test]
    fn single_writer() {
        let mut admission = running();
        let w1 = TxnId::from_u64(1);
        assert!(admission.can_admit(ReadWrite::Write));
        admission.admit(w1, ReadWrite::Write);
        assert!(!admission.can_admit(ReadWrite::Write));
        assert!(admission.can_admit(ReadWrite::Read));
        admission.release(w1, ReadWrite::Write);
        assert!(admission.can_admit(ReadWrite::Write));
        check_invariants(&admission.counters());
    }

    #[test]
    fn promote_needs_open_gate() {
        let mut admission = running();
        let r = TxnId::from_u64(1);
        let w = TxnId::from_u64(2);
        admission.admit(r, ReadWrite::Read);
        admission.admit(w, ReadWrite::Write);
        assert!(!admission.promote(r));
        admission.release(w, ReadWrite::Write);
        assert!(admission.promote(r));
        assert_eq!(admission.writer(), WriterGate::Held(r));
        check_invariants(&admission.counters());
        admission.release(r, ReadWrite::Write);
        assert_eq!(admission.counters().active(), 0);
    }

    #[test]
    fn writer_blocks_are_counted() {
        let mut admission = running();
        assert!(admission.try_block_writers());
        assert!(!admission.try_block_writers());
        assert!(admission.can_block_writers());
        admission.block_writers();
        assert!(!admission.can_admit(ReadWrite::Write));
        admission.enable_writers().unwrap();
        assert!(!admission.can_admit(ReadWrite::Write));
        admission.enable_writers().unwrap();
        assert!(admission.can_admit(ReadWrite::Write));
        assert!(matches!(
            admission.enable_writers(),
            Err(TxnError::UnmatchedEnableWriters)
        ));
    }

    #[test]
    fn block_waits_for_active_writer() {
        let mut admission = running();
        let w = TxnId::from_u64(1);
        admission.admit(w, ReadWrite::Write);
        assert!(!admission.can_block_writers());
        assert!(!admission.try_block_writers());
        admission.release(w, ReadWrite::Write);
        assert!(admission.can_block_writers());
    }

    #[test]
    fn exclusive_mode() {
        let mut admission = running();
        let r = TxnId::from_u64(1);
        admission.admit(r, ReadWrite::Read);
        assert!(!admission.can_start_exclusive());
        admission.release(r, ReadWrite::Read);
        assert!(admission.can_start_exclusive());
        admission.start_exclusive();
        assert!(!admission.can_admit(ReadWrite::Read));
        assert!(!admission.can_admit(ReadWrite::Write));
        assert!(!admission.can_start_exclusive());
        admission.finish_exclusive().unwrap();
        assert!(matches!(
            admission.finish_exclusive(),
            Err(TxnError::UnmatchedFinishExclusive)
        ));
        assert!(admission.can_admit(ReadWrite::Write));
    }

    #[derive(Debug, Clone)]
    enum Op {
        BeginRead,
        BeginWrite,
        EndOldest,
        EndNewest,
        Promote,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::BeginRead),
            Just(Op::BeginWrite),
            Just(Op::EndOldest),
            Just(Op::EndNewest),
            Just(Op::Promote),
        ]
    }

    proptest! {
        #[test]
        fn counters_stay_consistent(ops in prop::collection::vec(op(), 0..64)) {
            let mut admission = running();
            let mut live: Vec<(TxnId, ReadWrite)> = Vec::new();
            let mut next = 1u64;
            for op in ops {
                match op {
                    Op::BeginRead | Op::BeginWrite => {
                        let mode = if matches!(op, Op::BeginRead) { ReadWrite::Read } else { ReadWrite::Write };
                        if admission.can_admit(mode) {
                            let id = TxnId::from_u64(next);
                            next += 1;
                            admission.admit(id, mode);
                            live.push((id, mode));
                        }
                    }
                    Op::EndOldest | Op::EndNewest => {
                        if !live.is_empty() {
                            let index = if matches!(op, Op::EndOldest) { 0 } else { live.len() - 1 };
                            let (id, mode) = live.remove(index);
                            admission.release(id, mode);
                        }
                    }
                    Op::Promote => {
                        if let Some(entry) = live.iter_mut().find(|(_, m)| *m == ReadWrite::Read) {
                            if admission.promote(entry.0) {
                                entry.1 = ReadWrite::Write;
                            }
                        }
                    }
                }
                let c = admission.counters();
                prop_assert_eq!(c.active(), c.begun - c.finished);
                prop_assert_eq!(c.active_readers + c.active_writers, c.active());
                prop_assert_eq!(c.active(), live.len() as u64);
                prop_assert!(c.active_writers <= 1);
            }
        }
    }
}
