//! Coordinator configuration.

use crate::id::{SimpleTxnIdGenerator, TxnIdGenerator, UuidTxnIdGenerator};

/// Which [`TxnIdGenerator`] the coordinator uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxnIdKind {
    /// Counter from 1.
    #[default]
    Simple,
    /// Random UUIDs.
    Uuid,
}

impl TxnIdKind {
    pub(crate) fn generator(self) -> Box<dyn TxnIdGenerator> {
        match self {
            Self::Simple => Box::new(SimpleTxnIdGenerator::default()),
            Self::Uuid => Box::new(UuidTxnIdGenerator),
        }
    }
}

/// Configuration for a [`crate::TransactionCoordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Sync the journal after writing a `COMMIT` entry. On by default.
    ///
    /// Off, the commit point becomes the write of the `COMMIT` entry and
    /// commits acknowledged since the last sync can be lost on power loss.
    /// Only for bulk loads and tests that can rebuild from scratch.
    pub sync_on_commit: bool,

    /// Truncate the journal once a writer's components have applied its
    /// commit, or once it aborts. Off keeps the full history, which is
    /// only useful for inspection.
    pub reset_journal_after_commit: bool,

    /// Transaction id scheme.
    pub txn_ids: TxnIdKind,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
            reset_journal_after_commit: true,
            txn_ids: TxnIdKind::Simple,
        }
    }
}

impl CoordinatorConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether commits sync the journal.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets whether the journal is truncated after each writer finishes.
    #[must_use]
    pub const fn reset_journal_after_commit(mut self, value: bool) -> Self {
        self.reset_journal_after_commit = value;
        self
    }

    /// Sets the transaction id scheme.
    #[must_use]
    pub const fn txn_ids(mut self, kind: TxnIdKind) -> Self {
        self.txn_ids = kind;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = CoordinatorConfig::default();
        assert!(config.sync_on_commit);
        assert!(config.reset_journal_after_commit);
        assert_eq!(config.txn_ids, TxnIdKind::Simple);
    }

    #[test]
    fn builder_pattern() {
        let config = CoordinatorConfig::new()
            .sync_on_commit(false)
            .reset_journal_after_commit(false)
            .txn_ids(TxnIdKind::Uuid);
        assert!(!config.sync_on_commit);
        assert!(!config.reset_journal_after_commit);
        assert!(config.txn_ids.generator().generate().as_u64().is_none());
    }
}
