//! Inspect command implementation.

use crate::commands::open_journal;
use dboe_transaction::journal::replay;
use dboe_transaction::{Journal, JournalEntryType, TxnResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// What the journal holds and what a restart would do with it.
#[derive(Debug, Default, Serialize)]
pub struct JournalSummary {
    /// Journal size in bytes.
    pub size: u64,
    /// Complete entries read.
    pub entries: usize,
    /// Redo entries per component.
    pub redo_by_component: BTreeMap<String, usize>,
    /// Undo entries (ignored by recovery).
    pub undo: usize,
    /// Committed transactions.
    pub committed: usize,
    /// Aborted transactions.
    pub aborted: usize,
    /// Redo entries recovery would replay.
    pub replayable: usize,
    /// Redo entries left without a commit or abort.
    pub incomplete: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let journal = open_journal(path)?;
    let summary = summarize(&journal)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        _ => {
            println!("Journal: {}", path.display());
            println!("====================");
            println!("Size:         {} bytes", summary.size);
            println!("Entries:      {}", summary.entries);
            println!("Committed:    {}", summary.committed);
            println!("Aborted:      {}", summary.aborted);
            println!("Undo entries: {}", summary.undo);
            println!();
            println!("Redo entries by component:");
            if summary.redo_by_component.is_empty() {
                println!("  (none)");
            }
            for (component, count) in &summary.redo_by_component {
                println!("  {component:<24} {count}");
            }
            println!();
            if summary.replayable == 0 && summary.incomplete == 0 {
                println!("Recovery: nothing to do");
            } else {
                println!(
                    "Recovery: would replay {} redo entries, discard {} incomplete",
                    summary.replayable, summary.incomplete
                );
            }
        }
    }

    Ok(())
}

/// Scans the whole journal.
pub fn summarize(journal: &Journal) -> TxnResult<JournalSummary> {
    let mut summary = JournalSummary {
        size: journal.position()?,
        ..JournalSummary::default()
    };

    for item in journal.entries(0)? {
        let (_, entry) = item?;
        summary.entries += 1;
        match entry.entry_type {
            JournalEntryType::Redo => {
                *summary
                    .redo_by_component
                    .entry(entry.component_id.to_string())
                    .or_default() += 1;
            }
            JournalEntryType::Undo => summary.undo += 1,
            JournalEntryType::Commit | JournalEntryType::Abort => {}
        }
    }

    let stats = replay(journal.entries(0)?, |_| Ok(()))?;
    summary.committed = stats.committed;
    summary.aborted = stats.aborted;
    summary.replayable = stats.replayed;
    summary.incomplete = stats.incomplete;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dboe_transaction::{ComponentId, JournalEntry, TxnId};

    #[test]
    fn empty_journal() {
        let summary = summarize(&Journal::in_memory()).unwrap();
        assert_eq!(summary.size, 0);
        assert_eq!(summary.entries, 0);
        assert_eq!(summary.replayable, 0);
    }

    #[test]
    fn counts_pending_work() {
        let journal = Journal::in_memory();
        let a = ComponentId::from_label("a");
        let b = ComponentId::from_label("b");
        journal.write(&JournalEntry::redo(a, vec![1])).unwrap();
        journal.write(&JournalEntry::redo(b, vec![2])).unwrap();
        journal.write(&JournalEntry::commit(TxnId::from_u64(1))).unwrap();
        journal.write(&JournalEntry::redo(a, vec![3])).unwrap();
        journal.write(&JournalEntry::abort(TxnId::from_u64(2))).unwrap();
        journal.write(&JournalEntry::redo(a, vec![4])).unwrap();

        let summary = summarize(&journal).unwrap();
        assert_eq!(summary.entries, 6);
        assert_eq!(summary.redo_by_component.get("a"), Some(&3));
        assert_eq!(summary.redo_by_component.get("b"), Some(&1));
        assert_eq!(summary.committed, 1);
        assert_eq!(summary.aborted, 1);
        assert_eq!(summary.replayable, 2);
        assert_eq!(summary.incomplete, 1);
    }
}
