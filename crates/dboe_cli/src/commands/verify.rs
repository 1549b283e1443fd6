//! Verify journal command implementation.

use crate::commands::open_journal;
use dboe_transaction::Journal;
use std::path::Path;

/// Result of a verification pass.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Entries read.
    pub entries_checked: usize,
    /// Entries with valid framing and checksum.
    pub valid_entries: usize,
    /// Bytes after the last complete entry.
    pub torn_tail: u64,
    /// Errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    /// Whether recovery could read the whole journal.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify-journal command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let journal = open_journal(path)?;

    println!("Verifying journal: {}", path.display());
    println!();

    let result = verify(&journal);

    println!("Results:");
    println!("  Entries checked: {}", result.entries_checked);
    println!("  Valid entries:   {}", result.valid_entries);
    if result.torn_tail > 0 {
        println!(
            "  Torn tail:       {} bytes (ignored on recovery)",
            result.torn_tail
        );
    }
    println!();

    if result.is_ok() {
        println!("✓ Journal is readable");
        Ok(())
    } else {
        println!("✗ Journal is corrupt:");
        for error in &result.errors {
            println!("  - {error}");
        }
        Err(format!("{} journal error(s) found", result.errors.len()).into())
    }
}

/// Reads every entry and reports what recovery would trip over.
pub fn verify(journal: &Journal) -> VerifyResult {
    let mut result = VerifyResult::default();

    let end = match journal.position() {
        Ok(end) => end,
        Err(e) => {
            result.errors.push(format!("cannot size journal: {e}"));
            return result;
        }
    };
    let mut entries = match journal.entries(0) {
        Ok(entries) => entries,
        Err(e) => {
            result.errors.push(format!("cannot read journal: {e}"));
            return result;
        }
    };

    for item in entries.by_ref() {
        result.entries_checked += 1;
        match item {
            Ok(_) => result.valid_entries += 1,
            Err(e) => {
                result
                    .errors
                    .push(format!("entry at {}: {e}", entries.position()));
                return result;
            }
        }
    }

    result.torn_tail = end.saturating_sub(entries.position());
    result
}
