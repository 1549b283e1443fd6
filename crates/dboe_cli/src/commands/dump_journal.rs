//! Dump journal command implementation.

use crate::commands::{hex_encode, open_journal};
use dboe_transaction::{Journal, TxnResult};
use serde::Serialize;
use std::path::Path;

/// Bytes of payload shown per entry.
const PAYLOAD_PREVIEW: usize = 16;

/// Journal entry representation for output.
#[derive(Debug, Serialize)]
pub struct JournalEntryInfo {
    /// Byte position in the journal.
    pub position: u64,
    /// Entry type.
    pub entry_type: String,
    /// Owning component (redo/undo entries).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Decided transaction (commit/abort entries).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txn: Option<String>,
    /// Payload size in bytes.
    pub payload_size: usize,
    /// Leading payload bytes, hex-encoded.
    pub payload_preview: String,
}

/// Runs the dump-journal command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    offset: u64,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let journal = open_journal(path)?;
    let entries = collect_entries(&journal, offset, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            print_text_output(&entries);
        }
    }

    Ok(())
}

/// Reads up to `limit` entries starting at `offset`.
pub fn collect_entries(
    journal: &Journal,
    offset: u64,
    limit: Option<usize>,
) -> TxnResult<Vec<JournalEntryInfo>> {
    journal
        .entries(offset)?
        .take(limit.unwrap_or(usize::MAX))
        .map(|item| {
            let (position, entry) = item?;
            let (component, txn) = match entry.txn_id() {
                Some(txn) => (None, Some(txn.to_string())),
                None => (Some(entry.component_id.to_string()), None),
            };
            Ok(JournalEntryInfo {
                position,
                entry_type: entry.entry_type.name().to_string(),
                component,
                txn,
                payload_size: entry.payload.len(),
                payload_preview: hex_encode(
                    &entry.payload[..entry.payload.len().min(PAYLOAD_PREVIEW)],
                ),
            })
        })
        .collect()
}

fn print_text_output(entries: &[JournalEntryInfo]) {
    println!("Journal Entries ({} total)", entries.len());
    println!("====================");
    println!();

    for entry in entries {
        print!("[{:08}] {:7}", entry.position, entry.entry_type);
        if let Some(ref txn) = entry.txn {
            print!(" {txn}");
        }
        if let Some(ref component) = entry.component {
            print!(" component={component}");
            print!(" payload={} bytes", entry.payload_size);
            if !entry.payload_preview.is_empty() {
                print!(" [{}]", entry.payload_preview);
            }
        }
        println!();
    }
}
