//! CLI command implementations.

pub mod dump_journal;
pub mod inspect;
pub mod verify;

use dboe_transaction::Journal;
use std::path::Path;

/// Opens an existing journal file. Fails rather than creating one.
pub fn open_journal(path: &Path) -> Result<Journal, Box<dyn std::error::Error>> {
    if !path.is_file() {
        return Err(format!("journal file not found: {}", path.display()).into());
    }
    Ok(Journal::open(path)?)
}

/// Lowercase hex.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
