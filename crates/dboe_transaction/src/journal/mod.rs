//! The transaction journal.
//!
//! An append-only log of redo data and commit/abort decisions. A writer's
//! `prepare` appends one `REDO` entry per component that produced redo
//! bytes; `commit` appends `COMMIT` and syncs. That sync is the commit point.
//!
//! ## Entry Format
//!
//! ```text
//! | type (1) | component id (16) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! All integers are little endian. The CRC covers everything before it.
//!
//! ## Recovery Policy
//!
//! - A truncated entry at the end of the journal (crash mid-append) is a
//!   clean end of log.
//! - A CRC mismatch, unknown type byte or malformed entry is fatal.
//! - Redo entries count only when followed by `COMMIT`. `ABORT`, or no
//!   terminal entry at all, discards them.

mod entry;
mod iterator;
mod log;
mod recovery;

pub use entry::{compute_crc32, JournalEntry, JournalEntryType, ENTRY_CRC_LEN, ENTRY_HEADER_LEN};
pub use iterator::JournalEntries;
pub use log::Journal;
pub use recovery::{replay, RecoveryStats};
