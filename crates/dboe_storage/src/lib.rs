//! # DBOE Storage
//!
//! Byte stores for the DBOE transaction journal.
//!
//! A backend is an append-only sequence of bytes addressed by offset. It
//! does not know what a journal entry is; the `dboe_transaction` crate owns
//! the record format and framing.
//!
//! ## Backends
//!
//! - [`InMemoryBackend`] - ephemeral journals and tests; handles created with
//!   [`InMemoryBackend::share`] see the same bytes, which lets a test "restart"
//!   a coordinator over the journal a previous one left behind
//! - [`FileBackend`] - a file on disk, exclusively locked while open
//!
//! ## Example
//!
//! ```rust
//! use dboe_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"redo").unwrap();
//! assert_eq!(backend.read_at(offset, 4).unwrap(), b"redo");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
