//! # DBOE Transaction
//!
//! A transaction coordinator that gives a group of independent stateful
//! components one ACID boundary, backed by an append-only journal.
//!
//! - Multiple readers and a single writer (MR+SW), readers never blocked by
//!   the writer
//! - Read transactions that can promote to write without restarting
//! - Administrative controls: block writers, exclusive mode
//! - Detach a transaction from one thread and attach it on another
//! - Lifecycle listeners and shutdown hooks
//! - Journal recovery: redo entries of committed transactions are replayed
//!   into their components on start
//!
//! ```rust
//! use dboe_transaction::{
//!     execute_write, calculate_read, ComponentId, Journal, TransInteger,
//!     TransactionCoordinator, Transactional, TxnError,
//! };
//! use std::sync::Arc;
//!
//! let counter = Arc::new(TransInteger::new(ComponentId::from_label("counter"), 3));
//! let coordinator = TransactionCoordinator::new(Journal::in_memory());
//! coordinator.add(counter.clone()).unwrap();
//! coordinator.start().unwrap();
//!
//! let txnl = Transactional::new(coordinator);
//! execute_write(&txnl, |txn| {
//!     counter.inc(txn.id)?;
//!     Ok::<_, TxnError>(())
//! })
//! .unwrap();
//! let value = calculate_read(&txnl, |txn| Ok::<_, TxnError>(counter.get(txn.id)?)).unwrap();
//! assert_eq!(value, 4);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod component;
mod config;
mod error;
mod exec;
mod id;
pub mod journal;
mod transaction;
mod transactional;
mod types;

pub use component::{
    ComponentGroup, ComponentLifecycle, TransBlob, TransInteger, TransactionalComponent,
};
pub use config::{CoordinatorConfig, TxnIdKind};
pub use error::{TxnError, TxnResult};
pub use exec::{
    calculate, calculate_read, calculate_write, execute, execute_read, execute_write, TxnOps,
};
pub use id::{ComponentId, SimpleTxnIdGenerator, TxnId, TxnIdGenerator, UuidTxnIdGenerator};
pub use journal::{Journal, JournalEntry, JournalEntryType, RecoveryStats};
pub use transaction::{
    CoordinatorState, ShutdownHook, Transaction, TransactionCoordinator, TransactionListener,
    TxnCounters,
};
pub use transactional::Transactional;
pub use types::{ReadWrite, TxnInfo, TxnState, TxnType};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
