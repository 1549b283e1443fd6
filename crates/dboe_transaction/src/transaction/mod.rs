//! Transaction coordination.
//!
//! - [`TransactionCoordinator`] admits transactions (many readers, one
//!   writer), drives every registered component through each phase, and
//!   owns the journal
//! - [`Transaction`] is one in-flight transaction and its state machine
//! - [`CoordinatorState`] is a transaction detached from any thread
//! - [`TransactionListener`] and [`ShutdownHook`] observe the coordinator

mod admission;
mod coordinator;
mod detach;
mod listener;
mod state;

pub use admission::TxnCounters;
pub use coordinator::TransactionCoordinator;
pub use detach::CoordinatorState;
pub use listener::{ShutdownHook, TransactionListener};
pub use state::Transaction;
