//! Transactions over one or more collections.
//!
//! A [`Transaction`] is scoped to a fixed set of collections and a mode.
//! Writes are buffered in the transaction and become visible to other
//! readers only when [`Transaction::commit`] succeeds:
//! - **Atomicity**: a commit is one WAL write; a failed operation aborts the
//!   whole transaction and nothing it wrote is persisted
//! - **Isolation**: read-committed; a transaction always sees its own
//!   pending writes on top of the latest committed state
//! - **Durability**: the WAL is flushed before a commit returns
//!
//! Commits are serialized by the [`TransactionManager`]'s writer lock.

mod manager;
mod state;

pub(crate) use manager::WriteSet;
pub use manager::TransactionManager;
pub use state::{PendingWrite, Transaction, TransactionState};
