//! # RecorDB Core
//!
//! Versioned, transactional record store engine for RecorDB.
//!
//! This crate provides:
//! - [`Factory`] and [`Connection`]: opening databases by name and version,
//!   with upgrade handlers run exactly once per version increase
//! - [`Transaction`]: atomic reads and writes over a fixed set of collections
//! - [`Cursor`]: ordered, lazy traversal of a collection
//! - [`RecordStore`]: an async session bound to one collection
//! - WAL and segment log for durability, recovered on open
//!
//! ## Example
//!
//! ```rust
//! use recordb_core::{Factory, Key, KeyedCollection, Record, TransactionMode};
//!
//! let factory = Factory::in_memory();
//! let conn = factory.open("todos", 1, &KeyedCollection::new("tasks", "id")).unwrap();
//!
//! let mut txn = conn.transaction(&["tasks"], TransactionMode::ReadWrite).unwrap();
//! txn.add("tasks", &Record::new().with("id", "t1").with("title", "Buy milk")).unwrap();
//! txn.commit().unwrap();
//!
//! let mut txn = conn.transaction(&["tasks"], TransactionMode::ReadOnly).unwrap();
//! let task = txn.get("tasks", &Key::from("t1")).unwrap().unwrap();
//! assert_eq!(task.get("title").and_then(|v| v.as_text()), Some("Buy milk"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod cursor;
mod database;
mod dir;
mod error;
mod key;
mod manifest;
mod migration;
mod ordered;
mod record;
mod segment;
mod session;
mod transaction;
mod types;
mod wal;
mod wire;

pub use config::Config;
pub use connection::{Connection, DatabaseInfo, Factory};
pub use cursor::Cursor;
pub use database::Database;
pub use dir::DatabaseDir;
pub use error::{ConnectionError, CoreError, CoreResult};
pub use key::{Key, KeyPath, KeyRange};
pub use manifest::{CollectionMeta, Manifest};
pub use migration::{
    KeyedCollection, Migration, MigrationInfo, MigrationManager, MigrationVersion,
    UpgradeContext, UpgradeHandler,
};
pub use record::Record;
pub use segment::{SegmentManager, SegmentRecord, SegmentRecordFlags};
pub use session::{BatchOutcome, RecordStore, RecordStream};
pub use transaction::{PendingWrite, Transaction, TransactionManager, TransactionState};
pub use types::{CollectionId, Direction, SequenceNumber, TransactionId, TransactionMode};
pub use wal::{WalManager, WalRecord, WalRecordType, WalScan};

pub use recordb_codec::Value;
