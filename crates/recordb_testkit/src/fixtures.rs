//! Test fixtures and database helpers.
//!
//! Every fixture opens a database named [`DB_NAME`] at version 1 with one
//! collection, [`TASKS`], keyed by `id`.

use recordb_core::{Connection, Factory, KeyedCollection, Record, TransactionMode};
use std::path::Path;
use tempfile::TempDir;

/// Database name used by the fixtures.
pub const DB_NAME: &str = "test";

/// Collection created by the fixtures.
pub const TASKS: &str = "tasks";

/// Upgrade handler declaring the [`TASKS`] collection.
pub fn tasks_collection() -> KeyedCollection {
    KeyedCollection::new(TASKS, "id")
}

/// A task record with an integer key.
pub fn task(id: i64) -> Record {
    Record::new()
        .with("id", id)
        .with("title", format!("task {id}"))
        .with("done", id % 2 == 0)
}

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// Factory the database was opened through.
    pub factory: Factory,
    /// The open connection.
    pub conn: Connection,
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        let factory = Factory::in_memory();
        let conn = factory
            .open(DB_NAME, 1, &tasks_collection())
            .expect("Failed to open in-memory database");
        Self {
            factory,
            conn,
            temp_dir: None,
        }
    }

    /// Creates a new disk database in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let factory = Factory::on_disk(temp_dir.path());
        let conn = factory
            .open(DB_NAME, 1, &tasks_collection())
            .expect("Failed to open file database");
        Self {
            factory,
            conn,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the factory root if disk-based, None if in-memory.
    pub fn root(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Closes the database and opens it again at version 1.
    ///
    /// A disk database is reopened through a fresh factory, so it goes
    /// through recovery.
    #[must_use]
    pub fn reopen(self) -> Self {
        let Self {
            factory,
            conn,
            temp_dir,
        } = self;
        drop(conn);

        let factory = match &temp_dir {
            Some(dir) => Factory::on_disk(dir.path()),
            None => factory,
        };
        let conn = factory
            .open(DB_NAME, 1, &tasks_collection())
            .expect("Failed to reopen database");
        Self {
            factory,
            conn,
            temp_dir,
        }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

/// Runs a test with a temporary in-memory database.
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Connection) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.conn)
}

/// Runs a test with a temporary disk database and its factory root.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Connection, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let root = test_db.root().expect("File database should have a root");
    f(&test_db.conn, root)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a database holding tasks `0..count`, committed in one
    /// transaction.
    pub fn populated_database(count: i64) -> TestDatabase {
        let test_db = TestDatabase::memory();
        let mut txn = test_db
            .transaction(&[TASKS], TransactionMode::ReadWrite)
            .expect("Failed to begin transaction");
        for id in 0..count {
            txn.add(TASKS, &task(id)).expect("Failed to add task");
        }
        txn.commit().expect("Failed to commit tasks");
        test_db
    }

    /// Creates a database with `count` extra collections, one record each.
    pub fn multi_collection_database(count: usize) -> (TestDatabase, Vec<String>) {
        let factory = Factory::in_memory();
        let names: Vec<String> = (0..count).map(|i| format!("collection_{i}")).collect();
        let declare = |ctx: &mut recordb_core::UpgradeContext| -> recordb_core::CoreResult<()> {
            ctx.create_collection(TASKS, "id")?;
            for name in &names {
                ctx.create_collection(name, "id")?;
            }
            Ok(())
        };
        let conn = factory
            .open(DB_NAME, 1, &declare)
            .expect("Failed to open database");

        let mut txn = conn
            .transaction(&names, TransactionMode::ReadWrite)
            .expect("Failed to begin transaction");
        for (i, name) in names.iter().enumerate() {
            txn.add(name, &task(i as i64)).expect("Failed to add record");
        }
        txn.commit().expect("Failed to commit records");

        let test_db = TestDatabase {
            factory,
            conn,
            temp_dir: None,
        };
        (test_db, names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordb_core::{Key, KeyRange};

    #[test]
    fn memory_database_has_tasks() {
        let test_db = TestDatabase::memory();
        assert_eq!(test_db.collection_names(), vec![TASKS]);
        assert!(test_db.root().is_none());
    }

    #[test]
    fn populated_scenario_counts() {
        let test_db = scenarios::populated_database(10);
        let mut txn = test_db
            .transaction(&[TASKS], TransactionMode::ReadOnly)
            .unwrap();
        assert_eq!(txn.count(TASKS, &KeyRange::all()).unwrap(), 10);
    }

    #[test]
    fn multi_collection_scenario() {
        let (test_db, names) = scenarios::multi_collection_database(3);
        assert_eq!(test_db.collection_names().len(), 4);
        let mut txn = test_db
            .transaction(&names, TransactionMode::ReadOnly)
            .unwrap();
        assert_eq!(txn.get(&names[2], &Key::from(2)).unwrap(), Some(task(2)));
    }

    #[test]
    fn file_database_survives_reopen() {
        let test_db = TestDatabase::file();
        let mut txn = test_db
            .transaction(&[TASKS], TransactionMode::ReadWrite)
            .unwrap();
        txn.add(TASKS, &task(1)).unwrap();
        txn.commit().unwrap();
        drop(txn);

        let test_db = test_db.reopen();
        let mut txn = test_db
            .transaction(&[TASKS], TransactionMode::ReadOnly)
            .unwrap();
        assert_eq!(txn.get(TASKS, &Key::from(1)).unwrap(), Some(task(1)));
    }
}
