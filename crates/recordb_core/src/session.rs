//! Async record store session bound to one collection.
//!
//! [`RecordStore`] wraps a [`Connection`] and runs every operation in its
//! own transaction on the tokio blocking pool. Each method resolves exactly
//! once, with the outcome of that transaction's commit.
//!
//! ```rust,no_run
//! use recordb_core::{Factory, KeyedCollection, Record, RecordStore};
//!
//! # async fn demo() -> recordb_core::CoreResult<()> {
//! let factory = Factory::on_disk("./data");
//! let store = RecordStore::open(&factory, "todos", 2, KeyedCollection::new("tasks", "id")).await?;
//!
//! store.insert(Record::new().with("id", "t1").with("title", "Buy milk")).await?;
//! let mut stream = store.scan().await?;
//! while let Some(record) = stream.next().await {
//!     println!("{:?}", record?);
//! }
//! # Ok(())
//! # }
//! ```

use crate::connection::{Connection, Factory};
use crate::cursor::Cursor;
use crate::error::{CoreError, CoreResult};
use crate::key::{Key, KeyRange};
use crate::migration::KeyedCollection;
use crate::record::Record;
use crate::transaction::Transaction;
use crate::types::{Direction, SequenceNumber, TransactionMode};
use tokio::task::{self, JoinError};

/// Result of [`RecordStore::insert_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Number of records inserted.
    pub inserted: usize,
    /// Sequence number of the commit.
    pub sequence: SequenceNumber,
}

/// An async session over one collection of one database.
#[derive(Debug, Clone)]
pub struct RecordStore {
    conn: Connection,
    collection: String,
}

impl RecordStore {
    /// Opens `name` at `version` and binds the session to `collection`,
    /// creating it during the upgrade if it does not exist yet.
    pub async fn open(
        factory: &Factory,
        name: &str,
        version: u64,
        collection: KeyedCollection,
    ) -> CoreResult<Self> {
        let factory = factory.clone();
        let name = name.to_string();
        let bound = collection.collection.clone();
        let conn = blocking("open", move || factory.open(&name, version, &collection)).await?;
        Self::new(conn, bound)
    }

    /// Binds an open connection to `collection`.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound` if the database has no such collection.
    pub fn new(conn: Connection, collection: impl Into<String>) -> CoreResult<Self> {
        let collection = collection.into();
        if conn.database().collection(&collection).is_none() {
            return Err(CoreError::collection_not_found(collection));
        }
        Ok(Self { conn, collection })
    }

    /// Returns the collection this session is bound to.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the underlying connection.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Inserts a record whose key must be new.
    ///
    /// # Errors
    ///
    /// `TransactionAborted` caused by `Constraint` if the key exists.
    pub async fn insert(&self, record: Record) -> CoreResult<()> {
        self.write("insert", move |txn, collection| {
            txn.add(collection, &record).map(drop)
        })
        .await
    }

    /// Inserts every record in one transaction.
    ///
    /// All adds are issued before the commit, which is the only outcome:
    /// if any record fails, none of them are inserted.
    pub async fn insert_batch(&self, records: Vec<Record>) -> CoreResult<BatchOutcome> {
        let conn = self.conn.clone();
        let collection = self.collection.clone();
        blocking("insert_batch", move || {
            let mut txn = conn.transaction(&[&collection], TransactionMode::ReadWrite)?;
            let issued: CoreResult<()> = records
                .iter()
                .try_for_each(|record| txn.add(&collection, record).map(drop));
            let sequence = txn.commit()?;
            issued?;
            Ok(BatchOutcome {
                inserted: records.len(),
                sequence,
            })
        })
        .await
    }

    /// Inserts or fully replaces a record, returning its key.
    pub async fn upsert(&self, record: Record) -> CoreResult<Key> {
        self.write("upsert", move |txn, collection| txn.put(collection, &record))
            .await
    }

    /// Removes the record under `key`; an absent key is not an error.
    pub async fn remove(&self, key: impl Into<Key>) -> CoreResult<()> {
        let key = key.into();
        self.write("remove", move |txn, collection| txn.delete(collection, &key))
            .await
    }

    /// Removes every record of the collection.
    pub async fn clear(&self) -> CoreResult<()> {
        self.write("clear", |txn, collection| txn.clear(collection))
            .await
    }

    /// Reads the record under `key`.
    pub async fn get(&self, key: impl Into<Key>) -> CoreResult<Option<Record>> {
        let key = key.into();
        self.read("get", move |txn, collection| txn.get(collection, &key))
            .await
    }

    /// Reads the record under `key`, failing if there is none.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent.
    pub async fn require(&self, key: impl Into<Key>) -> CoreResult<Record> {
        let key = key.into();
        self.read("require", move |txn, collection| {
            txn.get(collection, &key)?.ok_or_else(|| CoreError::NotFound {
                collection: collection.to_string(),
                key,
            })
        })
        .await
    }

    /// Counts the records in the collection.
    pub async fn count(&self) -> CoreResult<usize> {
        self.read("count", |txn, collection| {
            txn.count(collection, &KeyRange::all())
        })
        .await
    }

    /// Streams every record in ascending key order.
    pub async fn scan(&self) -> CoreResult<RecordStream> {
        self.scan_range(KeyRange::all(), Direction::Next).await
    }

    /// Streams the records inside `range` in the given order.
    pub async fn scan_range(
        &self,
        range: KeyRange,
        direction: Direction,
    ) -> CoreResult<RecordStream> {
        self.read("scan", move |txn, collection| {
            txn.open_cursor(collection, range, direction)
        })
        .await
        .map(RecordStream::new)
    }

    /// Releases the connection.
    pub fn close(&self) {
        self.conn.close();
    }

    /// Runs `op` in a read-write transaction and commits it.
    ///
    /// A failed commit is reported ahead of the operation's own error, so
    /// an operation failure surfaces as `TransactionAborted` with the
    /// failure as its cause.
    async fn write<T, F>(&self, what: &'static str, op: F) -> CoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Transaction, &str) -> CoreResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        let collection = self.collection.clone();
        blocking(what, move || {
            let mut txn = conn.transaction(&[&collection], TransactionMode::ReadWrite)?;
            let result = op(&mut txn, &collection);
            txn.commit()?;
            result
        })
        .await
    }

    async fn read<T, F>(&self, what: &'static str, op: F) -> CoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Transaction, &str) -> CoreResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        let collection = self.collection.clone();
        blocking(what, move || {
            let mut txn = conn.transaction(&[&collection], TransactionMode::ReadOnly)?;
            let result = op(&mut txn, &collection)?;
            txn.commit()?;
            Ok(result)
        })
        .await
    }
}

/// A lazy, finite stream of records from a scan.
///
/// Each step runs on the blocking pool. A failed step yields its error and
/// ends the stream.
#[derive(Debug)]
pub struct RecordStream {
    cursor: Option<Cursor>,
}

impl RecordStream {
    fn new(cursor: Cursor) -> Self {
        Self {
            cursor: Some(cursor),
        }
    }

    /// Returns the next record, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<CoreResult<Record>> {
        let mut cursor = self.cursor.take()?;
        let collection = cursor.collection().to_string();
        let joined = task::spawn_blocking(move || {
            let item = cursor.next();
            (cursor, item)
        })
        .await;

        match joined {
            Ok((cursor, item)) => {
                if matches!(item, Some(Ok(_))) {
                    self.cursor = Some(cursor);
                }
                if let Some(Err(err)) = &item {
                    tracing::warn!(collection, error = %err, "scan failed");
                }
                item
            }
            Err(err) => Some(Err(background(&err))),
        }
    }

    /// Drains the stream into a vector, stopping at the first error.
    pub async fn collect(mut self) -> CoreResult<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await {
            records.push(record?);
        }
        Ok(records)
    }
}

/// Runs `op` on the blocking pool, logging a failure before returning it.
async fn blocking<T, F>(what: &'static str, op: F) -> CoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> CoreResult<T> + Send + 'static,
{
    let result = match task::spawn_blocking(op).await {
        Ok(result) => result,
        Err(err) => Err(background(&err)),
    };
    result.inspect_err(|err| tracing::warn!(operation = what, error = %err, "operation failed"))
}

fn background(err: &JoinError) -> CoreError {
    CoreError::BackgroundTask {
        message: err.to_string(),
    }
}
