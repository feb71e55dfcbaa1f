//! Transaction state.

use crate::cursor::Cursor;
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::key::{Key, KeyRange};
use crate::manifest::CollectionMeta;
use crate::ordered;
use crate::record::Record;
use crate::transaction::manager::WriteSet;
use crate::types::{Direction, SequenceNumber, TransactionId, TransactionMode};
use std::collections::BTreeMap;
use std::sync::Arc;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Created; no operation issued yet.
    Created,
    /// At least one operation has been issued.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

/// A buffered write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite {
    /// Insert of a key that must not exist at commit time.
    Add(Vec<u8>),
    /// Insert or overwrite.
    Put(Vec<u8>),
    /// Delete a record.
    Delete,
}

impl PendingWrite {
    /// The encoded record, or `None` for a delete.
    #[must_use]
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Self::Add(payload) | Self::Put(payload) => Some(payload),
            Self::Delete => None,
        }
    }
}

/// A transaction over a fixed set of collections.
///
/// Writes are buffered and become visible to other readers only when
/// [`commit`](Self::commit) succeeds. Reads see the transaction's own
/// pending writes on top of the latest committed state.
///
/// The first failing operation aborts the transaction: its writes are
/// dropped, every later operation fails with `TransactionInactive` and
/// `commit` reports `TransactionAborted` with the failure as its cause.
///
/// Dropping an uncommitted transaction aborts it.
pub struct Transaction {
    db: Arc<Database>,
    id: TransactionId,
    mode: TransactionMode,
    scope: BTreeMap<String, CollectionMeta>,
    state: TransactionState,
    writes: WriteSet,
    failure: Option<CoreError>,
}

impl Transaction {
    pub(crate) fn new(
        db: Arc<Database>,
        mode: TransactionMode,
        scope: BTreeMap<String, CollectionMeta>,
    ) -> Self {
        let id = db.next_txid();
        Self {
            db,
            id,
            mode,
            scope,
            state: TransactionState::Created,
            writes: WriteSet::new(),
            failure: None,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the access mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction can still issue operations.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            TransactionState::Created | TransactionState::Active
        )
    }

    /// Names of the collections in scope.
    pub fn scope(&self) -> impl Iterator<Item = &str> {
        self.scope.keys().map(String::as_str)
    }

    /// Returns the number of buffered writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Inserts a record whose key must not exist yet.
    ///
    /// # Errors
    ///
    /// - `Constraint` if the key is already taken
    /// - `Data` if the record has no valid key at the key path
    pub fn add(&mut self, collection: &str, record: &Record) -> CoreResult<Key> {
        self.run(|txn| {
            txn.ensure_writable()?;
            let meta = txn.meta(collection)?;
            let key = record.key(&meta.key_path)?;
            let payload = record.encode()?;
            let composite = (meta.id, key.clone());

            let committed = txn.db.segments().contains(meta.id, &key);
            let write = match txn.writes.get(&composite) {
                Some(PendingWrite::Add(_) | PendingWrite::Put(_)) => {
                    return Err(CoreError::duplicate_key(collection, &key))
                }
                // Replaces a record this transaction already deleted.
                Some(PendingWrite::Delete) if committed => PendingWrite::Put(payload),
                Some(PendingWrite::Delete) => PendingWrite::Add(payload),
                None if committed => return Err(CoreError::duplicate_key(collection, &key)),
                None => PendingWrite::Add(payload),
            };
            txn.writes.insert(composite, write);
            Ok(key)
        })
    }

    /// Inserts or replaces a record.
    pub fn put(&mut self, collection: &str, record: &Record) -> CoreResult<Key> {
        self.run(|txn| {
            txn.ensure_writable()?;
            let meta = txn.meta(collection)?;
            let key = record.key(&meta.key_path)?;
            let payload = record.encode()?;
            txn.writes
                .insert((meta.id, key.clone()), PendingWrite::Put(payload));
            Ok(key)
        })
    }

    /// Deletes the record under `key`; an absent key is not an error.
    pub fn delete(&mut self, collection: &str, key: &Key) -> CoreResult<()> {
        self.run(|txn| {
            txn.ensure_writable()?;
            let meta = txn.meta(collection)?;
            txn.writes.insert((meta.id, key.clone()), PendingWrite::Delete);
            Ok(())
        })
    }

    /// Deletes every record of a collection.
    pub fn clear(&mut self, collection: &str) -> CoreResult<()> {
        self.run(|txn| {
            txn.ensure_writable()?;
            let meta = txn.meta(collection)?;

            let pending: Vec<Key> = txn
                .writes
                .keys()
                .filter(|(cid, _)| *cid == meta.id)
                .map(|(_, key)| key.clone())
                .collect();
            for key in txn.db.segments().keys(meta.id).into_iter().chain(pending) {
                txn.writes.insert((meta.id, key), PendingWrite::Delete);
            }
            Ok(())
        })
    }

    /// Reads the record under `key`.
    pub fn get(&mut self, collection: &str, key: &Key) -> CoreResult<Option<Record>> {
        self.run(|txn| {
            let meta = txn.meta(collection)?;
            let payload = match txn.writes.get(&(meta.id, key.clone())) {
                Some(write) => write.payload().map(<[u8]>::to_vec),
                None => txn.db.segments().get(meta.id, key)?,
            };
            payload.map(|bytes| Record::decode(&bytes)).transpose()
        })
    }

    /// Reads up to `limit` records inside `range`, in key order.
    pub fn get_all(
        &mut self,
        collection: &str,
        range: &KeyRange,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Record>> {
        let cursor = self.open_cursor(collection, range.clone(), Direction::Next)?;
        let limit = limit.unwrap_or(usize::MAX);
        self.run(|_| cursor.take(limit).collect())
    }

    /// Counts the records inside `range`.
    pub fn count(&mut self, collection: &str, range: &KeyRange) -> CoreResult<usize> {
        self.run(|txn| {
            let meta = txn.meta(collection)?;
            let Some(bounds) = ordered::collection_bounds(meta.id, range.lower(), range.upper())
            else {
                return Ok(0);
            };
            let pending = txn
                .writes
                .range(bounds)
                .map(|((_, key), write)| (key, write.payload().is_some()));
            Ok(txn.db.segments().count_with(meta.id, range, pending))
        })
    }

    /// Opens a cursor over `range`.
    ///
    /// The cursor sees the writes this transaction has buffered so far and
    /// commits that land while it walks.
    pub fn open_cursor(
        &mut self,
        collection: &str,
        range: KeyRange,
        direction: Direction,
    ) -> CoreResult<Cursor> {
        self.run(|txn| {
            let meta = txn.meta(collection)?;
            let pending: WriteSet = match ordered::collection_bounds(
                meta.id,
                range.lower(),
                range.upper(),
            ) {
                Some(bounds) => txn
                    .writes
                    .range(bounds)
                    .map(|(k, w)| (k.clone(), w.clone()))
                    .collect(),
                None => WriteSet::new(),
            };
            Ok(Cursor::new(
                Arc::clone(&txn.db),
                collection.to_string(),
                meta.id,
                range,
                direction,
                pending,
            ))
        })
    }

    /// Commits the transaction.
    ///
    /// Returns the sequence number of the commit; a read-only transaction
    /// or one without writes returns the latest committed sequence.
    ///
    /// # Errors
    ///
    /// - `TransactionAborted` if an earlier operation failed, or if the
    ///   commit itself failed; the cause is attached
    /// - `QuotaExceeded` if the commit would cross the database quota
    /// - `TransactionInactive` if already committed
    pub fn commit(&mut self) -> CoreResult<SequenceNumber> {
        match self.state {
            TransactionState::Committed => return Err(CoreError::TransactionInactive),
            TransactionState::Aborted => {
                return Err(match &self.failure {
                    Some(cause) => CoreError::aborted_by(cause.replicate()),
                    None => CoreError::transaction_aborted("transaction was aborted"),
                })
            }
            TransactionState::Created | TransactionState::Active => {}
        }

        if self.mode == TransactionMode::ReadOnly {
            self.state = TransactionState::Committed;
            return Ok(self.db.committed_seq());
        }

        let writes = std::mem::take(&mut self.writes);
        match self.db.commit_writes(self.id, &writes) {
            Ok(sequence) => {
                self.state = TransactionState::Committed;
                Ok(sequence)
            }
            Err(err) => {
                self.fail(err.replicate());
                Err(match err {
                    CoreError::QuotaExceeded { .. } => err,
                    other => CoreError::aborted_by(other),
                })
            }
        }
    }

    /// Aborts the transaction, discarding every buffered write.
    pub fn abort(&mut self) -> CoreResult<()> {
        if !self.is_active() {
            return Err(CoreError::TransactionInactive);
        }
        tracing::debug!(txid = %self.id, writes = self.writes.len(), "transaction aborted");
        self.writes.clear();
        self.state = TransactionState::Aborted;
        Ok(())
    }

    /// Runs one operation, aborting the transaction if it fails.
    fn run<T>(&mut self, op: impl FnOnce(&mut Self) -> CoreResult<T>) -> CoreResult<T> {
        match self.state {
            TransactionState::Committed | TransactionState::Aborted => {
                return Err(CoreError::TransactionInactive)
            }
            TransactionState::Created => self.state = TransactionState::Active,
            TransactionState::Active => {}
        }

        op(self).inspect_err(|err| self.fail(err.replicate()))
    }

    fn fail(&mut self, cause: CoreError) {
        tracing::debug!(txid = %self.id, error = %cause, "transaction aborted by failed operation");
        self.writes.clear();
        self.state = TransactionState::Aborted;
        self.failure = Some(cause);
    }

    fn meta(&self, collection: &str) -> CoreResult<CollectionMeta> {
        self.scope
            .get(collection)
            .cloned()
            .ok_or_else(|| CoreError::collection_not_found(collection))
    }

    fn ensure_writable(&self) -> CoreResult<()> {
        match self.mode {
            TransactionMode::ReadWrite => Ok(()),
            TransactionMode::ReadOnly => Err(CoreError::ReadOnly),
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.is_active() && !self.writes.is_empty() {
            tracing::debug!(
                txid = %self.id,
                writes = self.writes.len(),
                "transaction dropped without commit"
            );
            self.writes.clear();
            self.state = TransactionState::Aborted;
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("writes", &self.writes.len())
            .finish_non_exhaustive()
    }
}
