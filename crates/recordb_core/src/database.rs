//! Database engine and recovery.

use crate::config::Config;
use crate::dir::DatabaseDir;
use crate::error::{ConnectionError, CoreError, CoreResult};
use crate::manifest::{CollectionMeta, Manifest};
use crate::migration::{UpgradeContext, UpgradeHandler};
use crate::segment::{SegmentManager, SegmentRecord};
use crate::transaction::{Transaction, TransactionManager, WriteSet};
use crate::types::{SequenceNumber, TransactionId, TransactionMode};
use crate::wal::{WalManager, WalRecord};
use parking_lot::{Mutex, RwLock};
use recordb_storage::{FileBackend, StorageBackend};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// One named, versioned database.
///
/// A `Database` is shared by every [`Connection`](crate::Connection) opened
/// on its name through the same [`Factory`](crate::Factory). It owns:
/// - the manifest (version and collection registry)
/// - the WAL and segment log, recovered on open
/// - the transaction manager that serializes commits
/// - the count of open connections, which gates upgrades
pub struct Database {
    name: String,
    config: Config,
    /// Directory holding the lock. None for in-memory databases.
    dir: Option<DatabaseDir>,
    manifest: RwLock<Manifest>,
    wal: Arc<WalManager>,
    segments: Arc<SegmentManager>,
    txn_manager: TransactionManager,
    /// Serializes version checks, upgrades and connection registration.
    upgrade_lock: Mutex<()>,
    connections: AtomicUsize,
    is_open: AtomicBool,
}

impl Database {
    /// Opens the database stored in the directory at `path`.
    ///
    /// Takes the directory lock, loads the manifest and replays the WAL.
    ///
    /// # Errors
    ///
    /// - `DatabaseLocked` if another process holds the directory
    /// - `InvalidFormat` if the manifest has an incompatible format version
    /// - corruption and I/O errors from recovery
    pub fn open(path: &Path, name: &str, config: Config) -> CoreResult<Self> {
        let dir = DatabaseDir::open(path, config.create_if_missing)?;

        let manifest = match dir.load_manifest()? {
            Some(manifest) => {
                if manifest.format_version.0 != config.format_version.0 {
                    return Err(CoreError::invalid_format(format!(
                        "incompatible format version: database is v{}.{}, expected v{}.{}",
                        manifest.format_version.0,
                        manifest.format_version.1,
                        config.format_version.0,
                        config.format_version.1
                    )));
                }
                manifest
            }
            None => Manifest::new(config.format_version),
        };

        let wal_backend = FileBackend::open_with_create_dirs(&dir.wal_path())?;
        let segment_backend = FileBackend::open_with_create_dirs(&dir.segment_path())?;

        Self::assemble(
            name,
            config,
            Some(dir),
            manifest,
            Box::new(wal_backend),
            Box::new(segment_backend),
        )
    }

    /// Opens a database on caller-provided backends.
    ///
    /// The manifest is held only in memory; pass the manifest of a previous
    /// incarnation to recover its data.
    pub fn open_with_backends(
        name: &str,
        config: Config,
        manifest: Manifest,
        wal_backend: Box<dyn StorageBackend>,
        segment_backend: Box<dyn StorageBackend>,
    ) -> CoreResult<Self> {
        Self::assemble(name, config, None, manifest, wal_backend, segment_backend)
    }

    fn assemble(
        name: &str,
        config: Config,
        dir: Option<DatabaseDir>,
        manifest: Manifest,
        wal_backend: Box<dyn StorageBackend>,
        segment_backend: Box<dyn StorageBackend>,
    ) -> CoreResult<Self> {
        let wal = Arc::new(WalManager::new(wal_backend, config.sync_on_commit));
        let segments = Arc::new(SegmentManager::new(segment_backend));

        let (next_txid, committed_seq, replayed) = Self::recover(&wal, &segments, &manifest)?;
        let txn_manager = TransactionManager::with_state(
            Arc::clone(&wal),
            Arc::clone(&segments),
            config.quota_bytes,
            next_txid,
            committed_seq,
        );
        if replayed > 0 {
            txn_manager.checkpoint()?;
            tracing::info!(database = name, transactions = replayed, "recovered from WAL");
        }

        Ok(Self {
            name: name.to_string(),
            config,
            dir,
            manifest: RwLock::new(manifest),
            wal,
            segments,
            txn_manager,
            upgrade_lock: Mutex::new(()),
            connections: AtomicUsize::new(0),
            is_open: AtomicBool::new(true),
        })
    }

    /// Rebuilds the segment index and replays committed WAL transactions.
    ///
    /// Returns (next_txid, committed_seq, replayed transaction count).
    fn recover(
        wal: &WalManager,
        segments: &SegmentManager,
        manifest: &Manifest,
    ) -> CoreResult<(u64, SequenceNumber, usize)> {
        let segment_seq = segments.rebuild(|id| manifest.is_live(id))?;

        let scan = wal.scan()?;
        if scan.valid_len < wal.size()? {
            tracing::warn!(valid = scan.valid_len, "discarding torn record at end of WAL");
            wal.truncate(scan.valid_len)?;
        }

        let mut open_txns: HashMap<TransactionId, Vec<WalRecord>> = HashMap::new();
        let mut max_txid = 0u64;
        let mut committed_seq = segment_seq;
        let mut replayed = 0usize;

        for (_, record) in scan.records {
            if let Some(txid) = record.txid() {
                max_txid = max_txid.max(txid.as_u64());
            }

            match record {
                WalRecord::Begin { txid } => {
                    open_txns.insert(txid, Vec::new());
                }
                WalRecord::Put { txid, .. } | WalRecord::Delete { txid, .. } => {
                    if let Some(ops) = open_txns.get_mut(&txid) {
                        ops.push(record);
                    }
                }
                WalRecord::Commit { txid, sequence } => {
                    let ops = open_txns.remove(&txid).unwrap_or_default();
                    committed_seq = committed_seq.max(sequence);
                    // The newest commit already in the segments may have been
                    // cut short by the torn-tail truncation; apply it again.
                    if sequence < segment_seq {
                        continue;
                    }
                    let records: Vec<SegmentRecord> = ops
                        .into_iter()
                        .filter_map(|op| match op {
                            WalRecord::Put {
                                collection_id,
                                key,
                                payload,
                                ..
                            } => Some(SegmentRecord::put(collection_id, key, payload, sequence)),
                            WalRecord::Delete {
                                collection_id, key, ..
                            } => Some(SegmentRecord::tombstone(collection_id, key, sequence)),
                            _ => None,
                        })
                        .filter(|r| manifest.is_live(r.collection_id))
                        .collect();
                    segments.apply(&records)?;
                    replayed += 1;
                }
                WalRecord::Abort { txid } => {
                    open_txns.remove(&txid);
                }
                WalRecord::Checkpoint { sequence } => {
                    committed_seq = committed_seq.max(sequence);
                }
            }
        }

        Ok((max_txid + 1, committed_seq, replayed))
    }

    /// Returns the database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stored version; 0 until the first upgrade.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.manifest.read().user_version
    }

    /// Returns the names of all collections, sorted.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.manifest.read().collections.keys().cloned().collect()
    }

    /// Returns the metadata of a collection.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<CollectionMeta> {
        self.manifest.read().collection(name).cloned()
    }

    /// Returns a copy of the manifest.
    #[must_use]
    pub fn manifest(&self) -> Manifest {
        self.manifest.read().clone()
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the directory for on-disk databases.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(DatabaseDir::path)
    }

    /// Returns the sequence number of the latest commit.
    #[must_use]
    pub fn committed_seq(&self) -> SequenceNumber {
        self.txn_manager.committed_seq()
    }

    /// Returns the number of live records across all collections.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.segments.record_count()
    }

    /// Returns the WAL and segment sizes in bytes.
    pub fn storage_size(&self) -> CoreResult<(u64, u64)> {
        Ok((self.wal.size()?, self.segments.size()?))
    }

    /// Returns the number of open connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Registers a connection at `version`, upgrading first if needed.
    ///
    /// Returns whether an upgrade ran.
    ///
    /// # Errors
    ///
    /// - `VersionConflict` if `version` is below the stored version
    /// - `Blocked` if an upgrade is needed while other connections are open
    /// - `UpgradeFailed` if the handler fails; nothing is changed
    /// - `StorageUnavailable` if the new manifest cannot be saved
    pub fn connect(&self, version: u64, handler: &dyn UpgradeHandler) -> CoreResult<bool> {
        self.ensure_open()?;
        let _guard = self.upgrade_lock.lock();

        let stored = self.version();
        if version < stored {
            return Err(ConnectionError::VersionConflict {
                requested: version,
                stored,
            }
            .into());
        }

        let upgraded = version > stored;
        if upgraded {
            if self.connection_count() > 0 {
                return Err(ConnectionError::Blocked {
                    name: self.name.clone(),
                }
                .into());
            }
            self.upgrade(stored, version, handler)?;
        }

        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(upgraded)
    }

    /// Releases a connection registered by [`connect`](Self::connect).
    pub fn disconnect(&self) {
        let _ = self
            .connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    fn upgrade(&self, old: u64, new: u64, handler: &dyn UpgradeHandler) -> CoreResult<()> {
        let current = self.manifest();
        let mut ctx = UpgradeContext::new(old, new, current.clone());
        handler
            .upgrade(&mut ctx)
            .map_err(|e| ConnectionError::UpgradeFailed {
                version: new,
                message: e.to_string(),
            })?;

        let mut staged = ctx.into_manifest();
        staged.user_version = new;
        if let Some(dir) = &self.dir {
            dir.save_manifest(&staged)
                .map_err(|e| ConnectionError::StorageUnavailable {
                    message: e.to_string(),
                })?;
        }

        let dropped: Vec<_> = current
            .collections
            .values()
            .filter(|meta| !staged.is_live(meta.id))
            .map(|meta| meta.id)
            .collect();
        *self.manifest.write() = staged;
        for id in dropped {
            self.segments.drop_collection(id);
        }

        tracing::info!(database = %self.name, old, new, "database upgraded");
        Ok(())
    }

    /// Starts a transaction over `scope`.
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` if `scope` is empty
    /// - `CollectionNotFound` if a name is not a collection
    /// - `DatabaseClosed` after [`close`](Self::close)
    pub fn transaction<S: AsRef<str>>(
        self: &Arc<Self>,
        scope: &[S],
        mode: TransactionMode,
    ) -> CoreResult<Transaction> {
        self.ensure_open()?;
        if scope.is_empty() {
            return Err(CoreError::invalid_operation(
                "a transaction needs at least one collection",
            ));
        }

        let manifest = self.manifest.read();
        let mut metas = BTreeMap::new();
        for name in scope {
            let name = name.as_ref();
            let meta = manifest
                .collection(name)
                .ok_or_else(|| CoreError::collection_not_found(name))?;
            metas.insert(name.to_string(), meta.clone());
        }
        drop(manifest);

        Ok(Transaction::new(Arc::clone(self), mode, metas))
    }

    pub(crate) fn next_txid(&self) -> TransactionId {
        self.txn_manager.next_txid()
    }

    pub(crate) fn segments(&self) -> &SegmentManager {
        &self.segments
    }

    pub(crate) fn commit_writes(
        &self,
        txid: TransactionId,
        writes: &WriteSet,
    ) -> CoreResult<SequenceNumber> {
        self.ensure_open()?;
        let sequence = self.txn_manager.commit(txid, writes, |id| {
            self.manifest
                .read()
                .name_of(id)
                .map_or_else(|| id.to_string(), str::to_string)
        })?;

        if self.config.max_wal_size > 0 && self.txn_manager.wal_size()? > self.config.max_wal_size
        {
            if let Err(err) = self.checkpoint() {
                tracing::warn!(database = %self.name, error = %err, "automatic checkpoint failed");
            }
        }
        Ok(sequence)
    }

    /// Moves every committed record into the segments and empties the WAL.
    ///
    /// After a checkpoint:
    /// - all committed data is synced to the segments
    /// - the WAL is cleared
    /// - the manifest records the checkpoint sequence
    pub fn checkpoint(&self) -> CoreResult<SequenceNumber> {
        self.ensure_open()?;
        let sequence = self.txn_manager.checkpoint()?;

        let mut manifest = self.manifest.write();
        manifest.last_checkpoint = Some(sequence);
        if let Some(dir) = &self.dir {
            dir.save_manifest(&manifest)?;
        }

        tracing::info!(database = %self.name, %sequence, "checkpoint complete");
        Ok(sequence)
    }

    /// Flushes everything and rejects further transactions.
    pub fn close(&self) -> CoreResult<()> {
        if !self.is_open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.wal.flush()?;
        self.segments.sync()?;
        tracing::debug!(database = %self.name, "database closed");
        Ok(())
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CoreError::DatabaseClosed)
        }
    }

    /// Closes the database and deletes its directory.
    pub(crate) fn destroy(mut self) -> CoreResult<()> {
        self.close()?;
        match self.dir.take() {
            Some(dir) => dir.destroy(),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("version", &self.version())
            .field("is_open", &self.is_open())
            .field("connections", &self.connection_count())
            .field("committed_seq", &self.committed_seq())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(database = %self.name, error = %err, "failed to close database");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use crate::migration::KeyedCollection;
    use crate::record::Record;
    use recordb_storage::{FaultSwitch, FaultyBackend, InMemoryBackend};

    fn memory_db(config: Config) -> (Arc<Database>, InMemoryBackend, InMemoryBackend) {
        let wal = InMemoryBackend::new();
        let segments = InMemoryBackend::new();
        let db = Database::open_with_backends(
            "test",
            config,
            Manifest::default(),
            Box::new(wal.clone()),
            Box::new(segments.clone()),
        )
        .unwrap();
        (Arc::new(db), wal, segments)
    }

    fn task(id: &str, title: &str) -> Record {
        Record::new().with("id", id).with("titulo", title)
    }

    fn tasks_db() -> Arc<Database> {
        let (db, _, _) = memory_db(Config::default().sync_on_commit(false));
        db.connect(1, &KeyedCollection::new("tasks", "id")).unwrap();
        db
    }

    #[test]
    fn first_connect_upgrades_once() {
        let db = tasks_db();
        assert_eq!(db.version(), 1);
        assert_eq!(db.collection_names(), vec!["tasks"]);
        assert_eq!(db.connection_count(), 1);

        let upgraded = db
            .connect(1, &|_: &mut UpgradeContext| -> CoreResult<()> {
                panic!("must not run")
            })
            .unwrap();
        assert!(!upgraded);
        assert_eq!(db.connection_count(), 2);
    }

    #[test]
    fn older_version_conflicts() {
        let db = tasks_db();
        db.disconnect();
        db.connect(2, &KeyedCollection::new("notes", "id")).unwrap();
        db.disconnect();

        let err = db.connect(1, &KeyedCollection::new("tasks", "id")).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Connection(ConnectionError::VersionConflict {
                requested: 1,
                stored: 2
            })
        ));
    }

    #[test]
    fn upgrade_is_blocked_by_open_connections() {
        let db = tasks_db();
        let err = db.connect(2, &KeyedCollection::new("notes", "id")).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Connection(ConnectionError::Blocked { .. })
        ));
        assert_eq!(db.version(), 1);
    }

    #[test]
    fn failed_upgrade_changes_nothing() {
        let db = tasks_db();
        db.disconnect();

        let failing = |ctx: &mut UpgradeContext| -> CoreResult<()> {
            ctx.create_collection("notes", "id")?;
            ctx.delete_collection("tasks")?;
            Err(CoreError::migration_failed("boom"))
        };
        let err = db.connect(2, &failing).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Connection(ConnectionError::UpgradeFailed { version: 2, .. })
        ));
        assert_eq!(db.version(), 1);
        assert_eq!(db.collection_names(), vec!["tasks"]);
        assert_eq!(db.connection_count(), 0);
    }

    #[test]
    fn deleting_a_collection_drops_its_records() {
        let db = tasks_db();
        let mut txn = db.transaction(&["tasks"], TransactionMode::ReadWrite).unwrap();
        txn.add("tasks", &task("t1", "a")).unwrap();
        txn.commit().unwrap();
        db.disconnect();

        db.connect(2, &|ctx: &mut UpgradeContext| {
            ctx.delete_collection("tasks")?;
            ctx.create_collection("tasks", "id")
        })
        .unwrap();

        let mut txn = db.transaction(&["tasks"], TransactionMode::ReadOnly).unwrap();
        assert_eq!(txn.get("tasks", &Key::from("t1")).unwrap(), None);
        assert_eq!(db.record_count(), 0);
    }

    #[test]
    fn transaction_scope_is_checked() {
        let db = tasks_db();
        let empty: [&str; 0] = [];
        assert!(matches!(
            db.transaction(&empty, TransactionMode::ReadOnly),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(matches!(
            db.transaction(&["nope"], TransactionMode::ReadOnly),
            Err(CoreError::CollectionNotFound { .. })
        ));
    }

    #[test]
    fn wal_replay_restores_commits() {
        let (db, wal, _) = memory_db(Config::default().max_wal_size(0));
        db.connect(1, &KeyedCollection::new("tasks", "id")).unwrap();
        let mut txn = db.transaction(&["tasks"], TransactionMode::ReadWrite).unwrap();
        txn.add("tasks", &task("t1", "a")).unwrap();
        txn.add("tasks", &task("t2", "b")).unwrap();
        txn.commit().unwrap();

        // Only the WAL survives the crash.
        let manifest = db.manifest();
        let wal_bytes = wal.snapshot();

        let recovered = Arc::new(
            Database::open_with_backends(
                "test",
                Config::default(),
                manifest,
                Box::new(InMemoryBackend::with_data(wal_bytes)),
                Box::new(InMemoryBackend::new()),
            )
            .unwrap(),
        );
        assert_eq!(recovered.committed_seq(), SequenceNumber::new(1));
        let mut txn = recovered
            .transaction(&["tasks"], TransactionMode::ReadOnly)
            .unwrap();
        assert_eq!(txn.count("tasks", &Default::default()).unwrap(), 2);
        assert_eq!(recovered.storage_size().unwrap().0, 0);
    }

    #[test]
    fn torn_wal_tail_is_discarded() {
        let (db, wal, _) = memory_db(Config::default().max_wal_size(0));
        db.connect(1, &KeyedCollection::new("tasks", "id")).unwrap();
        for id in ["t1", "t2"] {
            let mut txn = db.transaction(&["tasks"], TransactionMode::ReadWrite).unwrap();
            txn.add("tasks", &task(id, id)).unwrap();
            txn.commit().unwrap();
        }

        let mut bytes = wal.snapshot();
        bytes.truncate(bytes.len() - 5);
        let recovered = Arc::new(
            Database::open_with_backends(
                "test",
                Config::default(),
                db.manifest(),
                Box::new(InMemoryBackend::with_data(bytes)),
                Box::new(InMemoryBackend::new()),
            )
            .unwrap(),
        );
        let mut txn = recovered
            .transaction(&["tasks"], TransactionMode::ReadOnly)
            .unwrap();
        assert!(txn.get("tasks", &Key::from("t1")).unwrap().is_some());
        assert!(txn.get("tasks", &Key::from("t2")).unwrap().is_none());
    }

    #[test]
    fn failed_commit_is_not_recovered() {
        let switch = FaultSwitch::new();
        let wal = InMemoryBackend::new();
        let segments = InMemoryBackend::new();
        let db = Arc::new(
            Database::open_with_backends(
                "test",
                Config::default().max_wal_size(0),
                Manifest::default(),
                Box::new(wal.clone()),
                Box::new(FaultyBackend::new(segments.clone(), switch.clone())),
            )
            .unwrap(),
        );
        db.connect(1, &KeyedCollection::new("tasks", "id")).unwrap();

        switch.fail_writes(true);
        let mut txn = db.transaction(&["tasks"], TransactionMode::ReadWrite).unwrap();
        txn.put("tasks", &task("t1", "a")).unwrap();
        let err = txn.commit().unwrap_err();
        assert!(matches!(err, CoreError::TransactionAborted { .. }));
        switch.fail_writes(false);

        assert_eq!(db.committed_seq(), SequenceNumber::default());
        let mut txn = db.transaction(&["tasks"], TransactionMode::ReadOnly).unwrap();
        assert_eq!(txn.get("tasks", &Key::from("t1")).unwrap(), None);
        drop(txn);

        let recovered = Arc::new(
            Database::open_with_backends(
                "test",
                Config::default(),
                db.manifest(),
                Box::new(InMemoryBackend::with_data(wal.snapshot())),
                Box::new(InMemoryBackend::with_data(segments.snapshot())),
            )
            .unwrap(),
        );
        assert_eq!(recovered.committed_seq(), SequenceNumber::default());
        let mut txn = recovered
            .transaction(&["tasks"], TransactionMode::ReadOnly)
            .unwrap();
        assert_eq!(txn.get("tasks", &Key::from("t1")).unwrap(), None);
        assert_eq!(txn.count("tasks", &Default::default()).unwrap(), 0);
    }

    #[test]
    fn automatic_checkpoint_bounds_the_wal() {
        let (db, _, _) = memory_db(Config::default().sync_on_commit(false).max_wal_size(256));
        db.connect(1, &KeyedCollection::new("tasks", "id")).unwrap();
        for i in 0..20 {
            let mut txn = db.transaction(&["tasks"], TransactionMode::ReadWrite).unwrap();
            txn.put("tasks", &task(&format!("t{i}"), "padding padding padding"))
                .unwrap();
            txn.commit().unwrap();
        }
        let (wal_size, _) = db.storage_size().unwrap();
        assert!(wal_size <= 256, "WAL grew to {wal_size}");
        assert_eq!(db.record_count(), 20);
    }

    #[test]
    fn closed_database_rejects_transactions() {
        let db = tasks_db();
        db.close().unwrap();
        assert!(matches!(
            db.transaction(&["tasks"], TransactionMode::ReadOnly),
            Err(CoreError::DatabaseClosed)
        ));
    }
}
