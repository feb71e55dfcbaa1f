//! Opening databases by name and version.

use crate::config::Config;
use crate::database::Database;
use crate::dir::DatabaseDir;
use crate::error::{ConnectionError, CoreError, CoreResult};
use crate::manifest::Manifest;
use crate::migration::UpgradeHandler;
use crate::transaction::Transaction;
use crate::types::TransactionMode;
use parking_lot::Mutex;
use recordb_storage::InMemoryBackend;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Where a factory keeps its databases.
#[derive(Debug, Clone)]
enum Backing {
    /// Databases live as long as the factory.
    Memory,
    /// One directory per database under the root.
    Disk(PathBuf),
}

/// How the factory holds a database it has opened.
#[derive(Debug)]
enum Slot {
    /// In-memory databases are kept alive by the factory itself.
    Strong(Arc<Database>),
    /// Disk databases close once their last connection goes away.
    Weak(Weak<Database>),
}

impl Slot {
    fn get(&self) -> Option<Arc<Database>> {
        match self {
            Self::Strong(db) => Some(Arc::clone(db)),
            Self::Weak(db) => db.upgrade(),
        }
    }
}

struct FactoryInner {
    backing: Backing,
    config: Config,
    databases: Mutex<HashMap<String, Slot>>,
}

/// Opens named, versioned databases.
///
/// Every connection to the same name through one factory shares a single
/// [`Database`]. Cloning a factory yields a handle to the same set of
/// databases.
///
/// ```rust
/// use recordb_core::{Factory, KeyedCollection};
///
/// let factory = Factory::in_memory();
/// let conn = factory.open("todos", 1, &KeyedCollection::new("tasks", "id")).unwrap();
/// assert_eq!(conn.version(), 1);
/// assert_eq!(conn.collection_names(), vec!["tasks"]);
/// ```
#[derive(Clone)]
pub struct Factory {
    inner: Arc<FactoryInner>,
}

/// A name and stored version, as listed by [`Factory::databases`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
    /// Stored version.
    pub version: u64,
}

impl Factory {
    /// Creates a factory whose databases live in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_config(None, Config::default())
    }

    /// Creates a factory storing each database in a directory under `root`.
    pub fn on_disk(root: impl Into<PathBuf>) -> Self {
        Self::with_config(Some(root.into()), Config::default())
    }

    /// Creates a factory with a custom configuration.
    ///
    /// `root` selects disk storage; `None` keeps databases in memory.
    #[must_use]
    pub fn with_config(root: Option<PathBuf>, config: Config) -> Self {
        let backing = root.map_or(Backing::Memory, Backing::Disk);
        Self {
            inner: Arc::new(FactoryInner {
                backing,
                config,
                databases: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the root directory of a disk factory.
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        match &self.inner.backing {
            Backing::Memory => None,
            Backing::Disk(root) => Some(root),
        }
    }

    /// Opens `name` at `version`, upgrading it first when `version` is
    /// higher than the stored version.
    ///
    /// The upgrade handler runs at most once per open, and only if the
    /// upgrade is needed. Readiness is logged once per successful open.
    ///
    /// # Errors
    ///
    /// A [`CoreError::Connection`] for invalid names and versions, version
    /// conflicts, failed upgrades, blocked upgrades and unavailable storage;
    /// `DatabaseLocked` if another process holds the database.
    pub fn open(
        &self,
        name: &str,
        version: u64,
        upgrade: &dyn UpgradeHandler,
    ) -> CoreResult<Connection> {
        validate_name(name)?;
        if version == 0 {
            return Err(ConnectionError::InvalidVersion.into());
        }

        let db = self.database(name)?;
        db.connect(version, upgrade)
            .inspect_err(|err| tracing::warn!(database = name, error = %err, "open failed"))?;

        tracing::info!(database = name, version = db.version(), "database ready");
        Ok(Connection {
            inner: Arc::new(ConnectionInner {
                db,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Deletes a database and all of its data.
    ///
    /// Returns whether the database existed.
    ///
    /// # Errors
    ///
    /// `Blocked` while any connection to it is open.
    pub fn delete_database(&self, name: &str) -> CoreResult<bool> {
        validate_name(name)?;
        let mut databases = self.inner.databases.lock();

        let open = databases.get(name).and_then(Slot::get);
        if let Some(db) = &open {
            if db.connection_count() > 0 {
                return Err(ConnectionError::Blocked {
                    name: name.to_string(),
                }
                .into());
            }
        }
        databases.remove(name);

        let existed = match &self.inner.backing {
            Backing::Memory => open.is_some(),
            Backing::Disk(root) => {
                let path = root.join(name);
                match open {
                    Some(db) => match Arc::try_unwrap(db) {
                        Ok(db) => db.destroy()?,
                        Err(_) => {
                            return Err(ConnectionError::Blocked {
                                name: name.to_string(),
                            }
                            .into())
                        }
                    },
                    None if path.exists() => DatabaseDir::open(&path, false)?.destroy()?,
                    None => return Ok(false),
                }
                true
            }
        };

        if existed {
            tracing::info!(database = name, "database deleted");
        }
        Ok(existed)
    }

    /// Lists every database that has been upgraded at least once.
    pub fn databases(&self) -> CoreResult<Vec<DatabaseInfo>> {
        let databases = self.inner.databases.lock();
        let mut found: HashMap<String, u64> = databases
            .iter()
            .filter_map(|(name, slot)| slot.get().map(|db| (name.clone(), db.version())))
            .collect();
        drop(databases);

        if let Backing::Disk(root) = &self.inner.backing {
            if root.is_dir() {
                for entry in std::fs::read_dir(root)? {
                    let entry = entry?;
                    let Ok(name) = entry.file_name().into_string() else {
                        continue;
                    };
                    if found.contains_key(&name) || !entry.path().is_dir() {
                        continue;
                    }
                    if let Some(manifest) = DatabaseDir::read_manifest(&entry.path())? {
                        found.insert(name, manifest.user_version);
                    }
                }
            }
        }

        let mut list: Vec<DatabaseInfo> = found
            .into_iter()
            .filter(|(_, version)| *version > 0)
            .map(|(name, version)| DatabaseInfo { name, version })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    /// Returns the shared database for `name`, opening it if needed.
    fn database(&self, name: &str) -> CoreResult<Arc<Database>> {
        let mut databases = self.inner.databases.lock();
        if let Some(db) = databases.get(name).and_then(Slot::get) {
            return Ok(db);
        }

        let config = self.inner.config.clone();
        let (db, slot): (Arc<Database>, fn(&Arc<Database>) -> Slot) = match &self.inner.backing {
            Backing::Memory => {
                let db = Database::open_with_backends(
                    name,
                    config.clone(),
                    Manifest::new(config.format_version),
                    Box::new(InMemoryBackend::new()),
                    Box::new(InMemoryBackend::new()),
                )
                .map_err(unavailable)?;
                (Arc::new(db), |db| Slot::Strong(Arc::clone(db)))
            }
            Backing::Disk(root) => {
                let db = Database::open(&root.join(name), name, config).map_err(unavailable)?;
                (Arc::new(db), |db| Slot::Weak(Arc::downgrade(db)))
            }
        };

        databases.insert(name.to_string(), slot(&db));
        Ok(db)
    }
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("backing", &self.inner.backing)
            .finish_non_exhaustive()
    }
}

/// Maps a failure to open storage to a connection error.
///
/// A held directory lock stays `DatabaseLocked`.
fn unavailable(err: CoreError) -> CoreError {
    match err {
        CoreError::DatabaseLocked => err,
        other => ConnectionError::StorageUnavailable {
            message: other.to_string(),
        }
        .into(),
    }
}

fn validate_name(name: &str) -> CoreResult<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(ConnectionError::InvalidName {
            name: name.to_string(),
        }
        .into());
    }
    Ok(())
}

struct ConnectionInner {
    db: Arc<Database>,
    closed: AtomicBool,
}

impl ConnectionInner {
    fn release(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.db.disconnect();
            tracing::debug!(database = self.db.name(), "connection closed");
        }
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        self.release();
    }
}

/// A live handle on an opened database.
///
/// Clones share one underlying connection; it is released when
/// [`close`](Self::close) is called or the last clone is dropped.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Returns the database name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.db.name()
    }

    /// Returns the stored database version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.db.version()
    }

    /// Returns the names of all collections, sorted.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.inner.db.collection_names()
    }

    /// Returns the underlying database.
    #[must_use]
    pub fn database(&self) -> &Arc<Database> {
        &self.inner.db
    }

    /// Starts a transaction over the collections in `scope`.
    ///
    /// # Errors
    ///
    /// - `DatabaseClosed` after [`close`](Self::close)
    /// - `InvalidOperation` for an empty scope
    /// - `CollectionNotFound` for an unknown collection
    pub fn transaction<S: AsRef<str>>(
        &self,
        scope: &[S],
        mode: TransactionMode,
    ) -> CoreResult<Transaction> {
        if self.is_closed() {
            return Err(CoreError::DatabaseClosed);
        }
        self.inner.db.transaction(scope, mode)
    }

    /// Releases the connection. Transactions already started keep working.
    pub fn close(&self) {
        self.inner.release();
    }

    /// Checks whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name())
            .field("version", &self.version())
            .field("closed", &self.is_closed())
            .finish()
    }
}
