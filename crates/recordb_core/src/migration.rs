//! Schema upgrades.
//!
//! Opening a database with a version higher than the stored one runs an
//! [`UpgradeHandler`] exactly once, before the open returns. The handler
//! works on an [`UpgradeContext`], a staged copy of the schema: collections
//! it creates or deletes are installed only if it succeeds. On failure the
//! open fails and the stored version and schema stay as they were.
//!
//! Three kinds of handler ship with the crate:
//! - closures `Fn(&mut UpgradeContext) -> CoreResult<()>`
//! - [`KeyedCollection`], which declares a single collection
//! - [`MigrationManager`], which runs one registered [`Migration`] per
//!   version step
//!
//! ## Usage
//!
//! ```rust
//! use recordb_core::{CoreResult, Migration, MigrationManager, UpgradeContext};
//!
//! struct CreateTasks;
//!
//! impl Migration for CreateTasks {
//!     fn version(&self) -> u64 { 1 }
//!     fn name(&self) -> &str { "create_tasks" }
//!     fn up(&self, ctx: &mut UpgradeContext) -> CoreResult<()> {
//!         ctx.create_collection("tasks", "id")
//!     }
//! }
//!
//! let mut migrations = MigrationManager::new();
//! migrations.register(Box::new(CreateTasks)).unwrap();
//! assert!(migrations.validate().is_ok());
//! ```

use crate::error::{CoreError, CoreResult};
use crate::key::KeyPath;
use crate::manifest::Manifest;
use std::collections::BTreeMap;

/// Version number for migrations.
pub type MigrationVersion = u64;

/// Schema operations available while an upgrade runs.
#[derive(Debug)]
pub struct UpgradeContext {
    old_version: u64,
    new_version: u64,
    manifest: Manifest,
}

impl UpgradeContext {
    pub(crate) fn new(old_version: u64, new_version: u64, manifest: Manifest) -> Self {
        Self {
            old_version,
            new_version,
            manifest,
        }
    }

    pub(crate) fn into_manifest(self) -> Manifest {
        self.manifest
    }

    /// The stored version before this upgrade; 0 for a new database.
    #[must_use]
    pub fn old_version(&self) -> u64 {
        self.old_version
    }

    /// The version being opened.
    #[must_use]
    pub fn new_version(&self) -> u64 {
        self.new_version
    }

    /// Declares a collection keyed by the field at `key_path`.
    ///
    /// # Errors
    ///
    /// - `Constraint` if the collection already exists
    /// - `Data` if the name or key path is empty
    pub fn create_collection(&mut self, name: &str, key_path: &str) -> CoreResult<()> {
        let key_path = KeyPath::parse(key_path)?;
        let id = self.manifest.create_collection(name, key_path)?;
        tracing::debug!(collection = name, %id, "collection created");
        Ok(())
    }

    /// Deletes a collection and every record in it.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound` if it does not exist.
    pub fn delete_collection(&mut self, name: &str) -> CoreResult<()> {
        let meta = self.manifest.delete_collection(name)?;
        tracing::debug!(collection = name, id = %meta.id, "collection deleted");
        Ok(())
    }

    /// Checks whether a collection exists.
    #[must_use]
    pub fn has_collection(&self, name: &str) -> bool {
        self.manifest.collection(name).is_some()
    }

    /// Key path of a collection.
    #[must_use]
    pub fn key_path(&self, name: &str) -> Option<&KeyPath> {
        self.manifest.collection(name).map(|meta| &meta.key_path)
    }

    /// Names of all collections, sorted.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.manifest.collections.keys().cloned().collect()
    }
}

/// Runs when a database is opened with a higher version than it stores.
pub trait UpgradeHandler: Send + Sync {
    /// Applies the schema changes for `ctx.old_version()` to
    /// `ctx.new_version()`.
    fn upgrade(&self, ctx: &mut UpgradeContext) -> CoreResult<()>;
}

impl<F> UpgradeHandler for F
where
    F: Fn(&mut UpgradeContext) -> CoreResult<()> + Send + Sync,
{
    fn upgrade(&self, ctx: &mut UpgradeContext) -> CoreResult<()> {
        self(ctx)
    }
}

/// Declares one collection.
///
/// Creates the collection if it is missing and accepts it if it already
/// exists with the same key path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedCollection {
    /// Collection name.
    pub collection: String,
    /// Field holding the primary key.
    pub key_path: String,
}

impl KeyedCollection {
    /// Creates a handler declaring `collection` keyed by `key_path`.
    pub fn new(collection: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            key_path: key_path.into(),
        }
    }
}

impl UpgradeHandler for KeyedCollection {
    fn upgrade(&self, ctx: &mut UpgradeContext) -> CoreResult<()> {
        match ctx.key_path(&self.collection) {
            None => ctx.create_collection(&self.collection, &self.key_path),
            Some(existing) if existing.as_str() == self.key_path => Ok(()),
            Some(existing) => Err(CoreError::Constraint {
                collection: self.collection.clone(),
                message: format!(
                    "already keyed by {existing:?}, cannot redeclare with {:?}",
                    self.key_path
                ),
            }),
        }
    }
}

/// Information about a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationInfo {
    /// Version number (unique, sequential).
    pub version: MigrationVersion,
    /// Human-readable name.
    pub name: String,
    /// Description of what this migration does.
    pub description: Option<String>,
}

/// One step of a versioned schema history.
pub trait Migration: Send + Sync {
    /// The version this migration upgrades to.
    ///
    /// Versions must be unique and sequential starting from 1.
    fn version(&self) -> MigrationVersion;

    /// Returns the name of this migration.
    fn name(&self) -> &str;

    /// Returns an optional description.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Applies the migration.
    fn up(&self, ctx: &mut UpgradeContext) -> CoreResult<()>;
}

/// Runs registered migrations as an [`UpgradeHandler`].
///
/// An upgrade from `old` to `new` runs every migration with a version in
/// `(old, new]`, in version order. The first failure aborts the whole
/// upgrade.
pub struct MigrationManager {
    migrations: BTreeMap<MigrationVersion, Box<dyn Migration>>,
}

impl MigrationManager {
    /// Creates a new migration manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            migrations: BTreeMap::new(),
        }
    }

    /// Registers a migration.
    ///
    /// Returns an error if a migration with the same version already exists.
    pub fn register(&mut self, migration: Box<dyn Migration>) -> CoreResult<()> {
        let version = migration.version();
        if version == 0 {
            return Err(CoreError::migration_failed("migration versions start at 1"));
        }
        if self.migrations.contains_key(&version) {
            return Err(CoreError::migration_failed(format!(
                "migration version {version} already registered"
            )));
        }
        self.migrations.insert(version, migration);
        Ok(())
    }

    /// Returns list of registered migrations.
    #[must_use]
    pub fn list(&self) -> Vec<MigrationInfo> {
        self.migrations.values().map(|m| info(m.as_ref())).collect()
    }

    /// Migrations an upgrade from `from` to `to` would run.
    #[must_use]
    pub fn pending(&self, from: u64, to: u64) -> Vec<MigrationInfo> {
        if from >= to {
            return Vec::new();
        }
        self.migrations
            .range(from + 1..=to)
            .map(|(_, m)| info(m.as_ref()))
            .collect()
    }

    /// Highest registered version, 0 when empty.
    #[must_use]
    pub fn latest_version(&self) -> MigrationVersion {
        self.migrations.keys().next_back().copied().unwrap_or(0)
    }

    /// Validates that migrations are sequential with no gaps.
    pub fn validate(&self) -> CoreResult<()> {
        for (i, version) in self.migrations.keys().enumerate() {
            let expected = i as u64 + 1;
            if *version != expected {
                return Err(CoreError::migration_failed(format!(
                    "migration version gap: expected {expected}, got {version}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl UpgradeHandler for MigrationManager {
    fn upgrade(&self, ctx: &mut UpgradeContext) -> CoreResult<()> {
        let (from, to) = (ctx.old_version(), ctx.new_version());
        if from >= to {
            return Ok(());
        }
        for (version, migration) in self.migrations.range(from + 1..=to) {
            tracing::info!(version, name = migration.name(), "running migration");
            migration.up(ctx).map_err(|e| {
                CoreError::migration_failed(format!(
                    "migration {version} ({}) failed: {e}",
                    migration.name()
                ))
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for MigrationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationManager")
            .field("versions", &self.migrations.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn info(migration: &dyn Migration) -> MigrationInfo {
    MigrationInfo {
        version: migration.version(),
        name: migration.name().to_string(),
        description: migration.description().map(String::from),
    }
}
