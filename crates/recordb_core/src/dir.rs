//! Database directory management.
//!
//! Each on-disk database is one directory:
//!
//! ```text
//! <root>/<name>/
//! ├─ MANIFEST          # Version and schema
//! ├─ LOCK              # Advisory lock for single-process access
//! ├─ wal.log           # Write-ahead log
//! └─ segments.dat      # Committed records
//! ```

use crate::error::{CoreError, CoreResult};
use crate::manifest::Manifest;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "MANIFEST";
const MANIFEST_TEMP: &str = "MANIFEST.tmp";
const LOCK_FILE: &str = "LOCK";
const WAL_FILE: &str = "wal.log";
const SEGMENT_FILE: &str = "segments.dat";

/// An exclusively locked database directory.
///
/// The lock is held for as long as the value lives, so only one
/// `DatabaseDir` per directory can exist across all processes.
#[derive(Debug)]
pub struct DatabaseDir {
    path: PathBuf,
    lock_file: File,
}

impl DatabaseDir {
    /// Opens or creates a database directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (`DatabaseLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "database directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            lock_file,
        })
    }

    /// Returns the path to the database directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the WAL file.
    #[must_use]
    pub fn wal_path(&self) -> PathBuf {
        self.path.join(WAL_FILE)
    }

    /// Returns the path to the segment file.
    #[must_use]
    pub fn segment_path(&self) -> PathBuf {
        self.path.join(SEGMENT_FILE)
    }

    /// Returns the path to the MANIFEST file.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_FILE)
    }

    /// Loads the manifest, or `None` for a new database.
    pub fn load_manifest(&self) -> CoreResult<Option<Manifest>> {
        Self::read_manifest(&self.path)
    }

    /// Reads the manifest of the database at `path` without locking it.
    ///
    /// Used to list databases that are not open.
    pub fn read_manifest(path: &Path) -> CoreResult<Option<Manifest>> {
        let manifest_path = path.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Ok(None);
        }

        let data = fs::read(&manifest_path)?;
        if data.is_empty() {
            return Ok(None);
        }
        Manifest::decode(&data).map(Some)
    }

    /// Saves the manifest atomically.
    ///
    /// 1. Write to a temporary file and sync it
    /// 2. Rename it over MANIFEST
    /// 3. Fsync the directory so the rename is durable
    pub fn save_manifest(&self, manifest: &Manifest) -> CoreResult<()> {
        let temp_path = self.path.join(MANIFEST_TEMP);

        let data = manifest.encode()?;
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.manifest_path())?;
        self.sync_directory()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        // NTFS journals metadata; directories cannot be fsynced.
        Ok(())
    }

    /// Checks if this is a new (empty) database directory.
    #[must_use]
    pub fn is_new_database(&self) -> bool {
        !self.manifest_path().exists() && !self.wal_path().exists()
    }

    /// Releases the lock and deletes the directory with everything in it.
    pub fn destroy(self) -> CoreResult<()> {
        let Self { path, lock_file } = self;
        fs2::FileExt::unlock(&lock_file)?;
        drop(lock_file);
        fs::remove_dir_all(&path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyPath;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("todos");

        let dir = DatabaseDir::open(&db_path, true).unwrap();
        assert!(db_path.is_dir());
        assert!(dir.is_new_database());
    }

    #[test]
    fn open_fails_if_not_exists_and_no_create() {
        let temp = tempdir().unwrap();
        assert!(DatabaseDir::open(&temp.path().join("missing"), false).is_err());
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("locked");

        let _dir = DatabaseDir::open(&db_path, true).unwrap();
        assert!(matches!(
            DatabaseDir::open(&db_path, true),
            Err(CoreError::DatabaseLocked)
        ));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("reopen");

        drop(DatabaseDir::open(&db_path, true).unwrap());
        DatabaseDir::open(&db_path, true).unwrap();
    }

    #[test]
    fn manifest_survives_reopen() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("schema");

        {
            let dir = DatabaseDir::open(&db_path, true).unwrap();
            assert!(dir.load_manifest().unwrap().is_none());

            let mut manifest = Manifest::default();
            manifest.user_version = 2;
            manifest
                .create_collection("listaTareas", KeyPath::parse("id").unwrap())
                .unwrap();
            dir.save_manifest(&manifest).unwrap();
        }

        let loaded = DatabaseDir::read_manifest(&db_path).unwrap().unwrap();
        assert_eq!(loaded.user_version, 2);
        assert!(loaded.collection("listaTareas").is_some());
        assert!(!db_path.join(MANIFEST_TEMP).exists());
    }

    #[test]
    fn destroy_removes_everything() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("doomed");

        let dir = DatabaseDir::open(&db_path, true).unwrap();
        dir.save_manifest(&Manifest::default()).unwrap();
        dir.destroy().unwrap();
        assert!(!db_path.exists());
    }

    #[test]
    fn paths_are_correct() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("paths");
        let dir = DatabaseDir::open(&db_path, true).unwrap();

        assert_eq!(dir.path(), db_path);
        assert_eq!(dir.wal_path(), db_path.join("wal.log"));
        assert_eq!(dir.segment_path(), db_path.join("segments.dat"));
        assert_eq!(dir.manifest_path(), db_path.join("MANIFEST"));
    }
}
