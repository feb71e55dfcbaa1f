//! Database configuration.

/// Configuration shared by every database a [`Factory`](crate::Factory) opens.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create a database directory that does not exist yet.
    pub create_if_missing: bool,

    /// Whether to sync the WAL to disk on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// WAL size that triggers an automatic checkpoint after a commit (0 = never).
    pub max_wal_size: u64,

    /// Upper bound on WAL plus segment bytes; commits past it fail.
    pub quota_bytes: Option<u64>,

    /// Format version to use for new databases.
    pub format_version: (u16, u16),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            max_wal_size: 16 * 1024 * 1024, // 16 MB
            quota_bytes: None,
            format_version: (1, 0),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync WAL on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the WAL size that triggers an automatic checkpoint.
    #[must_use]
    pub const fn max_wal_size(mut self, size: u64) -> Self {
        self.max_wal_size = size;
        self
    }

    /// Caps the total bytes a database may occupy.
    #[must_use]
    pub const fn quota_bytes(mut self, limit: u64) -> Self {
        self.quota_bytes = Some(limit);
        self
    }
}
