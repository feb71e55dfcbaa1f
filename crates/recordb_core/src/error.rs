//! Error types for RecorDB core.

use crate::key::Key;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Why opening a database failed.
///
/// An open either yields a live connection or exactly one of these. None of
/// them leave partial schema state behind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// The database name is empty or not a plain identifier.
    #[error("invalid database name: {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// Versions start at 1.
    #[error("invalid database version: 0")]
    InvalidVersion,

    /// The requested version is older than the stored one.
    #[error("version conflict: requested {requested}, stored {stored}")]
    VersionConflict {
        /// Version passed to open.
        requested: u64,
        /// Version already stored.
        stored: u64,
    },

    /// The upgrade handler failed; the stored version is unchanged.
    #[error("upgrade to version {version} failed: {message}")]
    UpgradeFailed {
        /// Version the upgrade was heading to.
        version: u64,
        /// What the handler reported.
        message: String,
    },

    /// The backing storage could not be opened or written.
    #[error("storage unavailable: {message}")]
    StorageUnavailable {
        /// Underlying failure.
        message: String,
    },

    /// Other connections are still open on the database.
    #[error("database {name:?} is blocked by open connections")]
    Blocked {
        /// Database name.
        name: String,
    },
}

/// Errors that can occur in RecorDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] recordb_storage::StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] recordb_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Opening a database failed.
    #[error("connection failed: {0}")]
    Connection(#[from] ConnectionError),

    /// A uniqueness rule was broken: a duplicate key, or a collection
    /// declared twice.
    #[error("constraint violation in {collection:?}: {message}")]
    Constraint {
        /// Collection name.
        collection: String,
        /// Which rule was broken.
        message: String,
    },

    /// No record exists under the requested key.
    #[error("no record with key {key} in {collection:?}")]
    NotFound {
        /// Collection name.
        collection: String,
        /// The missing key.
        key: Key,
    },

    /// The transaction was rolled back; none of its writes persisted.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for abort.
        reason: String,
        /// The failure that caused the abort, if any.
        #[source]
        cause: Option<Box<CoreError>>,
    },

    /// The transaction has already committed or aborted.
    #[error("transaction is no longer active")]
    TransactionInactive,

    /// A write was issued in a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The collection does not exist or is outside the transaction scope.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Name of the collection.
        name: String,
    },

    /// A record or key is not acceptable.
    #[error("data error: {message}")]
    Data {
        /// What was wrong.
        message: String,
    },

    /// A commit would grow the database past its quota.
    #[error("quota exceeded: commit needs {requested} bytes, limit is {limit}")]
    QuotaExceeded {
        /// Total bytes the commit would have produced.
        requested: u64,
        /// Configured limit.
        limit: u64,
    },

    /// Database is closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// Another process holds the database directory.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// Invalid database format or version.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// WAL is corrupted or invalid.
    #[error("WAL corruption: {message}")]
    WalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Segment is corrupted or invalid.
    #[error("segment corruption: {message}")]
    SegmentCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Migration failed.
    #[error("migration failed: {message}")]
    MigrationFailed {
        /// Description of the failure.
        message: String,
    },

    /// A background task panicked or was cancelled.
    #[error("background task failed: {message}")]
    BackgroundTask {
        /// What the runtime reported.
        message: String,
    },
}

impl CoreError {
    /// Creates a WAL corruption error.
    pub fn wal_corruption(message: impl Into<String>) -> Self {
        Self::WalCorruption {
            message: message.into(),
        }
    }

    /// Creates a segment corruption error.
    pub fn segment_corruption(message: impl Into<String>) -> Self {
        Self::SegmentCorruption {
            message: message.into(),
        }
    }

    /// Creates a transaction aborted error with no underlying cause.
    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
            cause: None,
        }
    }

    /// Creates a transaction aborted error caused by `cause`.
    pub fn aborted_by(cause: CoreError) -> Self {
        Self::TransactionAborted {
            reason: cause.to_string(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Creates a constraint error for a key that is already taken.
    pub fn duplicate_key(collection: impl Into<String>, key: &Key) -> Self {
        Self::Constraint {
            collection: collection.into(),
            message: format!("key {key} already exists"),
        }
    }

    /// Creates a constraint error for a collection declared twice.
    pub fn duplicate_collection(name: impl Into<String>) -> Self {
        Self::Constraint {
            collection: name.into(),
            message: "collection already exists".into(),
        }
    }

    /// Creates a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Creates a collection not found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a migration failed error.
    pub fn migration_failed(message: impl Into<String>) -> Self {
        Self::MigrationFailed {
            message: message.into(),
        }
    }

    /// Builds an equal error, so one failure can be returned to the caller
    /// and also kept as a transaction's abort cause.
    ///
    /// I/O errors keep their kind and message but lose their inner source.
    #[must_use]
    pub fn replicate(&self) -> Self {
        use recordb_storage::StorageError;

        let io = |e: &io::Error| io::Error::new(e.kind(), e.to_string());
        match self {
            Self::Storage(e) => Self::Storage(match e {
                StorageError::Io(inner) => StorageError::Io(io(inner)),
                StorageError::ReadPastEnd { offset, len, size } => StorageError::ReadPastEnd {
                    offset: *offset,
                    len: *len,
                    size: *size,
                },
                StorageError::InvalidTruncate { requested, size } => {
                    StorageError::InvalidTruncate {
                        requested: *requested,
                        size: *size,
                    }
                }
                StorageError::QuotaExceeded { requested, limit } => StorageError::QuotaExceeded {
                    requested: *requested,
                    limit: *limit,
                },
                StorageError::Injected { operation } => StorageError::Injected { operation },
            }),
            Self::Codec(e) => Self::Codec(e.clone()),
            Self::Io(e) => Self::Io(io(e)),
            Self::Connection(e) => Self::Connection(e.clone()),
            Self::Constraint {
                collection,
                message,
            } => Self::Constraint {
                collection: collection.clone(),
                message: message.clone(),
            },
            Self::NotFound { collection, key } => Self::NotFound {
                collection: collection.clone(),
                key: key.clone(),
            },
            Self::TransactionAborted { reason, cause } => Self::TransactionAborted {
                reason: reason.clone(),
                cause: cause.as_ref().map(|c| Box::new(c.replicate())),
            },
            Self::TransactionInactive => Self::TransactionInactive,
            Self::ReadOnly => Self::ReadOnly,
            Self::CollectionNotFound { name } => Self::collection_not_found(name.clone()),
            Self::Data { message } => Self::data(message.clone()),
            Self::QuotaExceeded { requested, limit } => Self::QuotaExceeded {
                requested: *requested,
                limit: *limit,
            },
            Self::DatabaseClosed => Self::DatabaseClosed,
            Self::DatabaseLocked => Self::DatabaseLocked,
            Self::InvalidFormat { message } => Self::invalid_format(message.clone()),
            Self::WalCorruption { message } => Self::wal_corruption(message.clone()),
            Self::SegmentCorruption { message } => Self::segment_corruption(message.clone()),
            Self::ChecksumMismatch { expected, actual } => Self::ChecksumMismatch {
                expected: *expected,
                actual: *actual,
            },
            Self::InvalidOperation { message } => Self::invalid_operation(message.clone()),
            Self::MigrationFailed { message } => Self::migration_failed(message.clone()),
            Self::BackgroundTask { message } => Self::BackgroundTask {
                message: message.clone(),
            },
        }
    }

    /// For an aborted transaction, the failure that caused it.
    #[must_use]
    pub fn abort_cause(&self) -> Option<&CoreError> {
        match self {
            Self::TransactionAborted { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }

    /// Returns true for a unique-key violation, directly or as an abort cause.
    #[must_use]
    pub fn is_constraint(&self) -> bool {
        match self {
            Self::Constraint { .. } => true,
            other => other.abort_cause().is_some_and(Self::is_constraint),
        }
    }

    /// Returns true for a quota violation, directly or as an abort cause.
    #[must_use]
    pub fn is_quota_exceeded(&self) -> bool {
        match self {
            Self::QuotaExceeded { .. } => true,
            Self::Storage(e) => e.is_quota_exceeded(),
            other => other.abort_cause().is_some_and(Self::is_quota_exceeded),
        }
    }
}
