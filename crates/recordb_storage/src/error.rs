//! Errors raised by storage backends.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a [`StorageBackend`](crate::StorageBackend).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The operating system reported an I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read range extends past the end of the store.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: usize,
        /// Size of the store at the time of the read.
        size: u64,
    },

    /// A truncate asked the store to grow.
    #[error("cannot truncate to {requested} bytes: store holds only {size}")]
    InvalidTruncate {
        /// Requested size.
        requested: u64,
        /// Current size.
        size: u64,
    },

    /// An append would push the store past its byte quota.
    #[error("storage quota exceeded: {requested} bytes requested, limit is {limit}")]
    QuotaExceeded {
        /// Total size the append would have produced.
        requested: u64,
        /// Configured limit.
        limit: u64,
    },

    /// A failure injected by [`FaultyBackend`](crate::FaultyBackend).
    #[error("injected storage fault during {operation}")]
    Injected {
        /// The backend operation that was failed.
        operation: &'static str,
    },
}

impl StorageError {
    /// Returns true when the error is a quota violation.
    #[must_use]
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}
