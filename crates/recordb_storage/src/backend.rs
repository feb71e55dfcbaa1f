//! The byte-store contract shared by every backend.

use crate::error::StorageResult;

/// An append-only byte store.
///
/// The engine writes WAL frames and segment records through this trait and
/// reads them back by offset. Implementations never interpret the bytes.
///
/// # Invariants
///
/// - `append` returns the offset of the first byte written, which equals the
///   size of the store before the call
/// - `read_at(offset, len)` returns exactly the bytes appended at that offset
/// - after `flush` returns, appended bytes survive the process exiting
/// - after `sync` returns, they also survive power loss
/// - `truncate` only shrinks; growing a store happens through `append`
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Fails with [`StorageError::ReadPastEnd`](crate::StorageError::ReadPastEnd)
    /// when the range is not fully inside the store, or on I/O failure.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Fails with [`StorageError::QuotaExceeded`](crate::StorageError::QuotaExceeded)
    /// when the backend is capped and the append would cross the cap, or on
    /// I/O failure.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes appended bytes out of process buffers.
    ///
    /// # Errors
    ///
    /// Fails if the underlying flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes, i.e. the offset of the next append.
    ///
    /// # Errors
    ///
    /// Fails if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Makes data and metadata durable on stable storage.
    ///
    /// # Errors
    ///
    /// Fails if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Shrinks the store to `new_size` bytes.
    ///
    /// Used to drop the write-ahead log after a checkpoint and to discard a
    /// torn tail found during recovery.
    ///
    /// # Errors
    ///
    /// Fails with [`StorageError::InvalidTruncate`](crate::StorageError::InvalidTruncate)
    /// when `new_size` is larger than the current size, or on I/O failure.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
