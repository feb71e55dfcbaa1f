//! Volatile in-memory backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A byte store held entirely in memory.
///
/// Clones share the same buffer, which lets a test keep a handle on the
/// bytes of a database, drop the database without closing it, and reopen
/// a fresh engine over exactly what was written (a simulated crash).
///
/// An optional byte quota makes appends that would cross the limit fail with
/// [`StorageError::QuotaExceeded`].
///
/// ```rust
/// use recordb_storage::{InMemoryBackend, StorageBackend};
///
/// let mut backend = InMemoryBackend::with_quota(8);
/// backend.append(b"12345678").unwrap();
/// assert!(backend.append(b"9").unwrap_err().is_quota_exceeded());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    bytes: Arc<RwLock<Vec<u8>>>,
    quota: Option<u64>,
}

impl InMemoryBackend {
    /// Creates an empty, uncapped store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that refuses to grow past `limit` bytes.
    #[must_use]
    pub fn with_quota(limit: u64) -> Self {
        Self {
            bytes: Arc::default(),
            quota: Some(limit),
        }
    }

    /// Creates a store preloaded with `bytes`.
    #[must_use]
    pub fn with_data(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(RwLock::new(bytes)),
            quota: None,
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }

    /// Returns the configured quota, if any.
    #[must_use]
    pub fn quota(&self) -> Option<u64> {
        self.quota
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let bytes = self.bytes.read();
        let size = bytes.len() as u64;
        let end = offset.saturating_add(len as u64);

        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        let start = usize::try_from(offset).map_err(|_| StorageError::ReadPastEnd {
            offset,
            len,
            size,
        })?;
        Ok(bytes[start..start + len].to_vec())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut bytes = self.bytes.write();
        let offset = bytes.len() as u64;

        if let Some(limit) = self.quota {
            let requested = offset + data.len() as u64;
            if requested > limit {
                return Err(StorageError::QuotaExceeded { requested, limit });
            }
        }

        bytes.extend_from_slice(data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.bytes.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut bytes = self.bytes.write();
        let size = bytes.len() as u64;
        if new_size > size {
            return Err(StorageError::InvalidTruncate {
                requested: new_size,
                size,
            });
        }
        // new_size <= len, which already fits in usize
        bytes.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_report_running_offsets() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"todo").unwrap(), 0);
        assert_eq!(backend.append(b"list").unwrap(), 4);
        assert_eq!(backend.size().unwrap(), 8);
        assert_eq!(backend.read_at(4, 4).unwrap(), b"list");
    }

    #[test]
    fn read_outside_store_is_rejected() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"abc").unwrap();

        assert!(matches!(
            backend.read_at(2, 5),
            Err(StorageError::ReadPastEnd { size: 3, .. })
        ));
        assert!(matches!(
            backend.read_at(9, 0),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(backend.read_at(3, 0).unwrap().is_empty());
    }

    #[test]
    fn clones_share_bytes() {
        let mut writer = InMemoryBackend::new();
        let observer = writer.clone();
        writer.append(b"shared").unwrap();
        assert_eq!(observer.snapshot(), b"shared");
    }

    #[test]
    fn quota_blocks_oversized_append_without_writing() {
        let mut backend = InMemoryBackend::with_quota(10);
        backend.append(b"0123456").unwrap();

        let err = backend.append(b"7890").unwrap_err();
        assert!(matches!(
            err,
            StorageError::QuotaExceeded {
                requested: 11,
                limit: 10
            }
        ));
        assert_eq!(backend.size().unwrap(), 7);
        backend.append(b"789").unwrap();
    }

    #[test]
    fn truncate_only_shrinks() {
        let mut backend = InMemoryBackend::with_data(b"hello world".to_vec());
        backend.truncate(5).unwrap();
        assert_eq!(backend.snapshot(), b"hello");
        assert!(matches!(
            backend.truncate(6),
            Err(StorageError::InvalidTruncate {
                requested: 6,
                size: 5
            })
        ));
    }
}
