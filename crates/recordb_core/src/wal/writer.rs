//! WAL writer and reader.

use crate::error::{CoreError, CoreResult};
use crate::wal::record::{WalRecord, WalRecordType, WAL_MAGIC, WAL_VERSION};
use crate::wire::compute_crc32;
use parking_lot::Mutex;
use recordb_storage::StorageBackend;

/// magic (4) + version (2) + type (1) + length (4)
const HEADER_SIZE: usize = 11;

const CRC_SIZE: usize = 4;

/// Result of reading the whole log.
#[derive(Debug, Default)]
pub struct WalScan {
    /// Every complete record with its offset.
    pub records: Vec<(u64, WalRecord)>,
    /// Length of the intact prefix; anything after it is a torn tail.
    pub valid_len: u64,
}

/// Append-only access to the WAL.
pub struct WalManager {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
}

impl WalManager {
    /// Creates a new WAL manager.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
        }
    }

    /// Encodes one record as a complete frame.
    pub fn frame(record: &WalRecord) -> CoreResult<Vec<u8>> {
        let payload = record.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_operation("WAL record payload too large"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&WAL_MAGIC);
        data.extend_from_slice(&WAL_VERSION.to_le_bytes());
        data.push(record.record_type().as_byte());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);

        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }

    /// Appends a record, returning its offset.
    pub fn append(&self, record: &WalRecord) -> CoreResult<u64> {
        let data = Self::frame(record)?;
        Ok(self.backend.lock().append(&data)?)
    }

    /// Appends pre-built frames in a single backend write.
    pub fn append_frames(&self, frames: &[u8]) -> CoreResult<u64> {
        Ok(self.backend.lock().append(frames)?)
    }

    /// Makes everything appended so far durable.
    ///
    /// Always flushes; also syncs to disk when `sync_on_commit` is set.
    pub fn flush(&self) -> CoreResult<()> {
        let mut backend = self.backend.lock();
        backend.flush()?;
        if self.sync_on_commit {
            backend.sync()?;
        }
        Ok(())
    }

    /// Returns the current WAL size.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Reads every complete record from the start of the log.
    ///
    /// # Errors
    ///
    /// A CRC mismatch, bad magic, unknown type or unsupported version fails
    /// the scan. A truncated tail does not, nor does a CRC mismatch in the
    /// last frame of the log.
    pub fn scan(&self) -> CoreResult<WalScan> {
        let backend = self.backend.lock();
        let size = backend.size()?;
        let mut scan = WalScan::default();
        let mut offset = 0u64;

        while offset + HEADER_SIZE as u64 <= size {
            let header = backend.read_at(offset, HEADER_SIZE)?;
            if header[0..4] != WAL_MAGIC {
                return Err(CoreError::wal_corruption(format!(
                    "invalid magic at offset {offset}"
                )));
            }

            let version = u16::from_le_bytes([header[4], header[5]]);
            if version > WAL_VERSION {
                return Err(CoreError::wal_corruption(format!(
                    "unsupported version {version} at offset {offset}"
                )));
            }

            let type_byte = header[6];
            let record_type = WalRecordType::from_byte(type_byte).ok_or_else(|| {
                CoreError::wal_corruption(format!(
                    "unknown record type {type_byte} at offset {offset}"
                ))
            })?;

            let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;
            let frame_len = (HEADER_SIZE + len + CRC_SIZE) as u64;
            if offset + frame_len > size {
                // Torn write: the frame was never completed.
                break;
            }

            let frame = backend.read_at(offset, frame_len as usize)?;
            let (body, crc_bytes) = frame.split_at(HEADER_SIZE + len);
            let expected =
                u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
            let actual = compute_crc32(body);
            if expected != actual {
                if offset + frame_len == size {
                    // The final frame was sized but never fully written.
                    break;
                }
                return Err(CoreError::ChecksumMismatch { expected, actual });
            }

            let record = WalRecord::decode_payload(record_type, &body[HEADER_SIZE..])?;
            scan.records.push((offset, record));
            offset += frame_len;
        }

        scan.valid_len = offset;
        Ok(scan)
    }

    /// Truncates the WAL to the specified offset.
    pub fn truncate(&self, offset: u64) -> CoreResult<()> {
        self.backend.lock().truncate(offset)?;
        Ok(())
    }

    /// Clears all data from the WAL.
    pub fn clear(&self) -> CoreResult<()> {
        self.truncate(0)
    }
}

impl std::fmt::Debug for WalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalManager")
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}
