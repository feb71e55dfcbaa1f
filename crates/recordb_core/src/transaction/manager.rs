//! Transaction manager.

use crate::error::{CoreError, CoreResult};
use crate::key::Key;
use crate::segment::{SegmentManager, SegmentRecord};
use crate::transaction::state::PendingWrite;
use crate::types::{CollectionId, SequenceNumber, TransactionId};
use crate::wal::{WalManager, WalRecord};
use parking_lot::Mutex;
use recordb_storage::StorageError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Pending writes of one transaction, in key order.
pub(crate) type WriteSet = BTreeMap<(CollectionId, Key), PendingWrite>;

/// Serializes commits and checkpoints.
///
/// ## Commit protocol
///
/// Under the writer lock:
/// 1. every pending `add` is re-checked against the committed index
/// 2. the quota is checked against the bytes the commit will produce
/// 3. `Begin`, `Put`/`Delete`… and `Commit` are appended to the WAL in a
///    single write, then flushed
/// 4. the writes are applied to the segments as one batch
/// 5. the committed sequence number advances
///
/// A failure in step 3 or 4 truncates the WAL back to where the commit
/// started, so recovery never replays a commit that was reported failed.
pub struct TransactionManager {
    wal: Arc<WalManager>,
    segments: Arc<SegmentManager>,
    next_txid: AtomicU64,
    committed_seq: AtomicU64,
    write_lock: Mutex<()>,
    quota: Option<u64>,
}

impl TransactionManager {
    /// Creates a transaction manager for an empty database.
    pub fn new(wal: Arc<WalManager>, segments: Arc<SegmentManager>, quota: Option<u64>) -> Self {
        Self::with_state(wal, segments, quota, 1, SequenceNumber::default())
    }

    /// Creates a transaction manager initialized from recovery state.
    pub fn with_state(
        wal: Arc<WalManager>,
        segments: Arc<SegmentManager>,
        quota: Option<u64>,
        next_txid: u64,
        committed_seq: SequenceNumber,
    ) -> Self {
        Self {
            wal,
            segments,
            next_txid: AtomicU64::new(next_txid),
            committed_seq: AtomicU64::new(committed_seq.as_u64()),
            write_lock: Mutex::new(()),
            quota,
        }
    }

    /// Allocates a transaction ID.
    pub fn next_txid(&self) -> TransactionId {
        TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst))
    }

    /// Returns the sequence number of the latest commit.
    #[must_use]
    pub fn committed_seq(&self) -> SequenceNumber {
        SequenceNumber::new(self.committed_seq.load(Ordering::SeqCst))
    }

    /// Commits a write set.
    ///
    /// `name_of` maps collection IDs to names for error messages.
    ///
    /// # Errors
    ///
    /// - `Constraint` when an added key was committed by someone else first
    /// - `QuotaExceeded` when the commit would cross the configured quota
    /// - storage errors from the WAL or segments
    pub fn commit(
        &self,
        txid: TransactionId,
        writes: &WriteSet,
        name_of: impl Fn(CollectionId) -> String,
    ) -> CoreResult<SequenceNumber> {
        let _guard = self.write_lock.lock();

        for ((collection_id, key), write) in writes {
            if matches!(write, PendingWrite::Add(_)) && self.segments.contains(*collection_id, key) {
                return Err(CoreError::duplicate_key(name_of(*collection_id), key));
            }
        }

        let sequence = SequenceNumber::new(self.committed_seq.load(Ordering::SeqCst) + 1);
        let mut frames = WalManager::frame(&WalRecord::Begin { txid })?;
        let mut records = Vec::with_capacity(writes.len());
        let mut segment_bytes = 0u64;

        for ((collection_id, key), write) in writes {
            let (wal_record, segment_record) = match write {
                PendingWrite::Add(payload) | PendingWrite::Put(payload) => (
                    WalRecord::Put {
                        txid,
                        collection_id: *collection_id,
                        key: key.clone(),
                        payload: payload.clone(),
                    },
                    SegmentRecord::put(*collection_id, key.clone(), payload.clone(), sequence),
                ),
                PendingWrite::Delete => {
                    if !self.segments.contains(*collection_id, key) {
                        continue;
                    }
                    (
                        WalRecord::Delete {
                            txid,
                            collection_id: *collection_id,
                            key: key.clone(),
                        },
                        SegmentRecord::tombstone(*collection_id, key.clone(), sequence),
                    )
                }
            };
            frames.extend(WalManager::frame(&wal_record)?);
            segment_bytes += segment_record.encoded_len()? as u64;
            records.push(segment_record);
        }

        if records.is_empty() {
            return Ok(self.committed_seq());
        }
        frames.extend(WalManager::frame(&WalRecord::Commit { txid, sequence })?);

        if let Some(limit) = self.quota {
            let requested =
                self.wal.size()? + self.segments.size()? + frames.len() as u64 + segment_bytes;
            if requested > limit {
                return Err(CoreError::QuotaExceeded { requested, limit });
            }
        }

        let start = self.wal.size()?;
        if let Err(err) = self
            .wal
            .append_frames(&frames)
            .and_then(|_| self.wal.flush())
        {
            if let Err(undo) = self.wal.truncate(start) {
                tracing::warn!(%txid, error = %undo, "could not roll back partial WAL write");
            }
            return Err(quota_error(err));
        }

        if let Err(err) = self.segments.apply(&records) {
            if let Err(undo) = self.wal.truncate(start) {
                tracing::warn!(%txid, error = %undo, "could not roll back WAL");
            }
            return Err(quota_error(err));
        }
        self.committed_seq
            .store(sequence.as_u64(), Ordering::SeqCst);

        tracing::debug!(%txid, %sequence, writes = records.len(), "transaction committed");
        Ok(sequence)
    }

    /// Makes the segments durable and empties the WAL.
    ///
    /// Returns the sequence number covered by the checkpoint.
    pub fn checkpoint(&self) -> CoreResult<SequenceNumber> {
        let _guard = self.write_lock.lock();

        self.segments.sync()?;
        let sequence = self.committed_seq();
        self.wal.append(&WalRecord::Checkpoint { sequence })?;
        self.wal.flush()?;
        self.wal.clear()?;
        Ok(sequence)
    }

    /// Returns the current WAL size in bytes.
    pub fn wal_size(&self) -> CoreResult<u64> {
        self.wal.size()
    }
}

/// Reports a capped backend's refusal as a quota error of the engine.
fn quota_error(err: CoreError) -> CoreError {
    match err {
        CoreError::Storage(StorageError::QuotaExceeded { requested, limit }) => {
            CoreError::QuotaExceeded { requested, limit }
        }
        other => other,
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("committed_seq", &self.committed_seq())
            .field("quota", &self.quota)
            .finish_non_exhaustive()
    }
}
