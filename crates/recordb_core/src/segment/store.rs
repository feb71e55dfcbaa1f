//! Segment store management.

use crate::error::{CoreError, CoreResult};
use crate::key::{Key, KeyRange};
use crate::ordered;
use crate::segment::record::SegmentRecord;
use crate::types::{CollectionId, Direction, SequenceNumber};
use parking_lot::RwLock;
use recordb_storage::StorageBackend;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Where the live version of a record sits in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexEntry {
    offset: u64,
    len: usize,
    sequence: SequenceNumber,
}

type Index = BTreeMap<(CollectionId, Key), IndexEntry>;

/// The committed state of every collection.
///
/// Records are appended to a single log; an ordered in-memory index maps
/// `(collection, key)` to the latest live version. Tombstones remove index
/// entries, so the index only ever holds visible records.
///
/// Lock order is always index, then backend.
pub struct SegmentManager {
    backend: RwLock<Box<dyn StorageBackend>>,
    index: RwLock<Index>,
}

impl SegmentManager {
    /// Creates a segment manager with an empty index.
    ///
    /// Call [`rebuild`](Self::rebuild) to load an existing log.
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend: RwLock::new(backend),
            index: RwLock::new(BTreeMap::new()),
        }
    }

    /// Appends a batch of records and publishes them together.
    ///
    /// Readers see either none or all of the batch. A failed append leaves
    /// the log at its previous length.
    pub fn apply(&self, records: &[SegmentRecord]) -> CoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut encoded = Vec::with_capacity(records.len());
        let mut buf = Vec::new();
        for record in records {
            let bytes = record.encode()?;
            encoded.push(bytes.len());
            buf.extend_from_slice(&bytes);
        }

        let mut index = self.index.write();
        let mut backend = self.backend.write();
        let before = backend.size()?;
        let base = match backend.append(&buf) {
            Ok(base) => base,
            Err(err) => {
                if let Err(undo) = backend.truncate(before) {
                    tracing::warn!(error = %undo, "could not roll back partial segment write");
                }
                return Err(err.into());
            }
        };
        drop(backend);

        let mut offset = base;
        for (record, len) in records.iter().zip(encoded) {
            let composite = (record.collection_id, record.key.clone());
            if record.is_tombstone() {
                index.remove(&composite);
            } else {
                index.insert(
                    composite,
                    IndexEntry {
                        offset,
                        len,
                        sequence: record.sequence,
                    },
                );
            }
            offset += len as u64;
        }
        Ok(())
    }

    /// Returns the encoded record stored under `key`, if any.
    pub fn get(&self, collection_id: CollectionId, key: &Key) -> CoreResult<Option<Vec<u8>>> {
        let index = self.index.read();
        let Some(entry) = index.get(&(collection_id, key.clone())).copied() else {
            return Ok(None);
        };
        self.read_payload(entry).map(Some)
    }

    /// Checks if a live record exists under `key`.
    pub fn contains(&self, collection_id: CollectionId, key: &Key) -> bool {
        self.index.read().contains_key(&(collection_id, key.clone()))
    }

    /// Returns the next live record in `range`, strictly past `after`.
    pub fn next_entry(
        &self,
        collection_id: CollectionId,
        range: &KeyRange,
        after: Option<&Key>,
        direction: Direction,
    ) -> CoreResult<Option<(Key, Vec<u8>)>> {
        let index = self.index.read();
        let Some((key, entry)) = ordered::step(&index, collection_id, range, after, direction)
        else {
            return Ok(None);
        };
        let payload = self.read_payload(*entry)?;
        Ok(Some((key.clone(), payload)))
    }

    /// Returns every live key of a collection in ascending order.
    pub fn keys(&self, collection_id: CollectionId) -> Vec<Key> {
        let index = self.index.read();
        let Some(bounds) =
            ordered::collection_bounds(collection_id, Bound::Unbounded, Bound::Unbounded)
        else {
            return Vec::new();
        };
        index.range(bounds).map(|((_, key), _)| key.clone()).collect()
    }

    /// Counts the live records of a collection inside `range`.
    pub fn count(&self, collection_id: CollectionId, range: &KeyRange) -> usize {
        self.count_with(collection_id, range, std::iter::empty())
    }

    /// Counts the live records of a collection inside `range` as they would
    /// be after `pending` writes, each given as the key and whether the key
    /// holds a record afterwards.
    ///
    /// The index is read once, so a concurrent commit cannot be seen by the
    /// membership checks without also being counted.
    pub fn count_with<'k>(
        &self,
        collection_id: CollectionId,
        range: &KeyRange,
        pending: impl IntoIterator<Item = (&'k Key, bool)>,
    ) -> usize {
        let index = self.index.read();
        let Some(bounds) = ordered::collection_bounds(collection_id, range.lower(), range.upper())
        else {
            return 0;
        };
        let mut count = index.range(bounds).count();
        for (key, present) in pending {
            match (present, index.contains_key(&(collection_id, key.clone()))) {
                (true, false) => count += 1,
                (false, true) => count -= 1,
                _ => {}
            }
        }
        count
    }

    /// Removes a collection from the index.
    ///
    /// Its records stay in the log and are skipped by later rebuilds because
    /// the collection is no longer live.
    pub fn drop_collection(&self, collection_id: CollectionId) {
        let mut index = self.index.write();
        index.retain(|(cid, _), _| *cid != collection_id);
    }

    /// Rebuilds the index from the log.
    ///
    /// Records of collections for which `is_live` is false are skipped. A
    /// record cut short by a crash is truncated away. Returns the highest
    /// sequence number found.
    ///
    /// # Errors
    ///
    /// A complete record with a bad checksum or layout fails the rebuild.
    pub fn rebuild(&self, is_live: impl Fn(CollectionId) -> bool) -> CoreResult<SequenceNumber> {
        let mut index = self.index.write();
        let mut backend = self.backend.write();
        let size = backend.size()?;

        let mut rebuilt = Index::new();
        let mut max_sequence = SequenceNumber::default();
        let mut offset = 0u64;

        while offset < size {
            if offset + 4 > size {
                break;
            }
            let len_bytes = backend.read_at(offset, 4)?;
            let record_len =
                u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]])
                    as usize;
            if record_len < SegmentRecord::FIXED_SIZE {
                return Err(CoreError::segment_corruption(format!(
                    "record length {record_len} at offset {offset} is too small"
                )));
            }
            if offset + record_len as u64 > size {
                break;
            }

            let data = backend.read_at(offset, record_len)?;
            let record = SegmentRecord::decode(&data)?;
            max_sequence = max_sequence.max(record.sequence);

            if is_live(record.collection_id) {
                let composite = (record.collection_id, record.key);
                if record.flags.is_tombstone() {
                    rebuilt.remove(&composite);
                } else {
                    rebuilt.insert(
                        composite,
                        IndexEntry {
                            offset,
                            len: record_len,
                            sequence: record.sequence,
                        },
                    );
                }
            }

            offset += record_len as u64;
        }

        if offset < size {
            tracing::warn!(
                valid = offset,
                size,
                "discarding torn record at end of segment log"
            );
            backend.truncate(offset)?;
        }

        *index = rebuilt;
        Ok(max_sequence)
    }

    /// Flushes buffered writes.
    pub fn flush(&self) -> CoreResult<()> {
        self.backend.write().flush()?;
        Ok(())
    }

    /// Flushes and syncs to stable storage.
    pub fn sync(&self) -> CoreResult<()> {
        let mut backend = self.backend.write();
        backend.flush()?;
        backend.sync()?;
        Ok(())
    }

    /// Returns the size of the log in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.read().size()?)
    }

    /// Returns the number of live records across all collections.
    pub fn record_count(&self) -> usize {
        self.index.read().len()
    }

    fn read_payload(&self, entry: IndexEntry) -> CoreResult<Vec<u8>> {
        let data = self.backend.read().read_at(entry.offset, entry.len)?;
        let record = SegmentRecord::decode(&data)?;
        if record.sequence != entry.sequence {
            return Err(CoreError::segment_corruption(format!(
                "index points at {} but record at offset {} is {}",
                entry.sequence, entry.offset, record.sequence
            )));
        }
        Ok(record.payload)
    }
}

impl std::fmt::Debug for SegmentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentManager")
            .field("records", &self.record_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordb_storage::InMemoryBackend;

    const TASKS: CollectionId = CollectionId(1);
    const NOTES: CollectionId = CollectionId(2);

    fn put(cid: CollectionId, key: i64, payload: u8, seq: u64) -> SegmentRecord {
        SegmentRecord::put(
            cid,
            Key::Integer(key),
            vec![payload],
            SequenceNumber::new(seq),
        )
    }

    #[test]
    fn apply_and_get() {
        let segments = SegmentManager::new(Box::new(InMemoryBackend::new()));
        segments
            .apply(&[put(TASKS, 1, 0xA, 1), put(TASKS, 2, 0xB, 1)])
            .unwrap();

        assert_eq!(segments.get(TASKS, &Key::Integer(1)).unwrap(), Some(vec![0xA]));
        assert_eq!(segments.get(NOTES, &Key::Integer(1)).unwrap(), None);
        assert!(segments.contains(TASKS, &Key::Integer(2)));
        assert_eq!(segments.record_count(), 2);
    }

    #[test]
    fn later_version_wins_and_tombstone_removes() {
        let segments = SegmentManager::new(Box::new(InMemoryBackend::new()));
        segments.apply(&[put(TASKS, 1, 0xA, 1)]).unwrap();
        segments.apply(&[put(TASKS, 1, 0xB, 2)]).unwrap();
        assert_eq!(segments.get(TASKS, &Key::Integer(1)).unwrap(), Some(vec![0xB]));

        segments
            .apply(&[SegmentRecord::tombstone(
                TASKS,
                Key::Integer(1),
                SequenceNumber::new(3),
            )])
            .unwrap();
        assert_eq!(segments.get(TASKS, &Key::Integer(1)).unwrap(), None);
        assert!(!segments.contains(TASKS, &Key::Integer(1)));
    }

    #[test]
    fn ordered_walk_and_count() {
        let segments = SegmentManager::new(Box::new(InMemoryBackend::new()));
        segments
            .apply(&[
                put(TASKS, 3, 3, 1),
                put(TASKS, 1, 1, 1),
                put(NOTES, 0, 9, 1),
                put(TASKS, 2, 2, 1),
            ])
            .unwrap();

        let mut seen = Vec::new();
        let mut last = None;
        while let Some((key, payload)) = segments
            .next_entry(TASKS, &KeyRange::all(), last.as_ref(), Direction::Next)
            .unwrap()
        {
            seen.push(payload[0]);
            last = Some(key);
        }
        assert_eq!(seen, vec![1, 2, 3]);

        assert_eq!(segments.count(TASKS, &KeyRange::all()), 3);
        assert_eq!(
            segments.count(TASKS, &KeyRange::lower_bound(Key::Integer(2), false)),
            2
        );
        assert_eq!(
            segments.keys(TASKS),
            vec![Key::Integer(1), Key::Integer(2), Key::Integer(3)]
        );
    }

    #[test]
    fn count_with_pending_writes() {
        let segments = SegmentManager::new(Box::new(InMemoryBackend::new()));
        segments
            .apply(&[put(TASKS, 1, 1, 1), put(TASKS, 2, 2, 1), put(NOTES, 1, 1, 1)])
            .unwrap();

        let (one, two, three, four) = (
            Key::Integer(1),
            Key::Integer(2),
            Key::Integer(3),
            Key::Integer(4),
        );
        // Replacing 1 and adding 3 grows the count by one; deleting 2 and the
        // absent 4 shrinks it by one.
        let pending = [(&one, true), (&three, true), (&two, false), (&four, false)];
        assert_eq!(segments.count_with(TASKS, &KeyRange::all(), pending), 2);
        assert_eq!(segments.count_with(TASKS, &KeyRange::all(), [(&four, false)]), 2);
        assert_eq!(segments.count_with(NOTES, &KeyRange::all(), [(&one, false)]), 0);
    }

    #[test]
    fn rebuild_restores_index_and_sequence() {
        let memory = InMemoryBackend::new();
        let segments = SegmentManager::new(Box::new(memory.clone()));
        segments
            .apply(&[put(TASKS, 1, 1, 1), put(NOTES, 1, 7, 1)])
            .unwrap();
        segments
            .apply(&[SegmentRecord::tombstone(
                TASKS,
                Key::Integer(1),
                SequenceNumber::new(2),
            )])
            .unwrap();
        segments.apply(&[put(TASKS, 5, 5, 3)]).unwrap();

        let reopened = SegmentManager::new(Box::new(InMemoryBackend::with_data(memory.snapshot())));
        let max = reopened.rebuild(|_| true).unwrap();
        assert_eq!(max, SequenceNumber::new(3));
        assert_eq!(reopened.keys(TASKS), vec![Key::Integer(5)]);
        assert_eq!(reopened.get(NOTES, &Key::Integer(1)).unwrap(), Some(vec![7]));
    }

    #[test]
    fn rebuild_skips_dead_collections() {
        let memory = InMemoryBackend::new();
        let segments = SegmentManager::new(Box::new(memory.clone()));
        segments
            .apply(&[put(TASKS, 1, 1, 1), put(NOTES, 1, 2, 1)])
            .unwrap();

        let reopened = SegmentManager::new(Box::new(InMemoryBackend::with_data(memory.snapshot())));
        reopened.rebuild(|cid| cid != NOTES).unwrap();
        assert_eq!(reopened.record_count(), 1);
        assert!(!reopened.contains(NOTES, &Key::Integer(1)));
    }

    #[test]
    fn rebuild_truncates_torn_tail() {
        let memory = InMemoryBackend::new();
        let segments = SegmentManager::new(Box::new(memory.clone()));
        segments.apply(&[put(TASKS, 1, 1, 1)]).unwrap();
        let intact = segments.size().unwrap();

        let mut bytes = memory.snapshot();
        let torn = put(TASKS, 2, 2, 2).encode().unwrap();
        bytes.extend_from_slice(&torn[..torn.len() / 2]);

        let reopened = SegmentManager::new(Box::new(InMemoryBackend::with_data(bytes)));
        assert_eq!(reopened.rebuild(|_| true).unwrap(), SequenceNumber::new(1));
        assert_eq!(reopened.size().unwrap(), intact);
        assert_eq!(reopened.record_count(), 1);
    }

    #[test]
    fn drop_collection_clears_index() {
        let segments = SegmentManager::new(Box::new(InMemoryBackend::new()));
        segments
            .apply(&[put(TASKS, 1, 1, 1), put(NOTES, 1, 1, 1)])
            .unwrap();
        segments.drop_collection(TASKS);
        assert!(segments.keys(TASKS).is_empty());
        assert_eq!(segments.keys(NOTES).len(), 1);
    }
}
