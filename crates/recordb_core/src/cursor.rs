//! Cursors over a collection.

use crate::database::Database;
use crate::error::CoreResult;
use crate::key::{Key, KeyRange};
use crate::ordered;
use crate::record::Record;
use crate::transaction::PendingWrite;
use crate::types::{CollectionId, Direction};
use std::collections::BTreeMap;
use std::iter::FusedIterator;
use std::sync::Arc;

/// A lazy walk over one collection in key order.
///
/// Each step looks up the nearest key past the previous one, so the walk
/// observes commits that land while it is in progress. Writes buffered by
/// the transaction that opened the cursor are merged in and take precedence
/// over committed records.
///
/// The walk is finite and cannot be restarted. After it ends, or after a
/// step fails, every further step yields nothing.
pub struct Cursor {
    db: Arc<Database>,
    collection: String,
    collection_id: CollectionId,
    range: KeyRange,
    direction: Direction,
    pending: BTreeMap<(CollectionId, Key), PendingWrite>,
    position: Option<Key>,
    done: bool,
}

impl Cursor {
    pub(crate) fn new(
        db: Arc<Database>,
        collection: String,
        collection_id: CollectionId,
        range: KeyRange,
        direction: Direction,
        pending: BTreeMap<(CollectionId, Key), PendingWrite>,
    ) -> Self {
        Self {
            db,
            collection,
            collection_id,
            range,
            direction,
            pending,
            position: None,
            done: false,
        }
    }

    /// Name of the collection being walked.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Traversal order.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Key of the record most recently returned.
    #[must_use]
    pub fn key(&self) -> Option<&Key> {
        self.position.as_ref()
    }

    /// Moves to the next record and returns it with its key.
    pub fn next_entry(&mut self) -> CoreResult<Option<(Key, Record)>> {
        if self.done {
            return Ok(None);
        }
        let result = self.advance();
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result
    }

    fn advance(&mut self) -> CoreResult<Option<(Key, Record)>> {
        loop {
            let after = self.position.as_ref();
            let committed = self.db.segments().next_entry(
                self.collection_id,
                &self.range,
                after,
                self.direction,
            )?;
            let pending = ordered::step(
                &self.pending,
                self.collection_id,
                &self.range,
                after,
                self.direction,
            );

            let (key, payload) = match (committed, pending) {
                (None, None) => return Ok(None),
                (Some((key, payload)), None) => (key, Some(payload)),
                (None, Some((key, write))) => (key.clone(), write.payload().map(<[u8]>::to_vec)),
                (Some((committed_key, payload)), Some((pending_key, write))) => {
                    let pending_first = match self.direction {
                        Direction::Next => pending_key <= &committed_key,
                        Direction::Prev => pending_key >= &committed_key,
                    };
                    if pending_first {
                        (pending_key.clone(), write.payload().map(<[u8]>::to_vec))
                    } else {
                        (committed_key, Some(payload))
                    }
                }
            };

            self.position = Some(key.clone());
            // A pending delete hides the record; keep walking.
            if let Some(payload) = payload {
                return Ok(Some((key, Record::decode(&payload)?)));
            }
        }
    }
}

impl Iterator for Cursor {
    type Item = CoreResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry()
            .map(|entry| entry.map(|(_, record)| record))
            .transpose()
    }
}

impl FusedIterator for Cursor {}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("collection", &self.collection)
            .field("direction", &self.direction)
            .field("position", &self.position)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
