//! Ordered traversal of `(collection, key)` maps.
//!
//! Both the committed index and a transaction's pending writes are
//! `BTreeMap`s keyed by `(CollectionId, Key)`. A cursor step is a range query
//! over one collection's slice of such a map, bounded by the cursor's key
//! range and by the last key it returned.

use crate::key::{Key, KeyRange};
use crate::types::{CollectionId, Direction};
use std::collections::BTreeMap;
use std::ops::Bound;

type Composite = (CollectionId, Key);

/// Finds the next entry of `collection` inside `range`, strictly past `after`
/// in `direction`.
pub(crate) fn step<'m, V>(
    map: &'m BTreeMap<Composite, V>,
    collection: CollectionId,
    range: &KeyRange,
    after: Option<&Key>,
    direction: Direction,
) -> Option<(&'m Key, &'m V)> {
    let (lower, upper) = match (direction, after) {
        (Direction::Next, Some(last)) => (Bound::Excluded(last), range.upper()),
        (Direction::Prev, Some(last)) => (range.lower(), Bound::Excluded(last)),
        (_, None) => (range.lower(), range.upper()),
    };
    let bounds = collection_bounds(collection, lower, upper)?;

    let mut entries = map.range(bounds);
    let entry = match direction {
        Direction::Next => entries.next(),
        Direction::Prev => entries.next_back(),
    };
    entry.map(|((_, key), value)| (key, value))
}

/// Maps key bounds within one collection to composite bounds.
///
/// Returns `None` when the interval is empty, since `BTreeMap::range`
/// panics on inverted bounds.
pub(crate) fn collection_bounds(
    collection: CollectionId,
    lower: Bound<&Key>,
    upper: Bound<&Key>,
) -> Option<(Bound<Composite>, Bound<Composite>)> {
    let start = match lower {
        Bound::Included(k) => Bound::Included((collection, k.clone())),
        Bound::Excluded(k) => Bound::Excluded((collection, k.clone())),
        Bound::Unbounded => Bound::Included((collection, Key::MIN)),
    };
    let end = match upper {
        Bound::Included(k) => Bound::Included((collection, k.clone())),
        Bound::Excluded(k) => Bound::Excluded((collection, k.clone())),
        Bound::Unbounded => match collection.next() {
            Some(next) => Bound::Excluded((next, Key::MIN)),
            None => Bound::Unbounded,
        },
    };

    let (lo, lo_inclusive) = match &start {
        Bound::Included(k) => (k, true),
        Bound::Excluded(k) => (k, false),
        Bound::Unbounded => return Some((start, end)),
    };
    let empty = match &end {
        Bound::Included(hi) => lo > hi || (lo == hi && !lo_inclusive),
        Bound::Excluded(hi) => lo >= hi,
        Bound::Unbounded => false,
    };
    (!empty).then_some((start, end))
}
