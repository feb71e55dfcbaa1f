//! Primary keys, key paths and key ranges.
//!
//! Keys are totally ordered across types:
//!
//! ```text
//! integers < text < byte strings < arrays
//! ```
//!
//! Within a type, integers compare numerically, text by code point, bytes
//! lexicographically, and arrays element by element, a shorter prefix first.

use crate::error::{CoreError, CoreResult};
use recordb_codec::{from_cbor, to_canonical_cbor, Value};
use std::fmt;
use std::ops::Bound;

/// A primary-key value.
///
/// The derived ordering is the key order: variants are declared in type rank
/// order, and `String` and `Vec` already compare the way keys must.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Integer key.
    Integer(i64),
    /// Text key.
    Text(String),
    /// Byte-string key.
    Bytes(Vec<u8>),
    /// Compound key.
    Array(Vec<Key>),
}

impl Key {
    /// The smallest possible key.
    pub const MIN: Key = Key::Integer(i64::MIN);

    /// Converts a field value into a key.
    ///
    /// # Errors
    ///
    /// Null, booleans and maps (also inside arrays) are not keys and yield
    /// [`CoreError::Data`].
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Integer(n) => Ok(Key::Integer(*n)),
            Value::Text(s) => Ok(Key::Text(s.clone())),
            Value::Bytes(b) => Ok(Key::Bytes(b.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::from_value)
                .collect::<CoreResult<Vec<_>>>()
                .map(Key::Array),
            other => Err(CoreError::data(format!(
                "{} is not a valid key",
                other.type_name()
            ))),
        }
    }

    /// Converts the key back into a field value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Key::Integer(n) => Value::Integer(*n),
            Key::Text(s) => Value::Text(s.clone()),
            Key::Bytes(b) => Value::Bytes(b.clone()),
            Key::Array(items) => Value::Array(items.iter().map(Key::to_value).collect()),
        }
    }

    /// Canonical CBOR bytes of the key, as stored in the WAL and segments.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        Ok(to_canonical_cbor(&self.to_value())?)
    }

    /// Decodes key bytes produced by [`Key::encode`].
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        Self::from_value(&from_cbor(bytes)?)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Integer(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Integer(i64::from(n))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl From<Vec<u8>> for Key {
    fn from(b: Vec<u8>) -> Self {
        Key::Bytes(b)
    }
}

/// The field holding a collection's primary key.
///
/// Either a plain field name (`"id"`) or a dotted path into nested maps
/// (`"meta.id"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath(String);

impl KeyPath {
    /// Parses a key path.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::Data`] if the path or any segment is empty.
    pub fn parse(path: &str) -> CoreResult<Self> {
        if path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(CoreError::data(format!("invalid key path {path:?}")));
        }
        Ok(Self(path.to_string()))
    }

    /// The path as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The field names along the path.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A contiguous interval of keys.
///
/// ```rust
/// use recordb_core::{Key, KeyRange};
///
/// let range = KeyRange::bound(Key::from("b"), Key::from("d"), false, true).unwrap();
/// assert!(range.contains(&Key::from("b")));
/// assert!(!range.contains(&Key::from("d")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    lower: Bound<Key>,
    upper: Bound<Key>,
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::all()
    }
}

impl KeyRange {
    /// Every key.
    #[must_use]
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Exactly one key.
    #[must_use]
    pub fn only(key: Key) -> Self {
        Self {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    /// Keys above `key` (excluding it when `open`).
    #[must_use]
    pub fn lower_bound(key: Key, open: bool) -> Self {
        Self {
            lower: if open {
                Bound::Excluded(key)
            } else {
                Bound::Included(key)
            },
            upper: Bound::Unbounded,
        }
    }

    /// Keys below `key` (excluding it when `open`).
    #[must_use]
    pub fn upper_bound(key: Key, open: bool) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: if open {
                Bound::Excluded(key)
            } else {
                Bound::Included(key)
            },
        }
    }

    /// Keys between `lower` and `upper`.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::Data`] if `lower > upper`, or if they are
    /// equal and either end is open.
    pub fn bound(lower: Key, upper: Key, lower_open: bool, upper_open: bool) -> CoreResult<Self> {
        if lower > upper || (lower == upper && (lower_open || upper_open)) {
            return Err(CoreError::data(format!(
                "empty key range: {lower} .. {upper}"
            )));
        }
        Ok(Self {
            lower: if lower_open {
                Bound::Excluded(lower)
            } else {
                Bound::Included(lower)
            },
            upper: if upper_open {
                Bound::Excluded(upper)
            } else {
                Bound::Included(upper)
            },
        })
    }

    /// The lower end.
    #[must_use]
    pub fn lower(&self) -> Bound<&Key> {
        self.lower.as_ref()
    }

    /// The upper end.
    #[must_use]
    pub fn upper(&self) -> Bound<&Key> {
        self.upper.as_ref()
    }

    /// Whether `key` falls inside the range.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        let above = match &self.lower {
            Bound::Included(k) => key >= k,
            Bound::Excluded(k) => key > k,
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(k) => key <= k,
            Bound::Excluded(k) => key < k,
            Bound::Unbounded => true,
        };
        above && below
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_rank_order() {
        let mut keys = vec![
            Key::Array(vec![Key::Integer(0)]),
            Key::Bytes(vec![0]),
            Key::from("a"),
            Key::Integer(i64::MAX),
            Key::Integer(-5),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                Key::Integer(-5),
                Key::Integer(i64::MAX),
                Key::from("a"),
                Key::Bytes(vec![0]),
                Key::Array(vec![Key::Integer(0)]),
            ]
        );
    }

    #[test]
    fn arrays_compare_elementwise_then_length() {
        let short = Key::Array(vec![Key::Integer(1)]);
        let long = Key::Array(vec![Key::Integer(1), Key::Integer(0)]);
        let bigger = Key::Array(vec![Key::Integer(2)]);
        assert!(short < long);
        assert!(long < bigger);
    }

    #[test]
    fn min_is_smallest() {
        assert!(Key::MIN <= Key::Integer(i64::MIN));
        assert!(Key::MIN < Key::from(""));
        assert!(Key::MIN < Key::Array(Vec::new()));
    }

    #[test]
    fn invalid_key_values() {
        assert!(matches!(
            Key::from_value(&Value::Null),
            Err(CoreError::Data { .. })
        ));
        assert!(Key::from_value(&Value::Bool(true)).is_err());
        assert!(Key::from_value(&Value::object([("a", 1)])).is_err());
        assert!(Key::from_value(&Value::array([Value::Null])).is_err());
    }

    #[test]
    fn encoded_key_decodes() {
        let key = Key::Array(vec![Key::from("tarea"), Key::Integer(3)]);
        let bytes = key.encode().unwrap();
        assert_eq!(Key::decode(&bytes).unwrap(), key);
    }

    #[test]
    fn key_path_validation() {
        assert_eq!(KeyPath::parse("id").unwrap().segments().count(), 1);
        assert_eq!(
            KeyPath::parse("meta.id").unwrap().segments().collect::<Vec<_>>(),
            vec!["meta", "id"]
        );
        assert!(KeyPath::parse("").is_err());
        assert!(KeyPath::parse("meta..id").is_err());
        assert!(KeyPath::parse(".id").is_err());
    }

    #[test]
    fn range_membership() {
        let range = KeyRange::lower_bound(Key::Integer(10), true);
        assert!(!range.contains(&Key::Integer(10)));
        assert!(range.contains(&Key::Integer(11)));
        assert!(range.contains(&Key::from("text sorts after numbers")));

        assert!(KeyRange::only(Key::from("x")).contains(&Key::from("x")));
        assert!(!KeyRange::only(Key::from("x")).contains(&Key::from("y")));
        assert!(KeyRange::all().contains(&Key::MIN));
    }

    #[test]
    fn inverted_range_rejected() {
        assert!(KeyRange::bound(Key::Integer(5), Key::Integer(1), false, false).is_err());
        assert!(KeyRange::bound(Key::Integer(5), Key::Integer(5), true, false).is_err());
        assert!(KeyRange::bound(Key::Integer(5), Key::Integer(5), false, false).is_ok());
    }

    #[test]
    fn display_uses_value_form() {
        assert_eq!(Key::from("t1").to_string(), "\"t1\"");
        assert_eq!(Key::Integer(7).to_string(), "7");
    }
}
