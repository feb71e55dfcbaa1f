//! Records: named fields of dynamic values.

use crate::error::{CoreError, CoreResult};
use crate::key::{Key, KeyPath};
use recordb_codec::{from_cbor, to_canonical_cbor, Value};
use std::collections::BTreeMap;

/// A stored record.
///
/// Fields are kept by name; one of them (the collection's key path) holds
/// the primary key. Records are written as canonical CBOR maps, so two equal
/// records always produce identical bytes.
///
/// ```rust
/// use recordb_core::{Key, KeyPath, Record};
///
/// let task = Record::new()
///     .with("id", "tarea_1")
///     .with("titulo", "Comprar pan");
/// let path = KeyPath::parse("id").unwrap();
/// assert_eq!(task.key(&path).unwrap(), Key::from("tarea_1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record with `name` set to `value`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Returns a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Removes a field.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Iterates over fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Follows a key path through nested maps.
    #[must_use]
    pub fn lookup(&self, path: &KeyPath) -> Option<&Value> {
        let mut segments = path.segments();
        let mut current = self.fields.get(segments.next()?)?;
        for segment in segments {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// Extracts the primary key at `path`.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::Data`] if the path is missing or holds a value
    /// that is not a valid key.
    pub fn key(&self, path: &KeyPath) -> CoreResult<Key> {
        let value = self
            .lookup(path)
            .ok_or_else(|| CoreError::data(format!("record has no value at key path {path}")))?;
        Key::from_value(value)
    }

    /// Converts the record into a map value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::object(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())))
    }

    /// Builds a record from a map value with text keys.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::Data`] for non-map values or non-text field names.
    pub fn from_value(value: Value) -> CoreResult<Self> {
        let Value::Map(pairs) = value else {
            return Err(CoreError::data(format!(
                "a record must be a map, got {}",
                value.type_name()
            )));
        };

        let mut fields = BTreeMap::new();
        for (name, field) in pairs {
            let Value::Text(name) = name else {
                return Err(CoreError::data("record field names must be text"));
            };
            fields.insert(name, field);
        }
        Ok(Self { fields })
    }

    /// Encodes the record as canonical CBOR.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        Ok(to_canonical_cbor(&self.to_value())?)
    }

    /// Decodes a record from canonical CBOR.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        Self::from_value(from_cbor(bytes)?)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tarea(id: &str, titulo: &str) -> Record {
        Record::new()
            .with("id", id)
            .with("titulo", titulo)
            .with("descripcion", "Descripción de la tarea")
    }

    #[test]
    fn key_from_top_level_field() {
        let path = KeyPath::parse("id").unwrap();
        assert_eq!(tarea("tarea_1", "T1").key(&path).unwrap(), Key::from("tarea_1"));
    }

    #[test]
    fn key_from_nested_path() {
        let record = Record::new().with("meta", Value::object([("id", 42)]));
        let path = KeyPath::parse("meta.id").unwrap();
        assert_eq!(record.key(&path).unwrap(), Key::Integer(42));
    }

    #[test]
    fn missing_or_invalid_key_is_data_error() {
        let path = KeyPath::parse("id").unwrap();
        let no_id = Record::new().with("titulo", "x");
        assert!(matches!(no_id.key(&path), Err(CoreError::Data { .. })));

        let null_id = Record::new().with("id", Value::Null);
        assert!(matches!(null_id.key(&path), Err(CoreError::Data { .. })));
    }

    #[test]
    fn encoding_ignores_insertion_order() {
        let a = Record::new().with("titulo", "x").with("id", "t");
        let b = Record::new().with("id", "t").with("titulo", "x");
        assert_eq!(a.encode().unwrap(), b.encode().unwrap());
        assert_eq!(Record::decode(&a.encode().unwrap()).unwrap(), b);
    }

    #[test]
    fn non_map_values_are_not_records() {
        assert!(Record::from_value(Value::Integer(1)).is_err());
        let numeric_field = Value::map(vec![(Value::Integer(1), Value::Null)]);
        assert!(Record::from_value(numeric_field).is_err());
    }

    #[test]
    fn field_access() {
        let mut record: Record = [("id", "t1")].into_iter().collect();
        assert_eq!(record.set("hecha", true), None);
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("hecha"), Some(&Value::Bool(true)));
        assert_eq!(record.remove("hecha"), Some(Value::Bool(true)));
        assert_eq!(
            record.fields().map(|(k, _)| k).collect::<Vec<_>>(),
            vec!["id"]
        );
        assert!(!record.is_empty());
    }
}
