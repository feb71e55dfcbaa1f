//! Canonical CBOR encoding.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::{Integer, Value as Cbor};

/// Encodes a value as canonical CBOR.
///
/// Map entries are written in canonical key order regardless of the order
/// they are held in, so equal values always produce identical bytes.
///
/// ```rust
/// use recordb_codec::{to_canonical_cbor, Value};
///
/// assert_eq!(to_canonical_cbor(&Value::Integer(10)).unwrap(), vec![0x0a]);
/// ```
///
/// # Errors
///
/// Fails only if the underlying writer does.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(&to_cbor(value), &mut out)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(out)
}

fn to_cbor(value: &Value) -> Cbor {
    match value {
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(*b),
        Value::Integer(n) => Cbor::Integer(Integer::from(*n)),
        Value::Bytes(b) => Cbor::Bytes(b.clone()),
        Value::Text(s) => Cbor::Text(s.clone()),
        Value::Array(items) => Cbor::Array(items.iter().map(to_cbor).collect()),
        Value::Map(pairs) => {
            let mut sorted: Vec<&(Value, Value)> = pairs.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp_canonical(&b.0));
            Cbor::Map(
                sorted
                    .into_iter()
                    .map(|(k, v)| (to_cbor(k), to_cbor(v)))
                    .collect(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(value: &Value) -> Vec<u8> {
        to_canonical_cbor(value).unwrap()
    }

    #[test]
    fn integers_use_shortest_head() {
        assert_eq!(enc(&Value::Integer(0)), vec![0x00]);
        assert_eq!(enc(&Value::Integer(23)), vec![0x17]);
        assert_eq!(enc(&Value::Integer(24)), vec![0x18, 0x18]);
        assert_eq!(enc(&Value::Integer(1000)), vec![0x19, 0x03, 0xe8]);
        assert_eq!(enc(&Value::Integer(-1)), vec![0x20]);
        assert_eq!(enc(&Value::Integer(-500)), vec![0x39, 0x01, 0xf3]);
    }

    #[test]
    fn simple_values() {
        assert_eq!(enc(&Value::Null), vec![0xf6]);
        assert_eq!(enc(&Value::Bool(false)), vec![0xf4]);
        assert_eq!(enc(&Value::Bool(true)), vec![0xf5]);
    }

    #[test]
    fn strings_and_bytes() {
        assert_eq!(enc(&Value::from("id")), vec![0x62, b'i', b'd']);
        assert_eq!(enc(&Value::from(vec![1u8, 2])), vec![0x42, 1, 2]);
        assert_eq!(enc(&Value::from("")), vec![0x60]);
    }

    #[test]
    fn arrays_are_definite_length() {
        assert_eq!(
            enc(&Value::array([1, 2, 3])),
            vec![0x83, 0x01, 0x02, 0x03]
        );
    }

    #[test]
    fn unsorted_map_is_written_sorted() {
        // Bypass Value::map so the pairs are held out of order.
        let value = Value::Map(vec![
            (Value::from("bb"), Value::Integer(2)),
            (Value::from("a"), Value::Integer(1)),
        ]);
        assert_eq!(
            enc(&value),
            vec![0xa2, 0x61, b'a', 0x01, 0x62, b'b', b'b', 0x02]
        );
    }

    #[test]
    fn equal_records_encode_identically() {
        let a = Value::object([("titulo", "Tarea 1"), ("id", "tarea_1")]);
        let b = Value::object([("id", "tarea_1"), ("titulo", "Tarea 1")]);
        assert_eq!(enc(&a), enc(&b));
    }
}
