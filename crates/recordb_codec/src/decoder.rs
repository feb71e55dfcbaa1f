//! Canonical CBOR decoding.

use crate::encoder::to_canonical_cbor;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::Value as Cbor;
use std::cmp::Ordering;

/// Decodes exactly one canonical CBOR item.
///
/// The whole input must be consumed. Floats, tags, integers outside `i64`
/// and maps whose keys are not strictly ascending are rejected, as is any
/// input that is well-formed but not in its shortest canonical form.
///
/// # Errors
///
/// Returns a [`CodecError`] describing the first violation found.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut reader = bytes;
    let raw: Cbor = ciborium::de::from_reader(&mut reader)
        .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
    if !reader.is_empty() {
        return Err(CodecError::TrailingBytes {
            count: reader.len(),
        });
    }

    let value = from_raw(raw)?;
    if to_canonical_cbor(&value)? != bytes {
        return Err(CodecError::decoding_failed("input is not in canonical form"));
    }
    Ok(value)
}

fn from_raw(raw: Cbor) -> CodecResult<Value> {
    match raw {
        Cbor::Null => Ok(Value::Null),
        Cbor::Bool(b) => Ok(Value::Bool(b)),
        Cbor::Integer(n) => i64::try_from(n)
            .map(Value::Integer)
            .map_err(|_| CodecError::IntegerOverflow),
        Cbor::Bytes(b) => Ok(Value::Bytes(b)),
        Cbor::Text(s) => Ok(Value::Text(s)),
        Cbor::Float(_) => Err(CodecError::FloatForbidden),
        Cbor::Tag(tag, _) => Err(CodecError::TagForbidden { tag }),
        Cbor::Array(items) => items
            .into_iter()
            .map(from_raw)
            .collect::<CodecResult<Vec<_>>>()
            .map(Value::Array),
        Cbor::Map(entries) => {
            let mut pairs: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                let key = from_raw(k)?;
                if let Some((prev, _)) = pairs.last() {
                    match prev.cmp_canonical(&key) {
                        Ordering::Less => {}
                        Ordering::Equal => {
                            return Err(CodecError::non_canonical_map("duplicate key"))
                        }
                        Ordering::Greater => {
                            return Err(CodecError::non_canonical_map("keys out of order"))
                        }
                    }
                }
                pairs.push((key, from_raw(v)?));
            }
            Ok(Value::Map(pairs))
        }
        _ => Err(CodecError::decoding_failed("unsupported CBOR item")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_scalars() {
        assert_eq!(from_cbor(&[0x00]).unwrap(), Value::Integer(0));
        assert_eq!(from_cbor(&[0x20]).unwrap(), Value::Integer(-1));
        assert_eq!(from_cbor(&[0xf6]).unwrap(), Value::Null);
        assert_eq!(from_cbor(&[0xf5]).unwrap(), Value::Bool(true));
        assert_eq!(
            from_cbor(&[0x62, b'i', b'd']).unwrap(),
            Value::from("id")
        );
    }

    #[test]
    fn rejects_floats() {
        // 1.5 as half-precision float
        assert_eq!(from_cbor(&[0xf9, 0x3e, 0x00]), Err(CodecError::FloatForbidden));
    }

    #[test]
    fn rejects_tags() {
        // tag 1 (epoch time) wrapping 0
        assert_eq!(
            from_cbor(&[0xc1, 0x00]),
            Err(CodecError::TagForbidden { tag: 1 })
        );
    }

    #[test]
    fn rejects_u64_beyond_i64() {
        let bytes = [0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        assert_eq!(from_cbor(&bytes), Err(CodecError::IntegerOverflow));
    }

    #[test]
    fn rejects_trailing_bytes() {
        assert_eq!(
            from_cbor(&[0x01, 0x02, 0x03]),
            Err(CodecError::TrailingBytes { count: 2 })
        );
    }

    #[test]
    fn rejects_unsorted_map() {
        // {"bb": 2, "a": 1}
        let bytes = [0xa2, 0x62, b'b', b'b', 0x02, 0x61, b'a', 0x01];
        assert!(matches!(
            from_cbor(&bytes),
            Err(CodecError::NonCanonicalMap { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_map_keys() {
        // {"a": 1, "a": 2}
        let bytes = [0xa2, 0x61, b'a', 0x01, 0x61, b'a', 0x02];
        assert!(matches!(
            from_cbor(&bytes),
            Err(CodecError::NonCanonicalMap { .. })
        ));
    }

    #[test]
    fn rejects_overlong_integer_head() {
        // 10 written with a one-byte argument instead of inline
        assert!(matches!(
            from_cbor(&[0x18, 0x0a]),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(matches!(
            from_cbor(&[0x63, b'a']),
            Err(CodecError::DecodingFailed { .. })
        ));
        assert!(from_cbor(&[]).is_err());
    }

    #[test]
    fn nested_record_survives() {
        let record = Value::object([
            ("id", Value::from("tarea_1")),
            ("titulo", Value::from("Comprar pan")),
            ("tags", Value::array(["casa", "urgente"])),
            ("prioridad", Value::Integer(2)),
            ("hecha", Value::Bool(false)),
        ]);
        let bytes = to_canonical_cbor(&record).unwrap();
        assert_eq!(from_cbor(&bytes).unwrap(), record);
    }
}
