//! # RecorDB Codec
//!
//! Canonical CBOR for RecorDB records and keys.
//!
//! Every record field and every primary key is held as a [`Value`] and
//! written in one deterministic byte form:
//! - map keys sorted length-first, then bytewise
//! - integers in their shortest head
//! - definite lengths only
//! - no floats, no tags
//!
//! The decoder is strict: anything that would not re-encode to the same
//! bytes is rejected.
//!
//! ```
//! use recordb_codec::{from_cbor, to_canonical_cbor, Value};
//!
//! let task = Value::object([("id", "tarea_1"), ("titulo", "Comprar pan")]);
//! let bytes = to_canonical_cbor(&task).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), task);
//! ```

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::from_cbor;
pub use encoder::to_canonical_cbor;
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// Types that can be written as canonical CBOR.
pub trait Encode {
    /// Encode this value to canonical CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Types that can be read back from canonical CBOR.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
            "[a-z]{0,8}".prop_map(Value::Text),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::vec(("[a-z]{1,6}", inner), 0..6)
                    .prop_map(|pairs| Value::object(pairs)),
            ]
        })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(value in arb_value()) {
            let bytes = value.encode().unwrap();
            prop_assert_eq!(Value::decode(&bytes).unwrap(), value);
        }

        #[test]
        fn field_order_does_not_change_bytes(
            fields in prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)
        ) {
            let forward: Vec<_> = fields.iter().map(|(k, v)| (k.clone(), *v)).collect();
            let mut backward = forward.clone();
            backward.reverse();
            prop_assert_eq!(
                Value::object(forward).encode().unwrap(),
                Value::object(backward).encode().unwrap()
            );
        }

        #[test]
        fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = Value::decode(&bytes);
        }
    }
}
