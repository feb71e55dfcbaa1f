//! Property-based test generators using proptest.
//!
//! Provides strategies for generating keys, field values and records that
//! the engine accepts, plus operation sequences for model-based tests.

use proptest::prelude::*;
use recordb_codec::Value;
use recordb_core::{Key, Record};

/// Strategy for generating primary keys.
///
/// Compound keys nest one level deep.
pub fn key_strategy() -> impl Strategy<Value = Key> {
    let scalar = prop_oneof![
        any::<i64>().prop_map(Key::Integer),
        "[a-z0-9_]{0,12}".prop_map(Key::Text),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(Key::Bytes),
    ];
    prop_oneof![
        4 => scalar.clone(),
        1 => prop::collection::vec(scalar, 1..4).prop_map(Key::Array),
    ]
}

/// Strategy for generating field values. Floats never appear.
pub fn value_strategy() -> impl Strategy<Value = Value> + Clone {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        ".{0,16}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::vec(("[a-z]{1,6}", inner), 0..4)
                .prop_map(|fields| Value::object(fields)),
        ]
    })
}

/// Strategy for generating valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,31}").expect("Invalid regex")
}

/// Strategy for generating a record keyed by `id`.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    (
        key_strategy(),
        prop::collection::btree_map("[a-z]{1,8}", value_strategy(), 0..5),
    )
        .prop_map(|(key, fields)| {
            fields
                .into_iter()
                .filter(|(name, _)| name != "id")
                .fold(Record::new().with("id", key.to_value()), |record, (name, value)| {
                    record.with(name, value)
                })
        })
}

/// One operation in a model-based test, each run in its own transaction.
#[derive(Debug, Clone)]
pub enum RecordOperation {
    /// Insert; must fail if the key exists.
    Add(Record),
    /// Insert or replace.
    Put(Record),
    /// Remove a key, present or not.
    Delete(Key),
    /// Read a key.
    Get(Key),
}

/// Strategy for generating record operations over a small key space, so
/// that operations collide often.
pub fn record_operation_strategy() -> impl Strategy<Value = RecordOperation> {
    let key = (0i64..16).prop_map(Key::Integer);
    let record = ((0i64..16), value_strategy())
        .prop_map(|(id, value)| Record::new().with("id", id).with("value", value));
    prop_oneof![
        3 => record.clone().prop_map(RecordOperation::Add),
        3 => record.prop_map(RecordOperation::Put),
        2 => key.clone().prop_map(RecordOperation::Delete),
        2 => key.prop_map(RecordOperation::Get),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<RecordOperation>> {
    prop::collection::vec(record_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
