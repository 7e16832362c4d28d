use proptest::prelude::*;
use serde_json::{Map, Value};

/// Strategy for JSON scalars that survive a text round trip exactly
pub fn json_scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        ".{0,32}".prop_map(Value::String),
    ]
}

/// Strategy for nested JSON documents
pub fn json_value_strategy() -> impl Strategy<Value = Value> {
    json_scalar_strategy().prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,12}", inner, 0..8)
                .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Strategy for topic names
pub fn topic_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_.-]{0,30}"
}
