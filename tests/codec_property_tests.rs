//! Codec laws over generated JSON documents.

mod common;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::*;
use dispatch_core::codec::{self, MessageCodec};
use dispatch_core::error::DispatchError;
use proptest::prelude::*;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

proptest! {
    #[test]
    fn prop_decode_inverts_encode(value in json_value_strategy()) {
        let payload = codec::encode(&value).unwrap();
        prop_assert_eq!(codec::decode_value(&payload).unwrap(), value);
    }

    #[test]
    fn prop_encoding_is_deterministic(value in json_value_strategy()) {
        prop_assert_eq!(codec::encode(&value).unwrap(), codec::encode(&value).unwrap());
    }

    #[test]
    fn prop_payload_is_base64_of_json_text(value in json_value_strategy()) {
        let payload = codec::encode(&value).unwrap();
        let text = String::from_utf8(STANDARD.decode(&payload).unwrap()).unwrap();
        prop_assert_eq!(text, serde_json::to_string(&value).unwrap());
    }

    #[test]
    fn prop_arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..128)) {
        match codec::decode_value(&bytes) {
            Ok(_) => {}
            Err(e) => prop_assert!(matches!(e, DispatchError::Decode { .. })),
        }
    }

    #[test]
    fn prop_hash_maps_encode_like_sorted_maps(
        entries in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..16)
    ) {
        let hashed: HashMap<String, i64> = entries.clone().into_iter().collect();
        let sorted: BTreeMap<String, i64> = entries;
        prop_assert_eq!(codec::encode(&hashed).unwrap(), codec::encode(&sorted).unwrap());
    }

    #[test]
    fn prop_non_finite_floats_are_rejected(
        finite in -1.0e12f64..1.0e12,
        bad in prop_oneof![Just(f64::NAN), Just(f64::INFINITY), Just(f64::NEG_INFINITY)]
    ) {
        prop_assert!(codec::encode(&vec![finite]).is_ok());
        let encoded = codec::encode(&vec![finite, bad]);
        prop_assert!(matches!(encoded, Err(DispatchError::Encode { .. })));
    }

    #[test]
    fn prop_typed_values_round_trip(topic in topic_strategy(), n in any::<i64>()) {
        let message = (topic, n);
        let payload = message.to_payload().unwrap();
        prop_assert_eq!(<(String, i64)>::from_payload(&payload).unwrap(), message);
    }
}

#[test]
fn test_code_like_payloads_are_data() {
    // Evaluated as code this would not be a string; decoded as JSON it is one
    let payload = codec::encode(&"__import__('os').system('true')").unwrap();
    assert_eq!(
        codec::decode_value(&payload).unwrap(),
        Value::String("__import__('os').system('true')".to_string())
    );

    let not_json = STANDARD.encode("print('hi')");
    assert!(matches!(
        codec::decode_value(not_json.as_bytes()),
        Err(DispatchError::Decode { .. })
    ));
}
