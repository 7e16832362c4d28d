//! # Payload Codec
//!
//! Boundary format for every record this crate produces or consumes:
//! the JSON text of the application value (UTF-8), base64 encoded.
//!
//! Decoding is a pure function over bytes. Anything that is not valid base64,
//! not UTF-8 or not JSON is rejected with [`DispatchError::Decode`].
//!
//! Encoding is deterministic: object keys are emitted in sorted order
//! whatever map type the value was built from. NaN and infinities have no
//! JSON form and are rejected with [`DispatchError::Encode`].

mod finite;

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::{DispatchError, DispatchResult};

/// Encode a value into a transport payload.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> DispatchResult<Vec<u8>> {
    finite::check(value).map_err(|e| DispatchError::encode(e.to_string()))?;
    let json = serde_json::to_value(value).map_err(|e| DispatchError::encode(e.to_string()))?;
    let text = serde_json::to_string(&sorted(json))
        .map_err(|e| DispatchError::encode(e.to_string()))?;
    Ok(STANDARD.encode(text.as_bytes()).into_bytes())
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        Value::Object(map) => {
            let entries: BTreeMap<String, Value> =
                map.into_iter().map(|(key, value)| (key, sorted(value))).collect();
            Value::Object(entries.into_iter().collect())
        }
        other => other,
    }
}

/// Decode a transport payload into a typed value.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> DispatchResult<T> {
    let text = decode_text(payload)?;
    Ok(serde_json::from_str(&text)?)
}

/// Decode a transport payload into an untyped JSON value.
pub fn decode_value(payload: &[u8]) -> DispatchResult<Value> {
    decode(payload)
}

fn decode_text(payload: &[u8]) -> DispatchResult<String> {
    // Tolerate trailing newlines some producers append
    let trimmed = payload.trim_ascii_end();
    let raw = STANDARD.decode(trimmed)?;
    String::from_utf8(raw)
        .map_err(|e| DispatchError::decode(format!("payload is not valid UTF-8: {e}")))
}

/// Serialization contract for values sent through the dispatch core
///
/// Implemented for every serde-compatible type, so application structs,
/// primitives and `serde_json::Value` all travel the same way.
pub trait MessageCodec: Sized {
    /// Serialize the value to a transport payload
    fn to_payload(&self) -> DispatchResult<Vec<u8>>;

    /// Deserialize a value from a transport payload
    fn from_payload(payload: &[u8]) -> DispatchResult<Self>;
}

impl<T> MessageCodec for T
where
    T: Serialize + DeserializeOwned,
{
    fn to_payload(&self) -> DispatchResult<Vec<u8>> {
        encode(self)
    }

    fn from_payload(payload: &[u8]) -> DispatchResult<Self> {
        decode(payload)
    }
}
