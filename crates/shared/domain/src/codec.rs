//! Versioned value encoding.
//!
//! Values are stored as a JSON envelope `{"v":1,"data":...}`. The version
//! byte lets a later format coexist with rows written by this one.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::constants::ENCODING_VERSION;
use crate::error::{DomainError, DomainResult};

#[derive(Serialize)]
struct EnvelopeRef<'a, T: ?Sized> {
    v: u8,
    data: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    v: u8,
    data: serde_json::Value,
}

/// Encode a value for storage.
pub fn encode_value<T: Serialize + ?Sized>(value: &T) -> DomainResult<String> {
    serde_json::to_string(&EnvelopeRef {
        v: ENCODING_VERSION,
        data: value,
    })
    .map_err(|e| DomainError::serialization(format!("cannot encode value: {}", e)))
}

/// Decode a stored value.
///
/// Malformed envelopes, unknown versions and payloads that do not match `T`
/// are all reported as serialization errors.
pub fn decode_value<T: DeserializeOwned>(raw: &str) -> DomainResult<T> {
    let envelope: Envelope = serde_json::from_str(raw)
        .map_err(|e| DomainError::serialization(format!("corrupt stored value: {}", e)))?;

    if envelope.v != ENCODING_VERSION {
        return Err(DomainError::serialization(format!(
            "unsupported value encoding version {}",
            envelope.v
        )));
    }

    serde_json::from_value(envelope.data)
        .map_err(|e| DomainError::serialization(format!("stored value has wrong shape: {}", e)))
}
