//! Payload codec: JSON text on the way in, JSON-or-raw on the way out.
//!
//! Every entry stores its payload in a single field named [`DATA_FIELD`]
//! holding JSON text. Decoding never fails; anything that is not JSON is
//! handed to the subscriber as [`Payload::Raw`].

use bytes::Bytes;
use serde::Serialize;

use crate::error::Result;
use crate::message::Payload;

/// Name of the entry field that carries the payload.
pub const DATA_FIELD: &str = "data";

/// Serialize a payload to JSON text for appending.
pub fn encode<T: Serialize + ?Sized>(payload: &T) -> Result<String> {
    Ok(serde_json::to_string(payload)?)
}

/// Decode a stored field value, falling back to the raw bytes.
pub fn decode(raw: &Bytes) -> Payload {
    match serde_json::from_slice::<serde_json::Value>(raw) {
        Ok(value) => Payload::Json(value),
        Err(_) => Payload::Raw(raw.clone()),
    }
}
