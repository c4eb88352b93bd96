//! Delivered messages and the handler's continue/stop signal.

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::{BoxError, Result};

/// Payload of a delivered entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The `data` field decoded as JSON.
    Json(serde_json::Value),
    /// The `data` field as stored, when it is not valid JSON.
    Raw(Bytes),
}

/// One entry delivered to a subscription handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    topic: String,
    id: String,
    payload: Payload,
}

impl Message {
    /// Create a message. Normally only the consumption loop does this.
    pub fn new(topic: impl Into<String>, id: impl Into<String>, payload: Payload) -> Self {
        Self {
            topic: topic.into(),
            id: id.into(),
            payload,
        }
    }

    /// Topic the entry was read from.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Entry id assigned by the log service on append.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The decoded payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Consume the message, returning its payload.
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// The JSON payload, if the entry decoded as JSON.
    pub fn json(&self) -> Option<&serde_json::Value> {
        match &self.payload {
            Payload::Json(v) => Some(v),
            Payload::Raw(_) => None,
        }
    }

    /// The payload as text: a JSON string value or UTF-8 raw bytes.
    pub fn as_str(&self) -> Option<&str> {
        match &self.payload {
            Payload::Json(serde_json::Value::String(s)) => Some(s),
            Payload::Json(_) => None,
            Payload::Raw(b) => std::str::from_utf8(b).ok(),
        }
    }

    /// Deserialize the payload into `T`.
    ///
    /// Raw payloads are tried as a JSON string value, so a `String` target
    /// receives the undecoded text.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        let value = match &self.payload {
            Payload::Json(v) => v.clone(),
            Payload::Raw(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
        };
        Ok(serde_json::from_value(value)?)
    }
}

/// What the consumption loop should do after a message has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading.
    Continue,
    /// Acknowledge this message, then end the subscription.
    Stop,
}

/// Conversion from a handler's return value into a [`Flow`].
///
/// Implemented for `Flow`, `()` (continue) and `Result`s of either, so
/// handlers can be written as plain closures or fallible ones using `?`.
pub trait IntoFlow {
    /// Convert into a flow decision or a handler failure.
    fn into_flow(self) -> std::result::Result<Flow, BoxError>;
}

impl IntoFlow for Flow {
    fn into_flow(self) -> std::result::Result<Flow, BoxError> {
        Ok(self)
    }
}

impl IntoFlow for () {
    fn into_flow(self) -> std::result::Result<Flow, BoxError> {
        Ok(Flow::Continue)
    }
}

impl<E: Into<BoxError>> IntoFlow for std::result::Result<Flow, E> {
    fn into_flow(self) -> std::result::Result<Flow, BoxError> {
        self.map_err(Into::into)
    }
}

impl<E: Into<BoxError>> IntoFlow for std::result::Result<(), E> {
    fn into_flow(self) -> std::result::Result<Flow, BoxError> {
        self.map(|()| Flow::Continue).map_err(Into::into)
    }
}
