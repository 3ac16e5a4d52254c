//! # Wire Envelope
//!
//! Every structured frame on the socket is `{ "data": ..., "className": ... }`.
//! `data` is either an object or a string holding JSON; [`Envelope::data_as`]
//! accepts both.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{RelayError, RelayResult};

/// Tag of the per-item broadcast.
pub const CHAPTER_NOTIFICATION: &str = "ChapterNotification";
/// Tag of error replies sent to a single session.
pub const GATEWAY_ERROR: &str = "GatewayError";

/// A decoded or to-be-encoded wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Payload, object or JSON-in-a-string.
    pub data: Value,
    /// Type tag used for routing.
    #[serde(rename = "className")]
    pub class_name: String,
}

impl Envelope {
    /// Wraps any serializable payload under `class_name`.
    pub fn wrap<T: Serialize>(class_name: &str, data: &T) -> RelayResult<Self> {
        Ok(Self {
            data: serde_json::to_value(data)?,
            class_name: class_name.to_string(),
        })
    }

    /// An error reply carrying `message` as its data.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: Value::String(message.into()),
            class_name: GATEWAY_ERROR.to_string(),
        }
    }

    /// Parses a text frame.
    pub fn decode(text: &str) -> RelayResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Renders the frame as JSON text.
    pub fn encode(&self) -> RelayResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserializes `data`. A string payload is itself parsed as JSON first.
    pub fn data_as<T: DeserializeOwned>(&self) -> RelayResult<T> {
        match &self.data {
            Value::String(raw) => serde_json::from_str(raw)
                .map_err(|e| RelayError::Decode(format!("{} data: {e}", self.class_name))),
            other => serde_json::from_value(other.clone())
                .map_err(|e| RelayError::Decode(format!("{} data: {e}", self.class_name))),
        }
    }
}

/// An encoded frame ready for fan-out. Cloning shares the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    kind: Arc<str>,
    payload: Arc<str>,
}

impl OutboundMessage {
    /// Encodes an envelope once for every recipient.
    pub fn from_envelope(envelope: &Envelope) -> RelayResult<Self> {
        Ok(Self {
            kind: Arc::from(envelope.class_name.as_str()),
            payload: Arc::from(envelope.encode()?),
        })
    }

    /// Wraps already-encoded text.
    pub fn raw(kind: &str, payload: impl Into<Arc<str>>) -> Self {
        Self { kind: Arc::from(kind), payload: payload.into() }
    }

    /// The type tag.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The encoded text.
    pub fn payload(&self) -> &Arc<str> {
        &self.payload
    }
}
