//! Request and reply envelopes.
//!
//! Wire format is JSON with camelCase keys. Payloads are opaque bytes carried
//! base64-encoded; the correlation id is a plain string and round-trips
//! byte-for-byte.
//!
//! ```text
//! request: {"correlationId": "...", "capability": "...", "payload": "<base64>"}
//! reply:   {"correlationId": "...", "payload": "<base64>" | null, "errorMarker": "..." | null}
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::correlation::{CorrelationId, SlotResult};
use crate::error::CallError;

/// Error markers with this prefix are reported as non-transient remote errors.
pub const PERMANENT_MARKER_PREFIX: &str = "permanent:";

/// Errors raised while encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Envelope encode failed: {0}")]
    Encode(serde_json::Error),

    #[error("Envelope decode failed: {0}")]
    Decode(serde_json::Error),
}

/// A request published once per attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub correlation_id: CorrelationId,
    pub capability: String,
    #[serde(with = "base64_bytes")]
    pub payload: Bytes,
}

impl RequestEnvelope {
    pub fn new(correlation_id: CorrelationId, capability: impl Into<String>, payload: Bytes) -> Self {
        Self {
            correlation_id,
            capability: capability.into(),
            payload,
        }
    }

    pub fn to_bytes(&self) -> Result<Bytes, EnvelopeError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(EnvelopeError::Encode)
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(raw).map_err(EnvelopeError::Decode)
    }
}

/// A reply carrying either a payload or an error marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyEnvelope {
    pub correlation_id: CorrelationId,
    #[serde(default, with = "base64_bytes_opt")]
    pub payload: Option<Bytes>,
    #[serde(default)]
    pub error_marker: Option<String>,
}

impl ReplyEnvelope {
    pub fn success(correlation_id: CorrelationId, payload: Bytes) -> Self {
        Self {
            correlation_id,
            payload: Some(payload),
            error_marker: None,
        }
    }

    pub fn failure(correlation_id: CorrelationId, marker: impl Into<String>) -> Self {
        Self {
            correlation_id,
            payload: None,
            error_marker: Some(marker.into()),
        }
    }

    pub fn to_bytes(&self) -> Result<Bytes, EnvelopeError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(EnvelopeError::Encode)
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(raw).map_err(EnvelopeError::Decode)
    }

    /// Convert into the value-or-error handed to the waiting caller.
    ///
    /// An error marker wins over a payload. A reply with neither is treated
    /// as a permanent remote failure.
    pub fn into_result(self) -> (CorrelationId, SlotResult) {
        let result = match (self.error_marker, self.payload) {
            (Some(marker), _) => {
                let transient = !marker.starts_with(PERMANENT_MARKER_PREFIX);
                Err(CallError::RemoteError {
                    status: None,
                    message: marker,
                    transient,
                })
            }
            (None, Some(payload)) => Ok(payload),
            (None, None) => Err(CallError::RemoteError {
                status: None,
                message: "reply carried neither payload nor error marker".to_string(),
                transient: false,
            }),
        };
        (self.correlation_id, result)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

mod base64_bytes_opt {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Bytes>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD
                .decode(encoded)
                .map(|raw| Some(Bytes::from(raw)))
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
