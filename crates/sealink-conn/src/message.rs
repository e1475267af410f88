use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{ConnError, Result};

/// Application data carried by one message.
///
/// A missing payload and a zero-length payload look the same on the wire, so
/// both arrive as [`Payload::Empty`].
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    /// No data.
    #[default]
    Empty,
    /// Raw bytes. Also used for ciphertext that could not be decrypted.
    Bytes(Bytes),
    /// Structured JSON. Objects serialize with sorted keys.
    Json(Value),
}

impl Payload {
    /// Normalize bytes read off the wire.
    pub(crate) fn from_wire(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            Self::Empty
        } else {
            Self::Bytes(bytes)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes.as_ref()),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes.into())
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(bytes))
    }
}

impl<const N: usize> From<&[u8; N]> for Payload {
    fn from(bytes: &[u8; N]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(bytes))
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Bytes(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self::Json(Value::Object(map))
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

/// A received message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// True only when the payload is still ciphertext (no local private key).
    pub encrypted: bool,
    /// The sender flagged the payload as JSON.
    pub is_json: bool,
    /// Protocol id the message was sent on.
    pub protocol: u16,
    pub data: Payload,
}

impl Message {
    /// Deserialize a JSON payload into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.data {
            Payload::Json(value) => Ok(T::deserialize(value)?),
            Payload::Bytes(bytes) if !self.encrypted => Ok(serde_json::from_slice(bytes)?),
            _ => Err(ConnError::UnexpectedPayload {
                protocol: self.protocol,
                expected: "json",
            }),
        }
    }

    /// Payload bytes, if the message carried raw bytes.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.data.as_bytes()
    }
}
