//! The relayed unit: one JSON object or array.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::MessageError;

/// One JSON-RPC payload, relayed without interpretation.
///
/// Always a JSON object or array; construction rejects scalars.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Message(Value);

impl Message {
    /// Parse a message from UTF-8 JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::try_from(value)
    }

    /// Parse a message from a JSON string.
    pub fn parse(text: &str) -> Result<Self, MessageError> {
        Self::from_slice(text.as_bytes())
    }

    /// Compact JSON serialization.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    /// Compact JSON serialization as bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.0)
    }

    /// Borrow the underlying JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Single-line rendering truncated to `max_chars` characters, for logs.
    pub fn preview(&self, max_chars: usize) -> String {
        let full = self.0.to_string();
        match full.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &full[..cut]),
            None => full,
        }
    }
}

impl TryFrom<Value> for Message {
    type Error = MessageError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(_) | Value::Array(_) => Ok(Self(value)),
            Value::Null => Err(MessageError::NotAContainer("null")),
            Value::Bool(_) => Err(MessageError::NotAContainer("boolean")),
            Value::Number(_) => Err(MessageError::NotAContainer("number")),
            Value::String(_) => Err(MessageError::NotAContainer("string")),
        }
    }
}

impl From<Message> for Value {
    fn from(message: Message) -> Self {
        message.0
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
