//! Error types for message parsing and stream framing.

/// A single message could not be turned into a [`Message`](crate::Message).
///
/// Always local to one message: the caller drops it and carries on.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The payload is valid JSON but neither an object nor an array.
    #[error("expected a JSON object or array, got {0}")]
    NotAContainer(&'static str),
}

/// The framed byte stream is broken.
///
/// Fatal for the stream it occurred on: no further frames can be trusted.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    /// The `Content-Length` value is not an unsigned decimal.
    #[error("invalid Content-Length value: {0:?}")]
    InvalidLength(String),

    /// The stream ended before the declared body was complete.
    #[error("stream ended after {received} of {expected} body bytes")]
    Truncated {
        /// Declared body length.
        expected: usize,
        /// Bytes actually available when the stream ended.
        received: usize,
    },

    /// A message could not be serialized for writing.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
