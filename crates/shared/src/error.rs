//! Shared error types.

use thiserror::Error;

/// Failure to encode or decode a realtime [`Message`](crate::Message).
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Inbound frame was not a valid message envelope.
    #[error("Malformed message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}
