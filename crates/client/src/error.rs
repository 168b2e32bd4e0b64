//! Client error types.

use thiserror::Error;

/// Errors raised by a realtime transport while opening or using a socket.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    /// WebSocket protocol error (handshake failed, invalid frame, etc.)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Transport closed")]
    Closed,
}

/// Invalid value in the client configuration.
#[derive(Debug, Error)]
#[error("Invalid value {value:?} for {key}: {reason}")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

/// Errors returned while setting up the client.
///
/// The connection manager itself never returns these from `connect`,
/// `disconnect` or `send`; failures there surface as status changes and events.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("No Tokio runtime available to drive the realtime connection")]
    NoRuntime,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid origin {origin:?}: {reason}")]
    InvalidOrigin { origin: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
