//! Bidlink realtime client
//!
//! Keeps one WebSocket per authenticated marketplace session and exposes a
//! small typed API for conversation events (join/leave, typing indicators,
//! read receipts).

pub mod auth_session;
pub mod config;
pub mod error;
pub mod storage;
pub mod ws;

pub use auth_session::{AuthContext, AuthSession, Locale, Origin};
pub use config::ClientConfig;
pub use error::{ClientError, ConfigError, TransportError};
pub use ws::{ConnectionStatus, RealtimeEvent, RealtimeManager, RealtimeManagerBuilder, ReconnectConfig};
