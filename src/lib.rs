//! Bidlink realtime connectivity.
//!
//! Re-exports the client connection manager and the wire protocol so
//! applications depend on a single crate.

pub use bidlink_client as client;
pub use bidlink_shared as shared;

pub use bidlink_client::{
    AuthContext, AuthSession, ClientConfig, ClientError, ConnectionStatus, Locale, Origin,
    RealtimeEvent, RealtimeManager, RealtimeManagerBuilder, ReconnectConfig,
};
pub use bidlink_shared::{ClientEvent, EventType, Message};
