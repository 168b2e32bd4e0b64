//! Realtime channel for the marketplace messaging features.
//!
//! This module provides:
//! - One managed WebSocket per authenticated session
//! - Auto-reconnect with capped exponential backoff
//! - Typed helpers for conversation events (join/leave, typing, read receipts)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  login/logout   ┌─────────────────────┐
//! │ AuthContext  │ ──────────────► │   RealtimeManager   │
//! └──────────────┘                 │ status · attempts · │
//!                                  │ reconnect timer     │
//!                                  └─────────────────────┘
//!                                     │ open        ▲ frames
//!                                     ▼             │
//!                                  ┌─────────────────────┐
//!                                  │   dyn Transport     │
//!                                  │ (tokio-tungstenite) │
//!                                  └─────────────────────┘
//! ```
//!
//! Consumers observe the manager through `status_watch()`, `subscribe()` or
//! the callbacks registered on the builder; they never touch the socket.
//!
//! ```rust,ignore
//! let auth = AuthContext::new(Origin::parse("https://market.example.com")?);
//! let manager = RealtimeManager::builder(auth.clone())
//!     .on_message(|msg| println!("{} {}", msg.event_type(), msg.payload()))
//!     .build()?;
//!
//! auth.login(AuthSession::new("client-42")); // auto-connect fires
//! manager.join_conversation("project-981");
//! ```

mod connection;
mod manager;
mod transport;

pub use connection::{ConnectionStatus, RealtimeEvent, ReconnectConfig};
pub use manager::{RealtimeManager, RealtimeManagerBuilder, ABNORMAL_CLOSURE, NORMAL_CLOSURE};
pub use transport::{Frame, FrameSink, FrameStream, Transport, TransportPair, TungsteniteTransport};
