//! Shared types for the bidlink realtime channel.
//!
//! Both ends of the `/ws` channel speak the same JSON envelope; this crate
//! holds the envelope, the recognized event types and their payload shapes.

pub mod error;
pub mod protocol;

pub use error::*;
pub use protocol::*;
