//! Connection status, reconnect policy and the events a manager emits.

use std::sync::Arc;
use std::time::Duration;

use bidlink_shared::Message;

/// Connection status of the realtime channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Transport reported an error; the close that follows moves to `Disconnected`.
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionStatus::Connecting)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Retry after unintentional closes
    pub enabled: bool,
    /// Maximum number of consecutive retries
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any retry delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30000),
            backoff_multiplier: 2,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number (0-based, no jitter)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.saturating_pow(attempt);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether a retry may be scheduled after `attempts` consecutive retries.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        self.enabled && attempts < self.max_attempts
    }
}

/// Event types emitted by a [`RealtimeManager`](super::RealtimeManager)
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    StatusChanged(ConnectionStatus),
    /// Transport opened
    Connected,
    /// Transport closed without a caller-initiated disconnect
    Disconnected { code: Option<u16> },
    /// Transport error
    Error(String),
    /// Inbound message, in transport order
    Message(Message),
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// Retry budget spent; no further automatic attempts until `connect()`
    ReconnectExhausted { attempts: u32 },
}

pub(crate) type MessageCallback = Arc<dyn Fn(&Message) + Send + Sync>;
pub(crate) type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub(crate) type LifecycleCallback = Arc<dyn Fn() + Send + Sync>;
pub(crate) type CloseCallback = Arc<dyn Fn(Option<u16>) + Send + Sync>;

/// Caller-supplied hooks, invoked from the manager's tasks.
#[derive(Clone, Default)]
pub(crate) struct Callbacks {
    pub on_message: Option<MessageCallback>,
    pub on_connected: Option<LifecycleCallback>,
    pub on_disconnected: Option<CloseCallback>,
    pub on_error: Option<ErrorCallback>,
}
