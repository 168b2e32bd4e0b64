//! Realtime connection manager for the authenticated session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bidlink_shared::{ClientEvent, EventType, Message};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use super::connection::{Callbacks, ConnectionStatus, RealtimeEvent, ReconnectConfig};
use super::transport::{Frame, Transport, TransportPair, TungsteniteTransport};
use crate::auth_session::AuthContext;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Close code used when the transport dropped without a close handshake.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code sent on a caller-initiated disconnect.
pub const NORMAL_CLOSURE: u16 = 1000;

const EVENT_CAPACITY: usize = 256;

enum Outbound {
    Text(String),
    Close,
}

/// Mutable connection state, guarded by one lock.
struct ConnectionState {
    status: ConnectionStatus,
    /// Bumped on every connect and disconnect. Transport events carrying an
    /// older generation belong to a superseded socket and are ignored.
    generation: u64,
    /// Writer of the live transport; `Some` only while connected.
    socket: Option<mpsc::UnboundedSender<Outbound>>,
    task: Option<JoinHandle<()>>,
    reconnect_attempts: u32,
    reconnect_timer: Option<JoinHandle<()>>,
}

struct Shared {
    auth: AuthContext,
    ws_path: String,
    auto_connect: bool,
    reconnect: ReconnectConfig,
    transport: Arc<dyn Transport>,
    runtime: Handle,
    callbacks: Callbacks,
    state: Mutex<ConnectionState>,
    status_tx: watch::Sender<ConnectionStatus>,
    events_tx: broadcast::Sender<RealtimeEvent>,
    session_task: Mutex<Option<JoinHandle<()>>>,
}

/// Builder for [`RealtimeManager`]
pub struct RealtimeManagerBuilder {
    auth: AuthContext,
    ws_path: String,
    auto_connect: bool,
    reconnect: ReconnectConfig,
    transport: Arc<dyn Transport>,
    callbacks: Callbacks,
}

impl RealtimeManagerBuilder {
    pub fn new(auth: AuthContext) -> Self {
        Self::from_config(auth, &ClientConfig::default())
    }

    pub fn from_config(auth: AuthContext, config: &ClientConfig) -> Self {
        Self {
            auth,
            ws_path: config.ws_path.clone(),
            auto_connect: config.auto_connect,
            reconnect: config.reconnect.clone(),
            transport: Arc::new(TungsteniteTransport),
            callbacks: Callbacks::default(),
        }
    }

    pub fn ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    /// Connect on login and disconnect on logout.
    pub fn auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    pub fn reconnect(mut self, config: ReconnectConfig) -> Self {
        self.reconnect = config;
        self
    }

    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Called once per inbound message, in transport order.
    pub fn on_message(mut self, f: impl Fn(&Message) + Send + Sync + 'static) -> Self {
        self.callbacks.on_message = Some(Arc::new(f));
        self
    }

    pub fn on_connected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.callbacks.on_connected = Some(Arc::new(f));
        self
    }

    /// Called when the transport closes without a caller-initiated disconnect.
    pub fn on_disconnected(mut self, f: impl Fn(Option<u16>) + Send + Sync + 'static) -> Self {
        self.callbacks.on_disconnected = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.callbacks.on_error = Some(Arc::new(f));
        self
    }

    /// Build the manager on the current Tokio runtime.
    ///
    /// The manager follows the auth session right away: it always disconnects
    /// on logout, and connects on login only with auto-connect enabled.
    pub fn build(self) -> Result<RealtimeManager> {
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let shared = Arc::new(Shared {
            auth: self.auth,
            ws_path: self.ws_path,
            auto_connect: self.auto_connect,
            reconnect: self.reconnect,
            transport: self.transport,
            runtime,
            callbacks: self.callbacks,
            state: Mutex::new(ConnectionState {
                status: ConnectionStatus::Disconnected,
                generation: 0,
                socket: None,
                task: None,
                reconnect_attempts: 0,
                reconnect_timer: None,
            }),
            status_tx,
            events_tx,
            session_task: Mutex::new(None),
        });
        let manager = RealtimeManager {
            owner: Arc::new(Owner { shared }),
        };
        manager.bind_session();

        Ok(manager)
    }
}

/// Handle to the session's realtime connection. Clones share one connection,
/// which is shut down when the last clone is dropped.
#[derive(Clone)]
pub struct RealtimeManager {
    owner: Arc<Owner>,
}

/// Held only by handles. Connection tasks hold `Shared` directly, so
/// teardown hangs off this instead.
struct Owner {
    shared: Arc<Shared>,
}

impl Drop for Owner {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl RealtimeManager {
    pub fn builder(auth: AuthContext) -> RealtimeManagerBuilder {
        RealtimeManagerBuilder::new(auth)
    }

    /// Open the realtime channel.
    ///
    /// Returns immediately; the outcome arrives as status changes and events.
    /// Does nothing while connecting or connected, or when no user is signed in.
    pub fn connect(&self) {
        self.owner.shared.connect();
    }

    /// Close the channel and cancel any pending reconnect. Idempotent.
    pub fn disconnect(&self) {
        self.owner.shared.disconnect();
    }

    /// Send a message of `event_type` with the current timestamp.
    ///
    /// Returns `true` if the frame was handed to the open transport. Sends
    /// while not connected are rejected, never queued.
    pub fn send(&self, event_type: impl Into<EventType>, payload: Value) -> bool {
        self.owner.shared.send(Message::new(event_type, payload))
    }

    pub fn send_event(&self, event: &ClientEvent) -> bool {
        self.owner.shared.send(Message::from_event(event))
    }

    pub fn join_conversation(&self, conversation_id: &str) -> bool {
        self.send_event(&ClientEvent::JoinConversation {
            conversation_id: conversation_id.to_string(),
        })
    }

    pub fn leave_conversation(&self, conversation_id: &str) -> bool {
        self.send_event(&ClientEvent::LeaveConversation {
            conversation_id: conversation_id.to_string(),
        })
    }

    pub fn start_typing(&self, conversation_id: &str) -> bool {
        self.send_event(&ClientEvent::TypingStart {
            conversation_id: conversation_id.to_string(),
        })
    }

    pub fn stop_typing(&self, conversation_id: &str) -> bool {
        self.send_event(&ClientEvent::TypingStop {
            conversation_id: conversation_id.to_string(),
        })
    }

    pub fn mark_as_read(&self, conversation_id: &str, message_id: &str) -> bool {
        self.send_event(&ClientEvent::MarkRead {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connection_status().is_connected()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.owner.shared.state().status
    }

    /// Consecutive automatic retries since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.owner.shared.state().reconnect_attempts
    }

    /// Watch the connection status.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.owner.shared.status_tx.subscribe()
    }

    /// Subscribe to lifecycle events and inbound messages.
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.owner.shared.events_tx.subscribe()
    }

    pub fn auth(&self) -> &AuthContext {
        &self.owner.shared.auth
    }

    /// Follow the auth session: disconnect when the user signs out or a
    /// different user takes over, and connect for the signed-in user when
    /// auto-connect is on.
    fn bind_session(&self) {
        let mut session_rx = self.owner.shared.auth.subscribe();
        let weak: Weak<Shared> = Arc::downgrade(&self.owner.shared);

        let task = self.owner.shared.runtime.spawn(async move {
            let mut last_user_id: Option<String> = None;
            loop {
                let user_id = session_rx
                    .borrow_and_update()
                    .as_ref()
                    .map(|s| s.user_id.clone());
                let Some(shared) = weak.upgrade() else {
                    break;
                };

                if last_user_id.is_some() && user_id != last_user_id {
                    tracing::info!("session changed, dropping realtime connection");
                    shared.disconnect();
                }
                if user_id.is_some() && shared.auto_connect {
                    shared.connect();
                }
                last_user_id = user_id;
                drop(shared);

                if session_rx.changed().await.is_err() {
                    break;
                }
            }
        });

        let mut slot = self
            .owner
            .shared
            .session_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    /// Stop following the session and close the channel.
    pub fn shutdown(&self) {
        self.owner.shared.shutdown();
    }
}

impl std::fmt::Debug for RealtimeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.owner.shared.state();
        f.debug_struct("RealtimeManager")
            .field("status", &state.status)
            .field("reconnect_attempts", &state.reconnect_attempts)
            .field("handles", &Arc::strong_count(&self.owner))
            .finish()
    }
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: RealtimeEvent) {
        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }

    fn set_status(&self, state: &mut ConnectionState, status: ConnectionStatus) {
        if state.status == status {
            return;
        }
        state.status = status;
        self.status_tx.send_replace(status);
        self.emit(RealtimeEvent::StatusChanged(status));
    }

    fn connect(self: &Arc<Self>) {
        let mut state = self.state();
        if matches!(
            state.status,
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        ) {
            tracing::debug!(status = %state.status, "connect ignored");
            return;
        }

        let Some(session) = self.auth.current() else {
            tracing::warn!("realtime connect skipped: no authenticated user");
            return;
        };

        let url = match self.auth.origin().ws_url(&self.ws_path) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "cannot derive realtime endpoint");
                return;
            }
        };

        if let Some(timer) = state.reconnect_timer.take() {
            timer.abort();
        }
        // A transport that reported an error may not have closed yet
        Self::close_transport(&mut state);
        state.generation += 1;
        let generation = state.generation;
        self.set_status(&mut state, ConnectionStatus::Connecting);

        tracing::info!(
            user_id = %session.user_id,
            %url,
            attempt = state.reconnect_attempts,
            "connecting realtime channel"
        );

        let span = tracing::info_span!("realtime", conn_id = %Uuid::new_v4());
        let task = self
            .runtime
            .spawn(run_connection(Arc::clone(self), generation, url).instrument(span));
        state.task = Some(task);
    }

    fn disconnect(&self) {
        let mut state = self.state();
        state.generation += 1;

        if let Some(timer) = state.reconnect_timer.take() {
            timer.abort();
        }

        Self::close_transport(&mut state);

        if state.status != ConnectionStatus::Disconnected {
            tracing::info!("realtime channel disconnected");
        }
        self.set_status(&mut state, ConnectionStatus::Disconnected);
    }

    fn shutdown(&self) {
        let task = self
            .session_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
        self.disconnect();
    }

    /// Release the current transport, if any. Callers bump the generation so
    /// its late events are ignored.
    fn close_transport(state: &mut ConnectionState) {
        if let Some(socket) = state.socket.take() {
            // The connection task sends the close frame and exits on its own
            let _ = socket.send(Outbound::Close);
            state.task = None;
        } else if let Some(task) = state.task.take() {
            task.abort();
        }
    }

    fn send(&self, message: Message) -> bool {
        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize realtime message");
                return false;
            }
        };

        let state = self.state();
        let socket = match state.socket.as_ref() {
            Some(socket) if state.status.is_connected() => socket,
            _ => {
                tracing::warn!(
                    event_type = %message.event_type(),
                    status = %state.status,
                    "send rejected: realtime channel not connected"
                );
                return false;
            }
        };

        match socket.send(Outbound::Text(json)) {
            Ok(()) => {
                tracing::debug!(event_type = %message.event_type(), "message sent");
                true
            }
            Err(_) => {
                tracing::warn!(event_type = %message.event_type(), "send failed: transport gone");
                false
            }
        }
    }

    /// Returns `false` if the transport was superseded while opening.
    fn handle_open(&self, generation: u64, socket: mpsc::UnboundedSender<Outbound>) -> bool {
        {
            let mut state = self.state();
            if state.generation != generation {
                return false;
            }
            state.socket = Some(socket);
            state.reconnect_attempts = 0;
            if let Some(timer) = state.reconnect_timer.take() {
                timer.abort();
            }
            self.set_status(&mut state, ConnectionStatus::Connected);
            self.emit(RealtimeEvent::Connected);
        }

        tracing::info!("realtime channel connected");
        if let Some(on_connected) = &self.callbacks.on_connected {
            on_connected();
        }
        true
    }

    fn handle_text(&self, generation: u64, text: &str) {
        if self.state().generation != generation {
            return;
        }

        match Message::from_json(text) {
            Ok(message) => {
                tracing::debug!(event_type = %message.event_type(), "message received");
                self.emit(RealtimeEvent::Message(message.clone()));
                if let Some(on_message) = &self.callbacks.on_message {
                    on_message(&message);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed realtime frame");
            }
        }
    }

    fn handle_error(&self, generation: u64, reason: &str) {
        {
            let mut state = self.state();
            if state.generation != generation {
                return;
            }
            self.set_status(&mut state, ConnectionStatus::Error);
            self.emit(RealtimeEvent::Error(reason.to_string()));
        }

        tracing::error!(error = %reason, "realtime transport error");
        if let Some(on_error) = &self.callbacks.on_error {
            on_error(reason);
        }
    }

    fn handle_close(self: &Arc<Self>, generation: u64, code: Option<u16>) {
        let follow_up = {
            let mut state = self.state();
            if state.generation != generation {
                tracing::debug!("ignoring close of superseded transport");
                return;
            }
            state.socket = None;
            state.task = None;
            self.set_status(&mut state, ConnectionStatus::Disconnected);
            self.emit(RealtimeEvent::Disconnected { code });

            let follow_up = self.schedule_reconnect(&mut state);
            if let Some(event) = &follow_up {
                self.emit(event.clone());
            }
            follow_up
        };

        match follow_up {
            Some(RealtimeEvent::ReconnectScheduled { attempt, delay }) => tracing::info!(
                ?code,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "realtime channel closed, reconnect scheduled"
            ),
            Some(RealtimeEvent::ReconnectExhausted { attempts }) => tracing::warn!(
                ?code,
                attempts,
                "realtime channel closed, reconnect attempts exhausted"
            ),
            _ => tracing::info!(?code, "realtime channel closed"),
        }

        if let Some(on_disconnected) = &self.callbacks.on_disconnected {
            on_disconnected(code);
        }
    }

    /// Arm the single reconnect timer if the retry budget allows it.
    fn schedule_reconnect(self: &Arc<Self>, state: &mut ConnectionState) -> Option<RealtimeEvent> {
        if let Some(timer) = state.reconnect_timer.take() {
            timer.abort();
        }

        let attempts = state.reconnect_attempts;
        if !self.reconnect.allows_retry(attempts) {
            return self
                .reconnect
                .enabled
                .then_some(RealtimeEvent::ReconnectExhausted { attempts });
        }

        let delay = self.reconnect.delay_for_attempt(attempts);
        let generation = state.generation;
        let shared = Arc::clone(self);
        state.reconnect_timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            shared.fire_reconnect(generation);
        }));

        Some(RealtimeEvent::ReconnectScheduled {
            attempt: attempts + 1,
            delay,
        })
    }

    fn fire_reconnect(self: &Arc<Self>, generation: u64) {
        {
            let mut state = self.state();
            if state.generation != generation {
                return;
            }
            state.reconnect_timer = None;
            state.reconnect_attempts += 1;
        }
        self.connect();
    }
}

/// Drive one transport from open to close.
async fn run_connection(shared: Arc<Shared>, generation: u64, url: Url) {
    let TransportPair {
        mut sink,
        mut stream,
    } = match shared.transport.open(&url).await {
        Ok(pair) => pair,
        Err(e) => {
            shared.handle_error(generation, &e.to_string());
            shared.handle_close(generation, Some(ABNORMAL_CLOSURE));
            return;
        }
    };

    let (socket_tx, mut socket_rx) = mpsc::unbounded_channel();
    if !shared.handle_open(generation, socket_tx) {
        let _ = sink.close().await;
        return;
    }

    let code = loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Frame::Text(text))) => shared.handle_text(generation, &text),
                Some(Ok(Frame::Close(code))) => break code,
                Some(Err(e)) => {
                    shared.handle_error(generation, &e.to_string());
                    break Some(ABNORMAL_CLOSURE);
                }
                None => break Some(ABNORMAL_CLOSURE),
            },
            outbound = socket_rx.recv() => match outbound {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(text).await {
                        shared.handle_error(generation, &e.to_string());
                        break Some(ABNORMAL_CLOSURE);
                    }
                }
                Some(Outbound::Close) | None => {
                    if let Err(e) = sink.close().await {
                        tracing::debug!(error = %e, "close handshake failed");
                    }
                    break Some(NORMAL_CLOSURE);
                }
            },
        }
    };

    shared.handle_close(generation, code);
}
