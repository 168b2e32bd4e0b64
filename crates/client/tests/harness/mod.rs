//! Test harness for driving a `RealtimeManager` without a network.
//!
//! `MockTransport` hands every opened socket to the test as a `MockSocket`,
//! which plays the server side: it reads what the client wrote and pushes
//! frames, errors or closes back.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bidlink_client::ws::{Frame, Transport, TransportPair};
use bidlink_client::{
    AuthContext, AuthSession, ConnectionStatus, Origin, RealtimeEvent, RealtimeManager,
    ReconnectConfig, TransportError,
};
use futures_channel::mpsc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc as tokio_mpsc};
use url::Url;

const WAIT: Duration = Duration::from_secs(120);

/// Server side of one opened mock socket.
pub struct MockSocket {
    pub url: Url,
    outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
}

impl MockSocket {
    /// Next frame written by the client, `None` once the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        tokio::time::timeout(WAIT, self.outbound.next())
            .await
            .expect("timed out waiting for client frame")
    }

    pub async fn recv_json(&mut self) -> serde_json::Value {
        let text = self.recv().await.expect("client closed the socket");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    pub fn push_text(&self, text: &str) {
        self.inbound
            .unbounded_send(Ok(Frame::Text(text.to_string())))
            .expect("client stream dropped");
    }

    pub fn close(&self, code: u16) {
        let _ = self.inbound.unbounded_send(Ok(Frame::Close(Some(code))));
    }

    pub fn fail(&self, reason: &str) {
        let _ = self
            .inbound
            .unbounded_send(Err(TransportError::Connect(reason.to_string())));
    }
}

#[derive(Default)]
struct MockState {
    opens: u32,
    refuse_all: bool,
    refuse_next: u32,
}

/// In-memory transport; clones share state.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    sockets: tokio_mpsc::UnboundedSender<MockSocket>,
}

impl MockTransport {
    pub fn new() -> (Self, tokio_mpsc::UnboundedReceiver<MockSocket>) {
        let (sockets, accepted) = tokio_mpsc::unbounded_channel();
        let transport = Self {
            state: Arc::new(Mutex::new(MockState::default())),
            sockets,
        };
        (transport, accepted)
    }

    pub fn refuse_all(&self, refuse: bool) {
        self.state.lock().unwrap().refuse_all = refuse;
    }

    pub fn refuse_next(&self, count: u32) {
        self.state.lock().unwrap().refuse_next = count;
    }

    /// Number of open attempts so far, successful or not.
    pub fn open_count(&self) -> u32 {
        self.state.lock().unwrap().opens
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, url: &Url) -> Result<TransportPair, TransportError> {
        let refuse = {
            let mut state = self.state.lock().unwrap();
            state.opens += 1;
            if state.refuse_next > 0 {
                state.refuse_next -= 1;
                true
            } else {
                state.refuse_all
            }
        };
        if refuse {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (out_tx, out_rx) = mpsc::unbounded::<String>();
        let (in_tx, in_rx) = mpsc::unbounded();
        let _ = self.sockets.send(MockSocket {
            url: url.clone(),
            outbound: out_rx,
            inbound: in_tx,
        });

        Ok(TransportPair {
            sink: Box::pin(out_tx.sink_map_err(|_| TransportError::Closed)),
            stream: Box::pin(in_rx),
        })
    }
}

pub struct Fixture {
    pub auth: AuthContext,
    pub transport: MockTransport,
    pub sockets: tokio_mpsc::UnboundedReceiver<MockSocket>,
}

impl Fixture {
    pub fn new() -> Self {
        let (transport, sockets) = MockTransport::new();
        Self {
            auth: AuthContext::new(Origin::new("market.test", true)),
            transport,
            sockets,
        }
    }

    /// Manager with auto-connect off and the default reconnect policy.
    pub fn manager(&self) -> RealtimeManager {
        self.manager_with(ReconnectConfig::default())
    }

    pub fn manager_with(&self, reconnect: ReconnectConfig) -> RealtimeManager {
        RealtimeManager::builder(self.auth.clone())
            .auto_connect(false)
            .reconnect(reconnect)
            .transport(self.transport.clone())
            .build()
            .unwrap()
    }

    pub fn login(&self) {
        self.auth.login(AuthSession::new("client-42"));
    }

    pub async fn next_socket(&mut self) -> MockSocket {
        tokio::time::timeout(WAIT, self.sockets.recv())
            .await
            .expect("timed out waiting for a socket")
            .expect("transport dropped")
    }

    /// Log in, connect, and return the server side once the manager is connected.
    pub async fn connected(&mut self, manager: &RealtimeManager) -> MockSocket {
        self.login();
        manager.connect();
        let socket = self.next_socket().await;
        wait_for_status(manager, ConnectionStatus::Connected).await;
        socket
    }
}

pub async fn wait_for_status(manager: &RealtimeManager, status: ConnectionStatus) {
    let mut rx = manager.status_watch();
    tokio::time::timeout(WAIT, rx.wait_for(|s| *s == status))
        .await
        .expect("timed out waiting for status")
        .expect("status channel closed");
}

/// Skip events until one matches.
pub async fn next_matching(
    events: &mut broadcast::Receiver<RealtimeEvent>,
    pred: impl Fn(&RealtimeEvent) -> bool,
) -> RealtimeEvent {
    loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if pred(&event) {
            return event;
        }
    }
}
