//! Transport seam between the manager and the actual socket.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::future::ready;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use url::Url;

use crate::error::TransportError;

/// Inbound frame as seen by the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// Peer sent a close frame, with its status code if any
    Close(Option<u16>),
}

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// Write and read halves of an open transport.
pub struct TransportPair {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens bidirectional text transports to the realtime endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Resolves once the transport is open, or with the reason it could not be.
    async fn open(&self, url: &Url) -> Result<TransportPair, TransportError>;
}

/// WebSocket transport using tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn open(&self, url: &Url) -> Result<TransportPair, TransportError> {
        let (ws_stream, _response) = connect_async(url.as_str()).await?;
        let (write, read) = ws_stream.split();

        let sink = write.with(|text: String| ready(Ok::<_, TransportError>(WsMessage::Text(text.into()))));
        let stream = read.filter_map(|msg| {
            ready(match msg {
                Ok(WsMessage::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Ok(WsMessage::Close(frame)) => Some(Ok(Frame::Close(frame.map(|f| u16::from(f.code))))),
                // Pong is handled automatically by tungstenite; binary is not part of the protocol
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::from(e))),
            })
        });

        Ok(TransportPair {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}
