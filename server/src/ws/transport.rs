//! Frame transport abstraction between the connection core and the
//! WebSocket layer.
//!
//! The registry and the connection actor only ever see these traits, so the
//! core is testable against in-memory transports. Read and write deadlines
//! are enforced by the callers with `tokio::time::timeout`; implementations
//! only move frames.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;

/// A single frame on the wire. Ping/pong are frame kinds at this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("transport error: {0}")]
    Protocol(String),
}

/// A bidirectional transport handed to the registry at registration time.
pub trait Transport: Send + 'static {
    fn remote_address(&self) -> String;

    /// Split into the halves owned by the read loop and the write loop.
    fn split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>);
}

#[async_trait]
pub trait TransportReader: Send {
    /// Next inbound frame. `Ok(None)` means the peer ended the stream.
    async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError>;
}

#[async_trait]
pub trait TransportWriter: Send {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// `Transport` over an upgraded axum WebSocket.
pub struct WsTransport {
    socket: WebSocket,
    remote: String,
}

impl WsTransport {
    pub fn new(socket: WebSocket, remote: String) -> Self {
        Self { socket, remote }
    }
}

impl Transport for WsTransport {
    fn remote_address(&self) -> String {
        self.remote.clone()
    }

    fn split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>) {
        let (sink, stream) = self.socket.split();
        (Box::new(WsReader(stream)), Box::new(WsWriter(sink)))
    }
}

struct WsReader(SplitStream<WebSocket>);

#[async_trait]
impl TransportReader for WsReader {
    async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        match self.0.next().await {
            None => Ok(None),
            Some(Err(e)) => Err(TransportError::Protocol(e.to_string())),
            Some(Ok(msg)) => Ok(Some(match msg {
                Message::Text(text) => Frame::Text(text.to_string()),
                // Binary input is tolerated and treated as text content.
                Message::Binary(data) => Frame::Text(String::from_utf8_lossy(&data).into_owned()),
                Message::Ping(data) => Frame::Ping(data.to_vec()),
                Message::Pong(data) => Frame::Pong(data.to_vec()),
                Message::Close(_) => Frame::Close,
            })),
        }
    }
}

struct WsWriter(SplitSink<WebSocket, Message>);

#[async_trait]
impl TransportWriter for WsWriter {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        let msg = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Ping(data) => Message::Ping(data.into()),
            Frame::Pong(data) => Message::Pong(data.into()),
            Frame::Close => Message::Close(Some(CloseFrame {
                code: 1000,
                reason: "".into(),
            })),
        };
        self.0
            .send(msg)
            .await
            .map_err(|e| TransportError::Protocol(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0
            .close()
            .await
            .map_err(|e| TransportError::Protocol(e.to_string()))
    }
}
