//! Transport seam between the protocol core and the WebSocket.
//!
//! Outbound traffic goes through a [`PeerHandle`]: a cheap clonable sender feeding a writer
//! task that owns the socket's sink half. Enqueueing never waits on the network, so
//! handles may be used while the registry lock is held. Inbound traffic is read through
//! [`Inbound`], implemented for the socket's stream half.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

pub type ConnectionId = u64;

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),
}

/// Frame queued for the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Ping,
    Close { code: u16, reason: String },
}

#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: ConnectionId,
    remote_addr: SocketAddr,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl PeerHandle {
    pub fn channel(
        id: ConnectionId,
        remote_addr: SocketAddr,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, remote_addr, tx }, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.push(Outbound::Text(text.into()))
    }

    pub fn ping(&self) -> Result<(), TransportError> {
        self.push(Outbound::Ping)
    }

    /// Queues a close frame. The writer stops after sending it, so later sends fail.
    pub fn close(&self, code: u16, reason: impl Into<String>) -> Result<(), TransportError> {
        self.push(Outbound::Close {
            code,
            reason: reason.into(),
        })
    }

    fn push(&self, frame: Outbound) -> Result<(), TransportError> {
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }
}

/// Receiving half of a peer connection.
///
/// `recv` must be cancel safe: the keepalive watchdog drops it on every timeout.
pub trait Inbound: Send {
    /// Next text message, or an error once the peer is gone.
    fn recv(&mut self) -> impl Future<Output = Result<String, TransportError>> + Send;
}

pub struct WsInbound {
    stream: SplitStream<WebSocket>,
}

impl WsInbound {
    pub fn new(stream: SplitStream<WebSocket>) -> Self {
        Self { stream }
    }
}

impl Inbound for WsInbound {
    async fn recv(&mut self) -> Result<String, TransportError> {
        loop {
            match self.stream.next().await {
                None | Some(Ok(Message::Close(_))) => return Err(TransportError::Closed),
                Some(Err(err)) => return Err(err.into()),
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => return Ok(text),
                    Err(err) => {
                        debug!(len = err.as_bytes().len(), "Ignoring non UTF-8 binary frame");
                    }
                },
                // Answered by the websocket layer itself.
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            }
        }
    }
}

/// Drains queued frames into the socket until a close frame is written, the socket
/// fails, or every handle has been dropped.
pub async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut frames: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(frame) = frames.recv().await {
        let (message, last) = match frame {
            Outbound::Text(text) => (Message::Text(text), false),
            Outbound::Ping => (Message::Ping(Vec::new()), false),
            Outbound::Close { code, reason } => (
                Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                })),
                true,
            ),
        };
        if let Err(err) = sink.send(message).await {
            debug!(error = %err, "Dropping outbound frames for broken socket");
            return;
        }
        if last {
            return;
        }
    }
    let _ = sink.close().await;
}
