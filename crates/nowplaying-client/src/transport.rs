//! Connection seam between the live-status driver and the wire.
//!
//! The driver only sees [`Connector`] / [`Connection`]; [`WsConnector`] is the
//! production implementation on top of `tokio-tungstenite`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

/// One inbound unit from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Remote close handshake.
    Close,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("connect to {url} timed out after {timeout:?}")]
    ConnectTimeout { url: String, timeout: Duration },

    #[error("connection closed")]
    Closed,
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, TransportError>;
}

#[async_trait]
pub trait Connection: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Next inbound frame.  `None` once the connection is gone.
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Best-effort close; never fails.
    async fn close(&mut self);
}

// ── websocket ────────────────────────────────────────────────────────────────

pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, TransportError> {
        debug!("[ws] connecting to {}", url);
        let (stream, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| TransportError::ConnectTimeout {
                    url: url.to_string(),
                    timeout: self.connect_timeout,
                })??;
        Ok(Box::new(WsConnection(stream)))
    }
}

pub struct WsConnection(WebSocketStream<MaybeTlsStream<TcpStream>>);

#[async_trait]
impl Connection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.0.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            let msg = match self.0.next().await? {
                Ok(msg) => msg,
                Err(tungstenite::Error::ConnectionClosed) => return None,
                Err(e) => return Some(Err(e.into())),
            };
            return Some(Ok(match msg {
                Message::Text(text) => Frame::Text(text),
                Message::Binary(bytes) => Frame::Binary(bytes),
                Message::Close(frame) => {
                    debug!("[ws] close frame: {:?}", frame);
                    Frame::Close
                }
                // Ping/Pong message behaviour is internally handled by tungstenite.
                other => {
                    trace!("[ws] control frame: {:?}", other);
                    continue;
                }
            }));
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.0.close(None).await {
            trace!("[ws] close: {}", e);
        }
    }
}

// ── in-memory transport for driver tests ─────────────────────────────────────
