//! Transport seam between the session state machine and the socket.
//!
//! The session only sees [`Connector`] and [`Transport`]; [`WsConnector`] is the real
//! WebSocket implementation. Tests substitute in-memory transports.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Close code the server sends when it refuses the credential.
pub const POLICY_VIOLATION: u16 = 1008;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),

    /// The peer closed with a status other than a normal shutdown.
    #[error("closed by peer with code {code}: {reason}")]
    Closed { code: u16, reason: String },
}

impl TransportError {
    /// The server refused the credential; reconnecting with it cannot succeed.
    pub fn is_credential_rejected(&self) -> bool {
        matches!(
            self,
            TransportError::Closed {
                code: POLICY_VIOLATION,
                ..
            }
        )
    }
}

/// An open, text-framed duplex connection.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Next text frame. `None` once the peer has closed the connection normally; a close with
    /// any other status comes back as [`TransportError::Closed`].
    ///
    /// Must be cancel-safe: the session races it against outbound commands.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    async fn close(&mut self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Box::new(WsTransport { stream }))
    }
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(Some(frame)))
                    if !matches!(frame.code, CloseCode::Normal | CloseCode::Away) =>
                {
                    return Some(Err(TransportError::Closed {
                        code: u16::from(frame.code),
                        reason: frame.reason.as_str().to_owned(),
                    }));
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "server closed connection");
                    return None;
                }
                // Pings are answered by tungstenite itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Ok(Message::Binary(_)) => {
                    tracing::debug!("ignoring binary frame");
                    continue;
                }
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "error while closing WebSocket");
        }
    }
}
