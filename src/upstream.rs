//! Upstream socket transport
//!
//! A connected upstream socket is exposed to the session as a pair of
//! channels (`UpstreamLink`): raw frames go out through `outbound`, socket
//! events come back through `inbound`. `WsConnector` backs the link with a
//! tokio-tungstenite client and two pump tasks.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::error::SessionError;

/// Buffered outbound frames per link
const OUTBOUND_BUFFER_SIZE: usize = 32;

/// Buffered inbound socket events per link
const INBOUND_BUFFER_SIZE: usize = 256;

/// Something that happened on the upstream socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// A binary message (one or more frames)
    Binary(Vec<u8>),
    /// Socket-level failure; the link is dead afterwards
    Error(String),
    /// Orderly close, with the peer's reason if any
    Closed(Option<String>),
}

/// Channel view of one open upstream socket
///
/// Dropping the link closes the socket.
#[derive(Debug)]
pub struct UpstreamLink {
    pub outbound: mpsc::Sender<Vec<u8>>,
    pub inbound: mpsc::Receiver<UpstreamEvent>,
}

impl UpstreamLink {
    pub fn new(outbound: mpsc::Sender<Vec<u8>>, inbound: mpsc::Receiver<UpstreamEvent>) -> Self {
        Self { outbound, inbound }
    }

    /// Queue a frame for the socket
    pub async fn send(&self, frame: Vec<u8>) -> Result<(), SessionError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| SessionError::Transport("upstream writer closed".to_string()))
    }

    /// Queue a frame without waiting for buffer space
    pub fn try_send(&self, frame: Vec<u8>) -> Result<(), SessionError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                SessionError::Transport("upstream writer backed up".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                SessionError::Transport("upstream writer closed".to_string())
            }
        })
    }
}

/// Opens upstream sockets
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(&self) -> Result<UpstreamLink, SessionError>;
}

/// tokio-tungstenite connector with browser-like negotiation headers
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    user_agent: String,
    origin: String,
    handshake_timeout: Duration,
}

impl WsConnector {
    pub fn new(
        url: impl Into<String>,
        user_agent: impl Into<String>,
        origin: impl Into<String>,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            user_agent: user_agent.into(),
            origin: origin.into(),
            handshake_timeout,
        }
    }
}

#[async_trait]
impl UpstreamConnector for WsConnector {
    async fn connect(&self) -> Result<UpstreamLink, SessionError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| SessionError::Handshake(e.to_string()))?;

        let headers = request.headers_mut();
        headers.insert(header::USER_AGENT, header_value(&self.user_agent)?);
        headers.insert(header::ORIGIN, header_value(&self.origin)?);

        debug!(url = %self.url, "connecting upstream");
        let handshake = tokio_tungstenite::connect_async(request);
        let (ws, response) = match tokio::time::timeout(self.handshake_timeout, handshake).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(SessionError::Handshake(e.to_string())),
            Err(_) => {
                return Err(SessionError::Handshake(format!(
                    "timed out after {}ms",
                    self.handshake_timeout.as_millis()
                )))
            }
        };

        info!(url = %self.url, status = %response.status(), "upstream socket open");
        Ok(spawn_pumps(ws))
    }
}

fn header_value(value: &str) -> Result<HeaderValue, SessionError> {
    HeaderValue::from_str(value)
        .map_err(|e| SessionError::Handshake(format!("bad header value: {}", e)))
}

/// Split a socket into reader/writer pump tasks joined by channels
pub fn spawn_pumps<S>(ws: WebSocketStream<S>) -> UpstreamLink
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_sender, mut ws_receiver) = ws.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_BUFFER_SIZE);
    let (in_tx, in_rx) = mpsc::channel::<UpstreamEvent>(INBOUND_BUFFER_SIZE);

    // Read pump (socket -> session)
    tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            let event = match msg_result {
                Ok(Message::Binary(data)) => UpstreamEvent::Binary(data.into()),
                Ok(Message::Close(frame)) => {
                    let reason = frame.map(|f| f.reason.to_string()).filter(|r| !r.is_empty());
                    let _ = in_tx.send(UpstreamEvent::Closed(reason)).await;
                    debug!("upstream sent close frame");
                    return;
                }
                Ok(Message::Text(text)) => {
                    debug!(len = text.len(), "ignoring upstream text message");
                    continue;
                }
                Ok(_) => {
                    // Ping/Pong handled by tungstenite
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "upstream socket error");
                    let _ = in_tx.send(UpstreamEvent::Error(e.to_string())).await;
                    return;
                }
            };

            if in_tx.send(event).await.is_err() {
                debug!("session gone, ending upstream read pump");
                return;
            }
        }
        let _ = in_tx.send(UpstreamEvent::Closed(None)).await;
        debug!("upstream read pump ended");
    });

    // Write pump (session -> socket)
    tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if let Err(e) = ws_sender.send(Message::Binary(frame.into())).await {
                warn!(error = %e, "upstream send failed, ending write pump");
                break;
            }
        }
        debug!("upstream write pump ended");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    UpstreamLink::new(out_tx, in_rx)
}
