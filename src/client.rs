//! Client struct definition
//!
//! Represents a connected downstream consumer and its outbound channel.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::ClientId;

/// Connected consumer
///
/// Holds the consumer's unique ID and the channel its handler drains
/// into the WebSocket. Live sessions write into a clone of the same channel.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this consumer
    pub id: ClientId,
    /// Bridge → Consumer message channel
    pub sender: mpsc::Sender<ServerMessage>,
}

impl Client {
    /// Create a new client with the given ID and sender channel
    pub fn new(id: ClientId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self { id, sender }
    }

    /// Send a message to this client without waiting
    ///
    /// Returns an error if the channel is closed (client disconnected)
    /// or the consumer has fallen behind.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Whether the consumer's handler is still draining the channel
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Channel handle for a session reporting to this client
    pub fn channel(&self) -> mpsc::Sender<ServerMessage> {
        self.sender.clone()
    }
}
