//! Downstream message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::extractor::ChatEvent;
use crate::types::RoomId;

/// Reply text for any request the bridge cannot act on
pub const PROCESSING_FAILED: &str = "processing failed";

/// Consumer → Bridge message
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to a room, replacing any current subscription
    Join {
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },
}

/// Bridge → Consumer message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Upstream session authenticated
    Connected { message: String },
    /// Upstream session ended
    Disconnected { message: String },
    /// Session attempt failed or request rejected
    Error { message: String },
    /// One chat message, fields inlined next to `type`
    Danmaku(ChatEvent),
}

impl ServerMessage {
    pub fn connected(room: impl std::fmt::Display) -> Self {
        ServerMessage::Connected {
            message: format!("connected to room {}", room),
        }
    }

    pub fn disconnected(room: impl std::fmt::Display) -> Self {
        ServerMessage::Disconnected {
            message: format!("connection to room {} closed", room),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

/// Convert AppError to ServerMessage for consumer notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        match err {
            AppError::InvalidRequest(_) | AppError::Json(_) => {
                ServerMessage::error(PROCESSING_FAILED)
            }
            // Fatal errors are not typically converted (connection closes)
            _ => ServerMessage::error("internal error"),
        }
    }
}
