//! Error types for the danmaku bridge
//!
//! One enum per concern: frame codec, room resolution, chat extraction,
//! upstream session attempts, and process/downstream errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers fatal errors on the downstream side (connection termination),
/// configuration problems, and rejected downstream requests.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Invalid configuration value
    #[error("Invalid config: {0}")]
    Config(String),

    /// Downstream request could not be processed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Frame decoding errors
///
/// Always frame-local: the decoder logs them and moves on.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Header invariant violated or buffer too short
    #[error("decode error: {0}")]
    Decode(String),

    /// protover 3 body is not a valid zlib stream
    #[error("decompression error: {0}")]
    Decompression(#[source] std::io::Error),
}

/// Room id lookup failures
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The lookup service answered with a non-zero code
    #[error("{message}")]
    Rejected { code: i64, message: String },

    /// The lookup request never got a usable answer
    #[error("room lookup failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Success envelope without a room id
    #[error("malformed room info: {0}")]
    Malformed(String),
}

/// Chat payload extraction failures (treated as "skip")
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("payload is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("chat payload has no info field")]
    MissingInfo,

    #[error("chat payload info is not an array")]
    NotAnArray,
}

/// Failures that abort one upstream session attempt
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Upgrade refused, connect failed, or handshake timed out
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Socket-level failure after the connection was open
    #[error("transport error: {0}")]
    Transport(String),
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The consumer is not keeping up with its channel
    #[error("Channel full")]
    ChannelFull,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_resolution_shows_service_message() {
        let err = ResolutionError::Rejected {
            code: 60004,
            message: "room does not exist".to_string(),
        };
        assert_eq!(err.to_string(), "room does not exist");
    }

    #[test]
    fn test_session_error_is_transparent_over_resolution() {
        let err: SessionError = ResolutionError::Malformed("no data".to_string()).into();
        assert_eq!(err.to_string(), "malformed room info: no data");
    }
}
