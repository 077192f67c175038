//! Live danmaku bridge library
//!
//! Subscribes to live-room chat on the upstream binary WebSocket protocol
//! and republishes each chat message as JSON to downstream WebSocket
//! consumers, one upstream session per consumer.
//!
//! # Features
//! - Upstream frame codec with zlib container unwrapping
//! - Public → internal room id resolution
//! - Anonymous auth, 30s heartbeat, pre-auth reconnect with backoff
//! - Chat extraction with a display-priority weight
//! - Join / re-join / leave handling per consumer
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `SessionBridge` is the central actor owning the consumer → session map
//! - Each downstream connection has a `handler` task talking to the bridge
//! - Each `LiveSession` is its own task and writes straight into its
//!   consumer's channel
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use danmaku_bridge::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let resolver = Arc::new(HttpRoomResolver::new(
//!         config::DEFAULT_ROOM_INFO_URL,
//!         config::DEFAULT_USER_AGENT,
//!         config::DEFAULT_ORIGIN,
//!     ));
//!     let connector = Arc::new(WsConnector::new(
//!         config::DEFAULT_UPSTREAM_URL,
//!         config::DEFAULT_USER_AGENT,
//!         config::DEFAULT_ORIGIN,
//!         Duration::from_secs(5),
//!     ));
//!     let ctx = SessionContext::new(resolver, connector, SessionConfig::default());
//!
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!     tokio::spawn(SessionBridge::new(ctx, cmd_rx).run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, cmd_tx.clone()));
//!     }
//! }
//! ```

pub mod bridge;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod extractor;
pub mod handler;
pub mod message;
pub mod resolver;
pub mod room;
pub mod session;
pub mod status;
pub mod types;
pub mod upstream;

// Re-export main types for convenience
pub use bridge::{BridgeCommand, SessionBridge};
pub use client::Client;
pub use codec::Frame;
pub use config::BridgeConfig;
pub use error::{AppError, CodecError, ExtractionError, ResolutionError, SendError, SessionError};
pub use extractor::{ChatEvent, ChatUser};
pub use handler::handle_connection;
pub use message::{ClientMessage, ServerMessage};
pub use resolver::{HttpRoomResolver, RoomResolver};
pub use room::{RoomSession, SessionState};
pub use session::{LiveSession, SessionConfig, SessionContext, SessionHandle};
pub use types::{ClientId, RoomId};
pub use upstream::{UpstreamConnector, UpstreamEvent, UpstreamLink, WsConnector};
