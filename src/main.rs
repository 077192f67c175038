//! Live danmaku bridge - Entry Point
//!
//! Starts the status endpoint, the SessionBridge actor, and the downstream
//! WebSocket listener.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use danmaku_bridge::{
    handle_connection, status, AppError, BridgeConfig, HttpRoomResolver, SessionBridge,
    SessionContext, WsConnector,
};

/// Channel buffer size for bridge commands
const CHANNEL_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=danmaku_bridge=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("danmaku_bridge=info")),
        )
        .init();

    let mut config = BridgeConfig::from_env()?;

    // Bind address from command line wins over env/default
    if let Some(addr) = env::args().nth(1) {
        config.ws_addr = addr
            .parse()
            .map_err(|e| AppError::Config(format!("bind address {}: {}", addr, e)))?;
    }

    status::spawn_status_server(config.status_addr).await?;

    let resolver = Arc::new(HttpRoomResolver::new(
        config.room_info_url.clone(),
        config.user_agent.clone(),
        config.origin.clone(),
    ));
    let connector = Arc::new(WsConnector::new(
        config.upstream_url.clone(),
        config.user_agent.clone(),
        config.origin.clone(),
        config.handshake_timeout,
    ));
    let ctx = SessionContext::new(resolver, connector, config.session_config());

    // Start downstream listener
    let listener = TcpListener::bind(config.ws_addr).await?;
    info!("Danmaku bridge listening on ws://{}", config.ws_addr);

    // Create SessionBridge actor channel and start
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    tokio::spawn(SessionBridge::new(ctx, cmd_rx).run());

    info!("SessionBridge actor started");

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let cmd_tx = cmd_tx.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, cmd_tx).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
