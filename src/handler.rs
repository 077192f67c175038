//! WebSocket connection handler
//!
//! Handles individual consumer connections: WebSocket handshake,
//! request parsing, and bidirectional communication with the SessionBridge.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::bridge::BridgeCommand;
use crate::error::AppError;
use crate::message::{ClientMessage, ServerMessage};
use crate::types::ClientId;

/// Buffered bridge → consumer messages per connection
const CLIENT_BUFFER_SIZE: usize = 256;

/// Handle a new downstream connection
///
/// Performs WebSocket handshake, sets up bidirectional communication,
/// and manages the connection lifecycle.
pub async fn handle_connection<S>(
    stream: S,
    cmd_tx: mpsc::Sender<BridgeCommand>,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Generate client ID
    let client_id = ClientId::new();
    info!("Client {} connected", client_id);

    // Create channel for bridge -> consumer messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(CLIENT_BUFFER_SIZE);

    // Register with SessionBridge
    if cmd_tx
        .send(BridgeCommand::Connect {
            client_id,
            sender: msg_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register client {} - bridge closed", client_id);
        return Err(AppError::ChannelSend);
    }

    // Clone cmd_tx for read task
    let cmd_tx_read = cmd_tx.clone();

    // Spawn read task (WebSocket -> BridgeCommand)
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            let cmd = match msg_result {
                Ok(Message::Text(text)) => parse_request(client_id, &text),
                Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                    Ok(text) => parse_request(client_id, text),
                    Err(e) => BridgeCommand::Invalid {
                        client_id,
                        error: AppError::InvalidRequest(e.to_string()),
                    },
                },
                Ok(Message::Close(_)) => {
                    debug!("Client {} sent close frame", client_id);
                    break;
                }
                Ok(_) => {
                    // Ping/Pong handled by tungstenite
                    continue;
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", client_id, e);
                    break;
                }
            };

            if cmd_tx_read.send(cmd).await.is_err() {
                debug!("Bridge closed, ending read task for {}", client_id);
                break;
            }
        }
        debug!("Read task ended for {}", client_id);
    });

    // Spawn write task (ServerMessage -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for client");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", client_id);
        }
        _ = write_task => {
            debug!("Write task completed for {}", client_id);
        }
    }

    // Send disconnect command
    let _ = cmd_tx
        .send(BridgeCommand::Disconnect { client_id })
        .await;

    info!("Client {} disconnected", client_id);

    Ok(())
}

/// Convert a raw request into a BridgeCommand
fn parse_request(client_id: ClientId, text: &str) -> BridgeCommand {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Join { room_id }) => BridgeCommand::Join { client_id, room_id },
        Err(e) => {
            warn!("Invalid request from {}: {}", client_id, e);
            BridgeCommand::Invalid {
                client_id,
                error: e.into(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_join() {
        let id = ClientId::new();
        match parse_request(id, r#"{"type":"join","roomId":"123"}"#) {
            BridgeCommand::Join { client_id, room_id } => {
                assert_eq!(client_id, id);
                assert_eq!(room_id.as_str(), "123");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_garbage() {
        let id = ClientId::new();
        assert!(matches!(
            parse_request(id, "{not json"),
            BridgeCommand::Invalid {
                error: AppError::Json(_),
                ..
            }
        ));
        assert!(matches!(
            parse_request(id, r#"{"type":"subscribe"}"#),
            BridgeCommand::Invalid { .. }
        ));
    }
}
