//! SessionBridge actor implementation
//!
//! The central actor that owns the consumer → live session map.
//! Uses the Actor pattern with mpsc channels for message passing: join and
//! disconnect requests for every consumer are applied one at a time, so a
//! replaced session is fully torn down before its successor starts.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::AppError;
use crate::message::ServerMessage;
use crate::session::{LiveSession, SessionContext, SessionHandle};
use crate::types::{ClientId, RoomId};

/// Commands sent from handlers to the SessionBridge actor
#[derive(Debug)]
pub enum BridgeCommand {
    /// New consumer connected
    Connect {
        client_id: ClientId,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Consumer disconnected
    Disconnect { client_id: ClientId },
    /// Consumer asked for a room
    Join { client_id: ClientId, room_id: RoomId },
    /// Consumer sent something that is not a valid request
    Invalid { client_id: ClientId, error: AppError },
}

/// The main SessionBridge actor
///
/// Holds at most one live session per consumer.
pub struct SessionBridge {
    /// All connected consumers: ClientId -> Client
    clients: HashMap<ClientId, Client>,
    /// Live session per consumer: ClientId -> SessionHandle
    sessions: HashMap<ClientId, SessionHandle>,
    /// Resolver, connector and tunables for new sessions
    ctx: SessionContext,
    /// Command receiver channel
    receiver: mpsc::Receiver<BridgeCommand>,
}

impl SessionBridge {
    /// Create a new SessionBridge with the given command receiver
    pub fn new(ctx: SessionContext, receiver: mpsc::Receiver<BridgeCommand>) -> Self {
        Self {
            clients: HashMap::new(),
            sessions: HashMap::new(),
            ctx,
            receiver,
        }
    }

    /// Run the SessionBridge event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("SessionBridge started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("SessionBridge shutting down");
        for (client_id, mut session) in self.sessions.drain() {
            debug!("Closing session for {}", client_id);
            session.disconnect().await;
        }
    }

    /// Process a single command
    async fn handle_command(&mut self, cmd: BridgeCommand) {
        match cmd {
            BridgeCommand::Connect { client_id, sender } => {
                self.handle_connect(client_id, sender);
            }
            BridgeCommand::Disconnect { client_id } => {
                self.handle_disconnect(client_id).await;
            }
            BridgeCommand::Join { client_id, room_id } => {
                self.handle_join(client_id, room_id).await;
            }
            BridgeCommand::Invalid { client_id, error } => {
                self.handle_invalid(client_id, error);
            }
        }
    }

    /// Handle new consumer connection
    fn handle_connect(&mut self, client_id: ClientId, sender: mpsc::Sender<ServerMessage>) {
        info!("Client {} connected", client_id);
        self.clients.insert(client_id, Client::new(client_id, sender));
        debug!(
            "Total clients: {}, Total sessions: {}",
            self.clients.len(),
            self.sessions.len()
        );
    }

    /// Handle consumer disconnection
    async fn handle_disconnect(&mut self, client_id: ClientId) {
        info!("Client {} disconnected", client_id);

        if let Some(mut session) = self.sessions.remove(&client_id) {
            session.disconnect().await;
        }
        self.clients.remove(&client_id);

        debug!(
            "Total clients: {}, Total sessions: {}",
            self.clients.len(),
            self.sessions.len()
        );
    }

    /// Handle a join request: replace any current session
    async fn handle_join(&mut self, client_id: ClientId, room_id: RoomId) {
        let Some(client) = self.clients.get(&client_id) else {
            warn!("Join from unknown client {}", client_id);
            return;
        };

        if room_id.is_blank() {
            notify(client, AppError::InvalidRequest("empty room id".to_string()).into());
            return;
        }

        if !client.is_open() {
            debug!("Client {} already gone, not joining {}", client.id, room_id);
            return;
        }

        if let Some(mut previous) = self.sessions.remove(&client_id) {
            info!(
                "Client {} leaving room {} for {}",
                client_id,
                previous.room_id(),
                room_id
            );
            previous.disconnect().await;
        }

        info!("Client {} joining room {}", client.id, room_id);
        let session = LiveSession::spawn(room_id, self.ctx.clone(), client.channel());
        self.sessions.insert(client_id, session);
    }

    /// Handle an unparseable request
    fn handle_invalid(&self, client_id: ClientId, error: AppError) {
        let Some(client) = self.clients.get(&client_id) else {
            return;
        };

        warn!("Invalid request from {}: {}", client_id, error);
        notify(client, error.into());
    }
}

/// Reply to a consumer from inside the actor; never waits on a slow consumer
fn notify(client: &Client, msg: ServerMessage) {
    if let Err(e) = client.send(msg) {
        warn!("Dropping reply to client {}: {}", client.id, e);
    }
}
