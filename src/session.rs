//! LiveSession: one upstream room subscription
//!
//! Each session is a single task that owns its `RoomSession` state, its
//! upstream link, and its heartbeat timer, and walks
//! `Idle → Resolving → Connecting → Authenticating → Live`, reporting to
//! the consumer through an `mpsc` channel of `ServerMessage`s. Everything
//! the task does is serialized by its own select loop; the only way in
//! from outside is the shutdown signal held by `SessionHandle`.
//!
//! Reconnect policy: a connection that drops before the auth reply is
//! retried up to `max_reconnect_attempts` times with exponential backoff.
//! Once authenticated, a drop ends the session with `disconnected`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::codec::{self, op, Frame};
use crate::extractor;
use crate::message::ServerMessage;
use crate::resolver::RoomResolver;
use crate::room::{RoomSession, SessionState};
use crate::types::RoomId;
use crate::upstream::{UpstreamConnector, UpstreamEvent, UpstreamLink};

/// Default heartbeat period
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default reconnect budget before authentication
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;

const RECONNECT_BASE_MS: u64 = 1000;
const RECONNECT_CAP_MS: u64 = 30_000;

/// How long `disconnect` waits for the task before aborting it
const TEARDOWN_GRACE: Duration = Duration::from_secs(2);

/// Inbound buffers above this size are decoded on the blocking pool
const INLINE_DECODE_LIMIT: usize = 64 * 1024;

/// Backoff before reconnect attempt `attempt` (1-based)
///
/// `min(1000 * 2^attempt, 30000)` ms: 2s, 4s, 8s, ...
pub fn reconnect_delay(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(RECONNECT_BASE_MS.saturating_mul(factor).min(RECONNECT_CAP_MS))
}

/// Tunables shared by every session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub heartbeat_interval: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: HEARTBEAT_INTERVAL,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Collaborators a session needs
#[derive(Clone)]
pub struct SessionContext {
    pub resolver: Arc<dyn RoomResolver>,
    pub connector: Arc<dyn UpstreamConnector>,
    pub config: SessionConfig,
}

impl SessionContext {
    pub fn new(
        resolver: Arc<dyn RoomResolver>,
        connector: Arc<dyn UpstreamConnector>,
        config: SessionConfig,
    ) -> Self {
        Self {
            resolver,
            connector,
            config,
        }
    }
}

/// How one connection attempt ended
enum Attempt {
    /// Explicit disconnect
    Shutdown,
    /// Nothing left to retry (resolution failed)
    Terminal,
    /// Handshake failed or socket went away
    Dropped,
}

/// The session task state
pub struct LiveSession {
    session: RoomSession,
    ctx: SessionContext,
    events: mpsc::Sender<ServerMessage>,
}

impl LiveSession {
    /// Start a session for `room_id`, reporting into `events`
    pub fn spawn(
        room_id: RoomId,
        ctx: SessionContext,
        events: mpsc::Sender<ServerMessage>,
    ) -> SessionHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let live = LiveSession {
            session: RoomSession::new(room_id.clone()),
            ctx,
            events,
        };
        let task = tokio::spawn(live.run(shutdown_rx));

        SessionHandle {
            room_id,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> RoomSession {
        info!(room = %self.session.requested_room_id, "session started");
        self.session.transition(SessionState::Resolving);

        loop {
            match self.attempt(&mut shutdown).await {
                Attempt::Shutdown => {
                    info!(room = %self.session.display_room(), "session disconnected by consumer");
                    break;
                }
                Attempt::Terminal => break,
                Attempt::Dropped => {
                    if !self.session.can_reconnect(self.ctx.config.max_reconnect_attempts) {
                        let msg = ServerMessage::disconnected(self.session.display_room());
                        self.emit(&mut shutdown, msg).await;
                        break;
                    }

                    self.session.reconnect_attempts += 1;
                    let attempt = self.session.reconnect_attempts;
                    let delay = reconnect_delay(attempt);
                    self.session.transition(SessionState::Reconnecting);
                    info!(
                        room = %self.session.display_room(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "scheduling reconnect"
                    );

                    tokio::select! {
                        _ = &mut shutdown => {
                            info!(
                                room = %self.session.display_room(),
                                "session disconnected during backoff"
                            );
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    self.session.transition(SessionState::Resolving);
                }
            }
        }

        self.session.close();
        info!(room = %self.session.display_room(), "session closed");
        self.session
    }

    /// Resolve, connect, authenticate, then pump the link until it ends
    async fn attempt(&mut self, shutdown: &mut oneshot::Receiver<()>) -> Attempt {
        let room_id = self.session.requested_room_id.clone();

        let resolved = tokio::select! {
            _ = &mut *shutdown => return Attempt::Shutdown,
            r = self.ctx.resolver.resolve(&room_id) => r,
        };
        let real_room = match resolved {
            Ok(id) => id,
            Err(e) => {
                error!(room = %room_id, error = %e, "room resolution failed");
                let msg = ServerMessage::error(format!("connection failed: {}", e));
                if !self.emit(shutdown, msg).await {
                    return Attempt::Shutdown;
                }
                return Attempt::Terminal;
            }
        };
        self.session.resolved_room_id = Some(real_room);
        self.session.transition(SessionState::Connecting);

        let connected = tokio::select! {
            _ = &mut *shutdown => return Attempt::Shutdown,
            r = self.ctx.connector.connect() => r,
        };
        let mut link = match connected {
            Ok(link) => link,
            Err(e) => {
                warn!(room = real_room, error = %e, "upstream connect failed");
                let msg = ServerMessage::error(format!("connection failed: {}", e));
                if !self.emit(shutdown, msg).await {
                    return Attempt::Shutdown;
                }
                return Attempt::Dropped;
            }
        };

        self.session.transition(SessionState::Authenticating);
        if let Err(e) = link.send(codec::encode_auth(real_room)).await {
            warn!(room = real_room, error = %e, "failed to send auth frame");
            return Attempt::Dropped;
        }
        debug!(room = real_room, "auth frame sent");

        let mut heartbeat: Option<Interval> = None;

        loop {
            tokio::select! {
                _ = &mut *shutdown => return Attempt::Shutdown,
                _ = next_tick(&mut heartbeat) => {
                    send_heartbeat(&link, real_room);
                }
                event = link.inbound.recv() => match event {
                    Some(UpstreamEvent::Binary(data)) => {
                        debug!(room = real_room, len = data.len(), "upstream message");
                        for frame in decode_frames(data).await {
                            if !self.handle_frame(frame, &link, &mut heartbeat, shutdown).await {
                                return Attempt::Shutdown;
                            }
                        }
                    }
                    Some(UpstreamEvent::Error(e)) => {
                        warn!(room = real_room, error = %e, "upstream transport error");
                        self.session.heartbeat_active = false;
                        let msg = ServerMessage::error(format!("connection error: {}", e));
                        if !self.emit(shutdown, msg).await {
                            return Attempt::Shutdown;
                        }
                        return Attempt::Dropped;
                    }
                    Some(UpstreamEvent::Closed(reason)) => {
                        info!(
                            room = real_room,
                            reason = reason.as_deref().unwrap_or("unknown"),
                            "upstream closed"
                        );
                        self.session.heartbeat_active = false;
                        return Attempt::Dropped;
                    }
                    None => {
                        info!(room = real_room, "upstream link ended");
                        self.session.heartbeat_active = false;
                        return Attempt::Dropped;
                    }
                }
            }
        }
    }

    /// Route one decoded frame; returns false if shutdown arrived meanwhile
    async fn handle_frame(
        &mut self,
        frame: Frame,
        link: &UpstreamLink,
        heartbeat: &mut Option<Interval>,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> bool {
        match frame.operation {
            op::AUTH_REPLY => {
                if self.session.state != SessionState::Authenticating {
                    debug!(state = %self.session.state, "ignoring repeated auth reply");
                    return true;
                }
                debug!(body = %frame.text(), "auth reply");
                self.session.transition(SessionState::Live);
                self.session.authenticated = true;
                self.session.heartbeat_active = true;

                let room = self.session.display_room();
                info!(room = %room, "authenticated, starting heartbeat");
                if !self.emit(shutdown, ServerMessage::connected(&room)).await {
                    return false;
                }

                let period = self.ctx.config.heartbeat_interval;
                let real_room = self.session.resolved_room_id.unwrap_or_default();
                send_heartbeat(link, real_room);
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                *heartbeat = Some(interval);
                true
            }
            op::HEARTBEAT_REPLY => {
                match frame.heartbeat_count() {
                    Some(count) => debug!(count, "heartbeat reply"),
                    None => debug!("heartbeat reply without counter"),
                }
                true
            }
            op::MESSAGE => match extractor::try_extract(&frame.text()) {
                Some(event) => self.emit(shutdown, ServerMessage::Danmaku(event)).await,
                None => true,
            },
            other => {
                debug!(operation = other, "ignoring frame");
                true
            }
        }
    }

    /// Deliver `msg` to the consumer unless shutdown arrives first
    ///
    /// Returns false once shutdown has been received; the receiver must not
    /// be polled again after that.
    async fn emit(&self, shutdown: &mut oneshot::Receiver<()>, msg: ServerMessage) -> bool {
        if self.session.is_closed() {
            return true;
        }
        tokio::select! {
            biased;
            _ = shutdown => false,
            sent = self.events.send(msg) => {
                if sent.is_err() {
                    debug!(
                        room = %self.session.display_room(),
                        "consumer channel closed, dropping event"
                    );
                }
                true
            }
        }
    }
}

async fn decode_frames(data: Vec<u8>) -> Vec<Frame> {
    if data.len() <= INLINE_DECODE_LIMIT {
        return codec::decode(&data);
    }
    match tokio::task::spawn_blocking(move || codec::decode(&data)).await {
        Ok(frames) => frames,
        Err(e) => {
            warn!(error = %e, "frame decode task failed");
            Vec::new()
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// Failures are logged only; the link's close event drives recovery.
fn send_heartbeat(link: &UpstreamLink, real_room: u64) {
    match link.try_send(codec::encode_heartbeat()) {
        Ok(()) => debug!(room = real_room, "heartbeat sent"),
        Err(e) => warn!(room = real_room, error = %e, "heartbeat send failed"),
    }
}

/// Owner's handle on a running session
///
/// Dropping the handle aborts the task; prefer `disconnect`.
#[derive(Debug)]
pub struct SessionHandle {
    room_id: RoomId,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<RoomSession>>,
}

impl SessionHandle {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stop the session and wait for it to tear down
    ///
    /// Idempotent; returns the final session state the first time.
    pub async fn disconnect(&mut self) -> Option<RoomSession> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let mut task = self.task.take()?;
        match tokio::time::timeout(TEARDOWN_GRACE, &mut task).await {
            Ok(Ok(session)) => Some(session),
            Ok(Err(e)) => {
                warn!(room = %self.room_id, error = %e, "session task failed");
                None
            }
            Err(_) => {
                warn!(room = %self.room_id, "session teardown timed out, aborting");
                task.abort();
                None
            }
        }
    }

    /// Wait for the session to end on its own
    pub async fn join(&mut self) -> Option<RoomSession> {
        let task = self.task.take()?;
        match task.await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(room = %self.room_id, error = %e, "session task failed");
                None
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_delay_schedule() {
        assert_eq!(reconnect_delay(1), Duration::from_millis(2000));
        assert_eq!(reconnect_delay(2), Duration::from_millis(4000));
        assert_eq!(reconnect_delay(3), Duration::from_millis(8000));
        assert_eq!(reconnect_delay(4), Duration::from_millis(16000));
        assert_eq!(reconnect_delay(5), Duration::from_millis(30000));
        assert_eq!(reconnect_delay(200), Duration::from_millis(30000));
    }

    #[tokio::test]
    async fn test_large_buffers_decode_off_thread() {
        let big = vec![b'x'; INLINE_DECODE_LIMIT * 2];
        let mut data = codec::encode_frame_versioned(codec::protover::PLAIN, op::MESSAGE, &big);
        data.extend(codec::encode_frame_versioned(codec::protover::PLAIN, op::AUTH_REPLY, b"{}"));

        let frames = decode_frames(data).await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].body.len(), big.len());
        assert_eq!(frames[1].operation, op::AUTH_REPLY);
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.max_reconnect_attempts, 3);
    }
}
