//! Room session bookkeeping
//!
//! `RoomSession` is the state one live session carries between a downstream
//! consumer and an upstream room, plus the table of legal state changes.

use std::fmt;

use tracing::{debug, warn};

use crate::types::RoomId;

/// Lifecycle of one upstream session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Resolving,
    Connecting,
    Authenticating,
    Live,
    Reconnecting,
    Closed,
}

impl SessionState {
    /// Whether `self -> next` is a legal transition
    ///
    /// `Closed` is reachable from every state and is terminal.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Idle, Resolving) => true,
            (Resolving, Connecting) => true,
            (Connecting, Authenticating) => true,
            (Authenticating, Live) => true,
            // Handshake failures and pre-auth closes
            (Connecting | Authenticating, Reconnecting) => true,
            (Reconnecting, Resolving) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Resolving => "resolving",
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Live => "live",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// One active bridge between a consumer and an upstream room
#[derive(Debug, Clone)]
pub struct RoomSession {
    /// Room id as the consumer sent it
    pub requested_room_id: RoomId,
    /// Internal id returned by the resolver
    pub resolved_room_id: Option<u64>,
    pub state: SessionState,
    pub reconnect_attempts: u32,
    pub authenticated: bool,
    pub heartbeat_active: bool,
}

impl RoomSession {
    pub fn new(requested_room_id: RoomId) -> Self {
        Self {
            requested_room_id,
            resolved_room_id: None,
            state: SessionState::Idle,
            reconnect_attempts: 0,
            authenticated: false,
            heartbeat_active: false,
        }
    }

    /// Move to `next` if the transition is legal
    ///
    /// Returns false (and leaves the state untouched) otherwise.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(
                room = %self.requested_room_id,
                from = %self.state,
                to = %next,
                "illegal session transition"
            );
            return false;
        }
        debug!(
            room = %self.requested_room_id,
            from = %self.state,
            to = %next,
            "session transition"
        );
        self.state = next;
        true
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Whether a dropped connection should be retried
    ///
    /// Only sessions that never authenticated are retried.
    pub fn can_reconnect(&self, max_attempts: u32) -> bool {
        !self.authenticated && self.reconnect_attempts < max_attempts
    }

    /// Mark the session closed: not authenticated, heartbeat stopped
    ///
    /// Safe to call repeatedly.
    pub fn close(&mut self) {
        self.authenticated = false;
        self.heartbeat_active = false;
        if !self.is_closed() {
            self.transition(SessionState::Closed);
        }
    }

    /// Best known room id for user-facing messages
    pub fn display_room(&self) -> String {
        match self.resolved_room_id {
            Some(id) => id.to_string(),
            None => self.requested_room_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation() {
        let session = RoomSession::new(RoomId::new("123"));

        assert_eq!(session.state, SessionState::Idle);
        assert_eq!(session.resolved_room_id, None);
        assert_eq!(session.reconnect_attempts, 0);
        assert!(!session.authenticated);
        assert!(!session.heartbeat_active);
        assert_eq!(session.display_room(), "123");
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut session = RoomSession::new(RoomId::new("1"));

        for next in [
            SessionState::Resolving,
            SessionState::Connecting,
            SessionState::Authenticating,
            SessionState::Live,
            SessionState::Closed,
        ] {
            assert!(session.transition(next), "to {next}");
        }
        assert!(session.is_closed());
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut session = RoomSession::new(RoomId::new("1"));

        assert!(!session.transition(SessionState::Live));
        assert_eq!(session.state, SessionState::Idle);

        session.transition(SessionState::Resolving);
        session.transition(SessionState::Connecting);
        session.transition(SessionState::Authenticating);
        session.transition(SessionState::Live);
        // Authenticated sessions never reconnect
        assert!(!session.transition(SessionState::Reconnecting));
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut session = RoomSession::new(RoomId::new("1"));
        session.close();
        session.close();

        assert!(session.is_closed());
        assert!(!session.transition(SessionState::Resolving));
    }

    #[test]
    fn test_can_reconnect() {
        let mut session = RoomSession::new(RoomId::new("1"));
        assert!(session.can_reconnect(3));

        session.reconnect_attempts = 3;
        assert!(!session.can_reconnect(3));

        session.reconnect_attempts = 0;
        session.authenticated = true;
        assert!(!session.can_reconnect(3));
    }

    #[test]
    fn test_close_clears_flags() {
        let mut session = RoomSession::new(RoomId::new("1"));
        session.authenticated = true;
        session.heartbeat_active = true;
        session.resolved_room_id = Some(456);

        session.close();

        assert!(!session.authenticated);
        assert!(!session.heartbeat_active);
        assert_eq!(session.display_room(), "456");
    }
}
