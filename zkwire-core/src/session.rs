//! Session management for ZKTeco protocol
//!
//! A session represents one logical conversation with a terminal and tracks:
//! - Session ID (assigned by device on connect)
//! - Reply counter (stamped on every outbound command)
//! - Authentication state
//!
//! The session is a plain owned value; the connection that drives it is the
//! only writer.

use std::fmt;
use std::net::SocketAddr;

use crate::{
    constants::CONNECT_REPLY_ID,
    error::{Error, Result},
};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected
    Disconnected,

    /// CMD_CONNECT sent, waiting for the session id (and CMD_AUTH if required)
    Connecting,

    /// Session established, commands may be issued
    Connected,

    /// CMD_EXIT sent, transport being released
    Disconnecting,
}

/// Transport carrying a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TransportKind {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// Session state machine
///
/// ```
/// use zkwire_core::{Session, SessionState, TransportKind};
///
/// let mut session = Session::new(TransportKind::Tcp);
/// let connect_reply = session.begin_connect().unwrap();
/// assert_eq!(connect_reply, 0);
///
/// session.assign_id(1234);
/// session.establish(false).unwrap();
/// assert_eq!(session.state(), SessionState::Connected);
/// assert_eq!(session.next_reply_id(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    session_id: u16,
    reply_counter: u16,
    last_sent: Option<u16>,
    transport: TransportKind,
    authenticated: bool,
    peer: Option<SocketAddr>,
}

impl Session {
    /// Create a new disconnected session
    pub fn new(transport: TransportKind) -> Self {
        Self {
            state: SessionState::Disconnected,
            session_id: 0,
            reply_counter: CONNECT_REPLY_ID,
            last_sent: None,
            transport,
            authenticated: false,
            peer: None,
        }
    }

    /// Attach the peer address
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Get current session ID (0 when not connected)
    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Transport the session runs on
    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Peer address, when known
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Check if the session passed CMD_AUTH
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Reply id of the request in flight
    pub fn last_sent(&self) -> Option<u16> {
        self.last_sent
    }

    /// Value the next [`Session::next_reply_id`] call will return
    pub fn reply_counter(&self) -> u16 {
        self.reply_counter
    }

    /// Start a connect attempt, returning the reply id for CMD_CONNECT
    ///
    /// # Errors
    ///
    /// [`Error::InvalidSessionState`] unless the session is disconnected.
    pub fn begin_connect(&mut self) -> Result<u16> {
        if self.state != SessionState::Disconnected {
            return Err(Error::InvalidSessionState(format!(
                "Cannot connect from state: {:?}",
                self.state
            )));
        }

        self.state = SessionState::Connecting;
        self.session_id = 0;
        self.authenticated = false;
        self.reply_counter = CONNECT_REPLY_ID;
        Ok(self.next_reply_id())
    }

    /// Record the session id carried by the CONNECT reply
    pub fn assign_id(&mut self, session_id: u16) {
        self.session_id = session_id;
    }

    /// Finish the handshake
    pub fn establish(&mut self, authenticated: bool) -> Result<()> {
        if self.state != SessionState::Connecting {
            return Err(Error::InvalidSessionState(format!(
                "Cannot establish from state: {:?}",
                self.state
            )));
        }
        if self.session_id == 0 {
            return Err(Error::SessionNotInitialized);
        }

        self.state = SessionState::Connected;
        self.authenticated = authenticated;
        Ok(())
    }

    /// Take the reply id for the next outbound command
    ///
    /// Wraps from 65535 to 0.
    pub fn next_reply_id(&mut self) -> u16 {
        let id = self.reply_counter;
        self.reply_counter = self.reply_counter.wrapping_add(1);
        self.last_sent = Some(id);
        id
    }

    /// Check that a reply belongs to the request in flight
    pub fn check_reply(&self, reply_id: u16) -> Result<()> {
        match self.last_sent {
            Some(expected) if expected == reply_id => Ok(()),
            Some(expected) => Err(Error::StaleReply {
                expected,
                actual: reply_id,
            }),
            None => Err(Error::SessionNotInitialized),
        }
    }

    /// Whether a reply id matches the request in flight
    pub fn accepts_reply(&self, reply_id: u16) -> bool {
        self.check_reply(reply_id).is_ok()
    }

    /// Start an orderly shutdown
    pub fn begin_disconnect(&mut self) -> Result<()> {
        match self.state {
            SessionState::Connected | SessionState::Connecting => {
                self.state = SessionState::Disconnecting;
                Ok(())
            }
            state => Err(Error::InvalidSessionState(format!(
                "Cannot disconnect from state: {:?}",
                state
            ))),
        }
    }

    /// Close session, from any state
    pub fn close(&mut self) {
        self.state = SessionState::Disconnected;
        self.session_id = 0;
        self.reply_counter = CONNECT_REPLY_ID;
        self.last_sent = None;
        self.authenticated = false;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(TransportKind::Tcp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn connected() -> Session {
        let mut session = Session::new(TransportKind::Udp);
        session.begin_connect().unwrap();
        session.assign_id(1234);
        session.establish(false).unwrap();
        session
    }

    #[test]
    fn test_session_new() {
        let session = Session::new(TransportKind::Tcp);
        assert_eq!(session.session_id(), 0);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_connected());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_connect_uses_reply_zero_then_one() {
        let mut session = Session::new(TransportKind::Tcp);

        assert_eq!(session.begin_connect().unwrap(), 0);
        assert_eq!(session.state(), SessionState::Connecting);

        session.assign_id(1234);
        session.establish(false).unwrap();

        assert_eq!(session.session_id(), 1234);
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.reply_counter(), 1);
        assert_eq!(session.next_reply_id(), 1);
    }

    #[test]
    fn test_establish_requires_session_id() {
        let mut session = Session::new(TransportKind::Tcp);
        session.begin_connect().unwrap();

        assert!(matches!(
            session.establish(false),
            Err(Error::SessionNotInitialized)
        ));
    }

    #[test]
    fn test_authenticated_session() {
        let mut session = Session::new(TransportKind::Tcp);
        session.begin_connect().unwrap();
        session.assign_id(77);
        session.establish(true).unwrap();

        assert!(session.is_authenticated());
    }

    #[test]
    fn test_session_close() {
        let mut session = connected();
        session.next_reply_id();

        session.begin_disconnect().unwrap();
        assert_eq!(session.state(), SessionState::Disconnecting);

        session.close();
        assert_eq!(session.session_id(), 0);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.last_sent(), None);
    }

    #[test]
    fn test_reply_id_wrap() {
        let mut session = connected();
        for _ in 1..u16::MAX {
            session.next_reply_id();
        }

        assert_eq!(session.next_reply_id(), u16::MAX);
        assert_eq!(session.next_reply_id(), 0);
        assert_eq!(session.next_reply_id(), 1);
    }

    #[test]
    fn test_stale_reply_rejected() {
        let mut session = connected();
        let id = session.next_reply_id();

        assert!(session.accepts_reply(id));
        assert!(matches!(
            session.check_reply(id.wrapping_sub(1)),
            Err(Error::StaleReply { expected, actual }) if expected == id && actual == id - 1
        ));
    }

    #[test]
    fn test_invalid_state_transitions() {
        let mut session = Session::new(TransportKind::Tcp);

        assert!(session.establish(false).is_err());
        assert!(session.begin_disconnect().is_err());

        session.begin_connect().unwrap();
        assert!(session.begin_connect().is_err());
    }
}
