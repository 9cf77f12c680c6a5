//! Request/reply exchange over one session
//!
//! A [`Connection`] owns the transport and the session state machine. Every
//! request takes `&mut self`, so at most one request is in flight per
//! session; a reply is matched to it by reply id and anything else is
//! dropped.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use zkwire_core::{
    auth::make_commkey,
    constants::{AUTH_TICKS, DEFAULT_TIMEOUT, MAX_RETRIES},
    Command, Packet, Session, SessionState, TransportKind,
};
use zkwire_transport::Transport;

use crate::error::{Error, Result};

/// A transport plus the session running over it
pub struct Connection {
    transport: Box<dyn Transport>,
    session: Session,
    timeout: Duration,
    max_retries: usize,
}

impl Connection {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        let session = Session::new(transport.kind());
        Self {
            transport,
            session,
            timeout: DEFAULT_TIMEOUT,
            max_retries: MAX_RETRIES,
        }
    }

    /// Set reply timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set UDP retransmission limit
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn remote_addr(&self) -> String {
        self.transport.remote_addr()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.session.is_connected() && self.transport.is_connected()
    }

    /// Run the CONNECT (and, when demanded, AUTH) handshake
    ///
    /// # Errors
    ///
    /// - [`Error::Authentication`] when the device rejects the CommKey
    /// - [`Error::Device`] when CONNECT itself is refused
    pub async fn open(&mut self, password: u32) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        if self.session.state() != SessionState::Disconnected {
            self.session.close();
        }

        if !self.transport.is_connected() {
            self.transport.connect().await?;
        }

        info!("Connecting to {}...", self.transport.remote_addr());

        let reply_id = self.session.begin_connect()?;
        let reply = self
            .exchange(Packet::new(Command::Connect, 0, reply_id))
            .await?;

        let result = self.finish_handshake(reply, password).await;
        if result.is_err() {
            self.release().await;
        }
        result
    }

    async fn finish_handshake(&mut self, reply: Packet, password: u32) -> Result<()> {
        let session_id = reply.session_id;

        match reply.kind() {
            Some(Command::AckOk) => {
                self.session.assign_id(session_id);
                self.session.establish(false)?;
                info!("Connected successfully (session_id={})", session_id);
                Ok(())
            }
            Some(Command::AckUnauth) => {
                info!("Device requires authentication, sending CommKey...");
                self.session.assign_id(session_id);

                let key = make_commkey(password, session_id, AUTH_TICKS);
                debug!(session_id, key = ?&key[..], "Derived CommKey");

                let auth_reply = self.request(Command::Auth, key).await?;
                match auth_reply.kind() {
                    Some(Command::AckOk) => {
                        self.session.establish(true)?;
                        info!("Authenticated successfully (session_id={})", session_id);
                        Ok(())
                    }
                    _ => Err(Error::Authentication(format!(
                        "device answered {}",
                        describe(&auth_reply)
                    ))),
                }
            }
            _ => Err(rejected(Command::Connect, &reply)),
        }
    }

    /// Send CMD_EXIT and release the transport
    pub async fn close(&mut self) -> Result<()> {
        if !self.is_connected() {
            self.release().await;
            return Ok(());
        }

        info!("Disconnecting from {}...", self.transport.remote_addr());

        self.session.begin_disconnect()?;
        match self.request(Command::Exit, Bytes::new()).await {
            Ok(reply) if !reply.is_success() => warn!("EXIT answered with {}", describe(&reply)),
            Ok(_) => {}
            Err(e) => warn!("Failed to send EXIT command: {}", e),
        }

        self.release().await;
        info!("Disconnected");
        Ok(())
    }

    /// Drop the session and the transport without talking to the device
    pub async fn release(&mut self) {
        self.session.close();
        if let Err(e) = self.transport.disconnect().await {
            debug!("Transport disconnect failed: {}", e);
        }
    }

    /// Issue a command and wait for its reply
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] before [`Connection::open`]
    /// - [`Error::ConnectionLost`] when UDP retransmissions are exhausted
    /// - [`Error::Timeout`] when a TCP reply does not arrive
    pub async fn execute(&mut self, command: Command, payload: impl Into<Bytes>) -> Result<Packet> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.request(command, payload.into()).await
    }

    /// Issue a command and require a success acknowledgement
    pub async fn execute_ok(&mut self, command: Command, payload: impl Into<Bytes>) -> Result<Packet> {
        let reply = self.execute(command, payload).await?;
        expect_success(command, reply)
    }

    /// Read a further frame answering the request in flight
    ///
    /// Used for streamed replies where several frames share one reply id.
    /// A timeout closes a TCP session; on UDP the session stays open so the
    /// caller can re-request.
    pub async fn receive_followup(&mut self) -> Result<Packet> {
        let reply_id = self
            .session
            .last_sent()
            .ok_or(Error::NotConnected)?;

        match self.await_reply(reply_id).await {
            Err(Error::Timeout) if self.kind() == TransportKind::Tcp => {
                self.release().await;
                Err(Error::Timeout)
            }
            other => other,
        }
    }

    async fn request(&mut self, command: Command, payload: Bytes) -> Result<Packet> {
        let packet = Packet::with_payload(
            command,
            self.session.session_id(),
            self.session.next_reply_id(),
            payload,
        );
        self.exchange(packet).await
    }

    /// Send a packet and wait for the matching reply, retransmitting on UDP
    async fn exchange(&mut self, packet: Packet) -> Result<Packet> {
        let frame = packet.encode();
        let attempts = match self.kind() {
            TransportKind::Udp => self.max_retries + 1,
            TransportKind::Tcp => 1,
        };

        for attempt in 0..attempts {
            if attempt > 0 {
                warn!(
                    "No reply to {} (reply_id={}), retransmitting ({}/{})",
                    packet, packet.reply_id, attempt, self.max_retries
                );
            }

            trace!("Sending: {:?}", packet);
            if let Err(e) = self.transport.send(&frame).await {
                self.release().await;
                return Err(e.into());
            }

            match self.await_reply(packet.reply_id).await {
                Err(Error::Timeout) => continue,
                other => return other,
            }
        }

        self.release().await;
        match self.kind() {
            TransportKind::Udp => Err(Error::ConnectionLost),
            TransportKind::Tcp => Err(Error::Timeout),
        }
    }

    /// Receive until a frame with `reply_id` arrives or the timeout expires
    async fn await_reply(&mut self, reply_id: u16) -> Result<Packet> {
        let deadline = Instant::now() + self.timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }

            let buf = match self.transport.receive(remaining).await {
                Ok(buf) => buf,
                Err(e) if e.is_timeout() => return Err(Error::Timeout),
                Err(zkwire_transport::Error::Framing(e)) if e.is_malformed() => {
                    warn!("Dropping malformed frame: {}", e);
                    continue;
                }
                Err(e) => {
                    self.release().await;
                    return Err(e.into());
                }
            };

            let packet = match Packet::decode(buf) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("Dropping corrupt frame: {}", e);
                    continue;
                }
            };

            if packet.reply_id != reply_id {
                debug!(
                    "Dropping stale reply {} (expected reply_id={})",
                    packet, reply_id
                );
                continue;
            }

            trace!("Received: {:?}", packet);
            return Ok(packet);
        }
    }
}

/// Map a non-success reply to [`Error::Device`]
pub(crate) fn expect_success(command: Command, reply: Packet) -> Result<Packet> {
    if reply.is_success() {
        Ok(reply)
    } else {
        Err(rejected(command, &reply))
    }
}

pub(crate) fn rejected(command: Command, reply: &Packet) -> Error {
    Error::Device {
        command,
        reason: describe(reply),
    }
}

fn describe(reply: &Packet) -> String {
    match reply.kind() {
        Some(Command::AckUnauth) => "session is not authenticated".to_string(),
        Some(Command::AckError) => "device reported an error".to_string(),
        Some(Command::AckErrorData) => "device rejected the data".to_string(),
        Some(command) => format!("unexpected reply {}", command),
        None => format!("unexpected reply code {}", reply.command),
    }
}
