//! UDP transport for ZKTeco devices
//!
//! Most ZKTeco devices use UDP protocol on port 4370. Each datagram carries
//! exactly one packet with no framing header; lost or reordered datagrams are
//! dealt with by the session layer above.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, trace};
use zkwire_core::TransportKind;

use crate::{error::*, resolve, Transport};

/// Largest datagram accepted
const MAX_DATAGRAM: usize = 64 * 1024;

/// UDP transport for ZKTeco devices
pub struct UdpTransport {
    addr: String,
    port: u16,
    socket: Option<UdpSocket>,
    remote_addr: Option<SocketAddr>,
}

impl UdpTransport {
    /// Create new UDP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket: None,
            remote_addr: None,
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let remote = match self.remote_addr {
            Some(addr) => addr,
            None => resolve(&self.addr, self.port).await?,
        };
        self.remote_addr = Some(remote);

        debug!("Connecting to {} via UDP...", remote);

        // Bind to any available local port of the same family
        let local = if remote.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await.map_err(Error::Io)?;

        // Connect to remote address (sets default send/recv target)
        socket.connect(remote).await.map_err(Error::Io)?;

        debug!("Connected to {} via UDP", remote);

        self.socket = Some(socket);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.socket.take().is_some() {
            debug!("Disconnecting from {}...", self.remote_addr());
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    async fn send(&mut self, packet: &[u8]) -> Result<()> {
        let socket = self.socket.as_ref().ok_or(Error::NotConnected)?;

        trace!(
            "Sending {} bytes via UDP: {}",
            packet.len(),
            hex::encode(&packet[..packet.len().min(32)])
        );

        socket.send(packet).await.map_err(Error::Io)?;

        Ok(())
    }

    async fn receive(&mut self, limit: Duration) -> Result<BytesMut> {
        let socket = self.socket.as_ref().ok_or(Error::NotConnected)?;

        let mut buf = BytesMut::zeroed(MAX_DATAGRAM);

        let n = timeout(limit, socket.recv(&mut buf))
            .await
            .map_err(|_| Error::ReadTimeout)?
            .map_err(Error::Io)?;

        if n == 0 {
            return Err(Error::ConnectionClosed);
        }

        // Truncate to actual received size
        buf.truncate(n);

        trace!(
            "Received {} bytes via UDP: {}",
            n,
            hex::encode(&buf[..n.min(32)])
        );

        Ok(buf)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    fn remote_addr(&self) -> String {
        self.remote_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}
