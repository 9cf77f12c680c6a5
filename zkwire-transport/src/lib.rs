//! Transport layer for ZKTeco protocol
//!
//! Provides TCP/UDP communication with devices. Both transports move whole
//! protocol packets: the TCP transport adds and strips the stream framing
//! header, the UDP transport maps one datagram to one packet.

pub mod error;
pub mod tcp;
pub mod udp;

pub use error::{Error, Result};
pub use tcp::TcpTransport;
pub use udp::UdpTransport;
pub use zkwire_core::TransportKind;

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Transport trait for different communication methods
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to device
    async fn connect(&mut self) -> Result<()>;

    /// Disconnect from device
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Send one encoded packet
    async fn send(&mut self, packet: &[u8]) -> Result<()>;

    /// Receive one encoded packet, waiting at most `timeout`
    async fn receive(&mut self, timeout: Duration) -> Result<BytesMut>;

    /// Transport flavour
    fn kind(&self) -> TransportKind;

    /// Get remote address
    fn remote_addr(&self) -> String;
}

/// Resolve `host:port` to the first socket address
pub(crate) async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let addr_str = format!("{}:{}", host, port);

    let mut addrs = tokio::net::lookup_host(&addr_str)
        .await
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?;

    addrs
        .next()
        .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))
}

/// Check that a device is reachable before a session is attempted
///
/// Resolves the address; for TCP also opens and drops a connection within
/// `limit`. UDP has no handshake so resolution is all that can be checked.
pub async fn probe(host: &str, port: u16, kind: TransportKind, limit: Duration) -> Result<SocketAddr> {
    let addr = resolve(host, port).await?;

    if kind == TransportKind::Tcp {
        let stream = timeout(limit, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)??;
        drop(stream);
    }

    debug!(%addr, %kind, "Device reachable");
    Ok(addr)
}
