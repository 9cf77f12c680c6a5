//! TCP transport
//!
//! Outbound packets are wrapped with the stream framing header. Inbound bytes
//! accumulate in a buffer that survives across `receive` calls, so a frame
//! split over several reads (or several frames in one read) is handled.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};
use zkwire_core::{framing, FrameDecoder, TransportKind};

use crate::{error::*, resolve, Transport};

/// TCP transport for ZKTeco devices
pub struct TcpTransport {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    read_buf: BytesMut,
    decoder: FrameDecoder,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            stream: None,
            connect_timeout: Duration::from_secs(5),
            read_buf: BytesMut::with_capacity(4096),
            decoder: FrameDecoder::new(),
        }
    }

    /// Wrap an accepted stream (server side)
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;

        Ok(Self {
            addr: peer.ip().to_string(),
            port: peer.port(),
            socket_addr: Some(peer),
            stream: Some(stream),
            connect_timeout: Duration::from_secs(5),
            read_buf: BytesMut::with_capacity(4096),
            decoder: FrameDecoder::new(),
        })
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the largest inner packet accepted from the peer
    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.decoder = self.decoder.with_max_frame(max_frame);
        self
    }

    /// Peer address once connected
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.socket_addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let addr = match self.socket_addr {
            Some(addr) => addr,
            None => resolve(&self.addr, self.port).await?,
        };
        self.socket_addr = Some(addr);

        debug!("Connecting to {}...", addr);

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(Error::Io)?;

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        debug!("Connected to {}", addr);

        self.read_buf.clear();
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Disconnecting from {}...", self.remote_addr());

            // Graceful shutdown
            let _ = stream.shutdown().await;
        }

        self.read_buf.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, packet: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let frame = framing::wrap_bytes(packet);
        trace!(
            "Sending {} bytes: {}",
            frame.len(),
            hex::encode(&frame[..frame.len().min(32)])
        );

        stream.write_all(&frame).await?;
        stream.flush().await?;

        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<BytesMut> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(packet) = self.decoder.decode(&mut self.read_buf)? {
                trace!(
                    "Received {} bytes: {}",
                    packet.len(),
                    hex::encode(&packet[..packet.len().min(32)])
                );
                return Ok(packet);
            }

            let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

            let n = timeout_at(deadline, stream.read_buf(&mut self.read_buf))
                .await
                .map_err(|_| Error::ReadTimeout)?
                .map_err(Error::Io)?;

            if n == 0 {
                warn!("Connection closed by {}", self.remote_addr());
                self.stream = None;
                return Err(Error::ConnectionClosed);
            }
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            trace!("TCP transport to {} dropped while connected", self.remote_addr());
        }
    }
}
