//! Network front end
//!
//! TCP clients each get their own task and [`SessionDispatcher`]. UDP
//! sessions are keyed by peer address and served from the receive loop.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use zkwire_core::{Packet, TransportKind, MAX_PACKET_SIZE};
use zkwire_transport::{TcpTransport, Transport};

use crate::config::SimulatorConfig;
use crate::dispatcher::{SessionDispatcher, SimContext};
use crate::error::Result;
use crate::store::SharedStore;

enum Listener {
    Tcp(TcpListener),
    Udp(UdpSocket),
}

/// A simulated terminal bound to its listen address
pub struct Simulator {
    ctx: SimContext,
    listener: Listener,
}

impl Simulator {
    /// Validate the configuration and bind the listener
    pub async fn bind(config: SimulatorConfig) -> Result<Self> {
        config.validate()?;

        let addr = config.bind_addr();
        let listener = match config.transport {
            TransportKind::Tcp => Listener::Tcp(TcpListener::bind(&addr).await?),
            TransportKind::Udp => Listener::Udp(UdpSocket::bind(&addr).await?),
        };

        let simulator = Self {
            ctx: SimContext::new(config),
            listener,
        };
        info!(
            transport = %simulator.ctx.config.transport,
            addr = %simulator.local_addr()?,
            "Simulator listening"
        );
        Ok(simulator)
    }

    /// Bound address, with the real port when configured with port 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let addr = match &self.listener {
            Listener::Tcp(listener) => listener.local_addr()?,
            Listener::Udp(socket) => socket.local_addr()?,
        };
        Ok(addr)
    }

    /// Terminal data shared by all sessions
    pub fn store(&self) -> SharedStore {
        self.ctx.store.clone()
    }

    /// Serve until the task is dropped
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        match self.listener {
            Listener::Tcp(listener) => serve_tcp(self.ctx, listener, shutdown).await,
            Listener::Udp(socket) => serve_udp(self.ctx, socket, shutdown).await,
        }
    }
}

async fn serve_tcp(
    ctx: SimContext,
    listener: TcpListener,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    tokio::pin!(shutdown);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(connections = connections.len(), "Shutting down simulator");
                connections.shutdown().await;
                return Ok(());
            }

            Some(_) = connections.join_next(), if !connections.is_empty() => {}

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let ctx = ctx.clone();
                        connections.spawn(async move {
                            if let Err(e) = serve_connection(ctx, stream, peer).await {
                                warn!(%peer, error = %e, "Session ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Error accepting connection");
                    }
                }
            }
        }
    }
}

async fn serve_connection(ctx: SimContext, stream: TcpStream, peer: SocketAddr) -> Result<()> {
    let idle = Duration::from_secs(ctx.config.idle_timeout_secs);
    let mut transport = TcpTransport::from_stream(stream)?;
    let mut dispatcher = SessionDispatcher::new(ctx, TransportKind::Tcp, peer);
    info!(%peer, "Client connected");

    loop {
        let frame = match transport.receive(idle).await {
            Ok(frame) => frame,
            Err(e) if e.is_timeout() => {
                info!(%peer, "Dropping idle session");
                break;
            }
            Err(e) if e.is_closed() => break,
            Err(e) => {
                warn!(%peer, error = %e, "Discarding bad frame");
                continue;
            }
        };

        let packet = match Packet::decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(%peer, error = %e, "Discarding undecodable packet");
                continue;
            }
        };

        let out = dispatcher.dispatch(packet);
        for reply in &out.replies {
            transport.send(&reply.encode()).await?;
        }
        if out.close {
            break;
        }
    }

    transport.disconnect().await?;
    info!(%peer, "Client disconnected");
    Ok(())
}

/// UDP sessions keyed by peer address
///
/// A peer that goes quiet (a client that gave up and came back from a new
/// port) is evicted once it has been idle for the configured timeout.
struct UdpSessions {
    peers: HashMap<SocketAddr, UdpPeer>,
    idle: Duration,
}

struct UdpPeer {
    dispatcher: SessionDispatcher,
    last_seen: Instant,
}

impl UdpSessions {
    fn new(idle: Duration) -> Self {
        Self {
            peers: HashMap::new(),
            idle,
        }
    }

    fn len(&self) -> usize {
        self.peers.len()
    }

    /// Dispatcher for `peer`, created on first contact
    fn touch(&mut self, ctx: &SimContext, peer: SocketAddr, now: Instant) -> &mut SessionDispatcher {
        let entry = self.peers.entry(peer).or_insert_with(|| {
            debug!(%peer, "New UDP peer");
            UdpPeer {
                dispatcher: SessionDispatcher::new(ctx.clone(), TransportKind::Udp, peer),
                last_seen: now,
            }
        });
        entry.last_seen = now;
        &mut entry.dispatcher
    }

    fn remove(&mut self, peer: &SocketAddr) {
        self.peers.remove(peer);
    }

    /// Drop peers silent for longer than the idle timeout
    fn evict_idle(&mut self, now: Instant) -> usize {
        let before = self.peers.len();
        let idle = self.idle;
        self.peers.retain(|peer, state| {
            let keep = now.saturating_duration_since(state.last_seen) <= idle;
            if !keep {
                info!(%peer, "Dropping idle UDP session");
            }
            keep
        });
        before - self.peers.len()
    }
}

async fn serve_udp(
    ctx: SimContext,
    socket: UdpSocket,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    tokio::pin!(shutdown);
    let idle = Duration::from_secs(ctx.config.idle_timeout_secs);
    let mut sessions = UdpSessions::new(idle);
    let mut sweep = tokio::time::interval(idle);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut buf = vec![0u8; MAX_PACKET_SIZE];

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(sessions = sessions.len(), "Shutting down simulator");
                return Ok(());
            }

            _ = sweep.tick() => {
                let evicted = sessions.evict_idle(Instant::now());
                if evicted > 0 {
                    debug!(evicted, remaining = sessions.len(), "Idle UDP sessions swept");
                }
            }

            received = socket.recv_from(&mut buf) => {
                let (n, peer) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        warn!(error = %e, "UDP receive failed");
                        continue;
                    }
                };

                let packet = match Packet::decode(BytesMut::from(&buf[..n])) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!(%peer, error = %e, "Discarding undecodable datagram");
                        continue;
                    }
                };

                let out = sessions.touch(&ctx, peer, Instant::now()).dispatch(packet);

                for reply in &out.replies {
                    if let Err(e) = socket.send_to(&reply.encode(), peer).await {
                        warn!(%peer, error = %e, "UDP send failed");
                        break;
                    }
                }
                if out.close {
                    sessions.remove(&peer);
                }
            }
        }
    }
}
