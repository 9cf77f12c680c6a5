//! Client recovery over a link that loses or cuts replies
//!
//! The simulated terminal runs in-process behind a fake UDP transport, so
//! the tests control exactly which reply goes missing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use byteorder::{ByteOrder, LittleEndian};
use bytes::BytesMut;
use pretty_assertions::assert_eq;
use zkwire::{Command, Device, DeviceConfig, Error, Packet, SessionState, TransportKind, UserRef};
use zkwire_sim::{SessionDispatcher, SimContext, SimulatorConfig};
use zkwire_transport::{Error as TransportError, Result as TransportResult, Transport};

/// Picks a request by its command and payload
type Rule = fn(&Packet) -> bool;

struct LossyLink {
    kind: TransportKind,
    dispatcher: SessionDispatcher,
    inbox: VecDeque<BytesMut>,
    connected: bool,
    /// Replies to the first request matching this rule are dropped
    lose: Option<Rule>,
    /// The link goes down after the first request matching this rule
    cut: Option<Rule>,
    /// Requests matching this rule are never answered
    silent: Option<Rule>,
    down: bool,
    sent: Arc<Mutex<Vec<Packet>>>,
}

impl LossyLink {
    fn new(ctx: SimContext, kind: TransportKind, sent: Arc<Mutex<Vec<Packet>>>) -> Self {
        let peer = "127.0.0.1:4370".parse().unwrap();
        Self {
            kind,
            dispatcher: SessionDispatcher::new(ctx, kind, peer),
            inbox: VecDeque::new(),
            connected: false,
            lose: None,
            cut: None,
            silent: None,
            down: false,
            sent,
        }
    }
}

#[async_trait]
impl Transport for LossyLink {
    async fn connect(&mut self) -> TransportResult<()> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        self.connected = false;
        self.inbox.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send(&mut self, frame: &[u8]) -> TransportResult<()> {
        if self.down {
            return Ok(());
        }

        let packet = Packet::decode(BytesMut::from(frame))?;
        self.sent.lock().unwrap().push(packet.clone());

        let lost = self.lose.is_some_and(|rule| rule(&packet));
        let cut = self.cut.is_some_and(|rule| rule(&packet));
        let silent = self.silent.is_some_and(|rule| rule(&packet));
        let out = self.dispatcher.dispatch(packet);

        if cut {
            self.cut = None;
            self.down = true;
            return Ok(());
        }
        if lost {
            self.lose = None;
            return Ok(());
        }
        if silent {
            return Ok(());
        }
        self.inbox.extend(out.replies.iter().map(Packet::encode));
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> TransportResult<BytesMut> {
        if self.down {
            return Err(TransportError::ConnectionClosed);
        }
        match self.inbox.pop_front() {
            Some(frame) => Ok(frame),
            None => {
                tokio::time::sleep(timeout).await;
                Err(TransportError::ReadTimeout)
            }
        }
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn remote_addr(&self) -> String {
        "lossy-link".to_string()
    }
}

fn read_buffer_start(packet: &Packet) -> Option<u32> {
    (packet.kind() == Some(Command::ReadBuffer)).then(|| LittleEndian::read_u32(&packet.payload[..4]))
}

fn second_chunk(packet: &Packet) -> bool {
    read_buffer_start(packet) == Some(50)
}

fn third_chunk(packet: &Packet) -> bool {
    read_buffer_start(packet) == Some(100)
}

fn chunked() -> SimContext {
    SimContext::new(SimulatorConfig {
        inline_limit: 0,
        transport: TransportKind::Udp,
        ..SimulatorConfig::default()
    })
}

fn device(link: LossyLink) -> Device {
    let config = DeviceConfig::new("lossy-link", 4370, link.kind);
    Device::from_transport(Box::new(link), config)
        .with_omit_ping(true)
        .with_chunk_size(50)
}

fn read_buffer_starts(sent: &Mutex<Vec<Packet>>) -> Vec<u32> {
    sent.lock()
        .unwrap()
        .iter()
        .filter_map(read_buffer_start)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_lost_chunk_is_requested_again() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let mut link = LossyLink::new(chunked(), TransportKind::Udp, sent.clone());
    link.lose = Some(third_chunk);
    let mut device = device(link);

    device.connect().await.unwrap();
    let users = device.list_users().await.unwrap();

    assert_eq!(users.iter().map(|u| u.uid).collect::<Vec<_>>(), vec![1, 2, 3]);
    // 220 bytes in chunks of 50; the third chunk went out twice
    assert_eq!(read_buffer_starts(&sent), vec![0, 50, 100, 100, 150, 200]);
    assert!(device.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_retransmitted_delete_is_answered_from_cache() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let ctx = chunked();
    let store = ctx.store.clone();
    let mut link = LossyLink::new(ctx, TransportKind::Udp, sent.clone());
    link.lose = Some(|p| p.kind() == Some(Command::DeleteUser));
    let mut device = device(link);

    device.connect().await.unwrap();
    device.delete_user(UserRef::Uid(3)).await.unwrap();

    let deletes: Vec<u16> = sent
        .lock()
        .unwrap()
        .iter()
        .filter(|p| p.kind() == Some(Command::DeleteUser))
        .map(|p| p.reply_id)
        .collect();
    assert_eq!(deletes.len(), 2);
    assert_eq!(deletes[0], deletes[1]);
    assert!(store.lock().user(3).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_link_lost_mid_transfer() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let mut link = LossyLink::new(chunked(), TransportKind::Udp, sent.clone());
    link.cut = Some(second_chunk);
    let mut device = device(link);

    device.connect().await.unwrap();
    let result = device.list_users().await;

    // the dropped link aborts the read as a whole
    assert!(matches!(&result, Err(Error::Transfer(reason)) if reason.contains("closed")));
    assert!(!device.is_connected());
    assert_eq!(device.session().state(), SessionState::Disconnected);
    assert_eq!(read_buffer_starts(&sent), vec![0, 50]);
}

fn get_time(packet: &Packet) -> bool {
    packet.kind() == Some(Command::GetTime)
}

async fn unanswered_heartbeat(kind: TransportKind) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let mut link = LossyLink::new(chunked(), kind, sent.clone());
    link.silent = Some(get_time);
    let mut device = device(link);

    device.connect().await.unwrap();
    let result = device.heartbeat().await;

    assert!(matches!(result, Err(Error::ConnectionLost)));
    assert!(!device.is_connected());
    assert_eq!(device.session().state(), SessionState::Disconnected);

    let probes = sent.lock().unwrap().iter().filter(|p| get_time(p)).count();
    let expected = match kind {
        TransportKind::Udp => device.config().max_retries + 1,
        TransportKind::Tcp => 1,
    };
    assert_eq!(probes, expected);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_heartbeat_over_udp() {
    unanswered_heartbeat(TransportKind::Udp).await;
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_heartbeat_over_tcp() {
    unanswered_heartbeat(TransportKind::Tcp).await;
}
