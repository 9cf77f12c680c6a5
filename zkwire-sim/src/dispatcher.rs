//! Per-session request handling
//!
//! A [`SessionDispatcher`] owns the state of one client session: the
//! handshake, the staged read buffer, an upload in progress and the last
//! reply (for retransmitted requests). Shared terminal data lives in the
//! [`DeviceStore`](crate::store::DeviceStore).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, trace, warn};
use zkwire_core::{
    auth::verify_commkey,
    constants::{
        data_types::{FCT_ATTLOG, FCT_FINGERTMP, FCT_USER},
        AUTH_TICKS,
    },
    Command, Packet, PendingTransfer, Session, SessionState, TransportKind,
};
use zkwire_types::{
    time::encode_time_bytes, with_size_prefix, TemplateRecord, UserLayout, UserRecord,
};

use crate::bundle::parse_bundle;
use crate::config::SimulatorConfig;
use crate::request::Request;
use crate::store::{DeviceStore, SharedStore};

/// Hands out session ids, never 0
#[derive(Debug)]
pub struct SessionIds(AtomicU16);

impl SessionIds {
    pub fn new(first: u16) -> Self {
        Self(AtomicU16::new(first.max(1)))
    }

    pub fn next(&self) -> u16 {
        loop {
            let id = self.0.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }
}

impl Default for SessionIds {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// What every session of one simulator shares
#[derive(Debug, Clone)]
pub struct SimContext {
    pub config: Arc<SimulatorConfig>,
    pub store: SharedStore,
    pub ids: Arc<SessionIds>,
}

impl SimContext {
    /// Fresh context with a seeded store
    pub fn new(config: SimulatorConfig) -> Self {
        let store = DeviceStore::seeded(&config).shared();
        Self {
            config: Arc::new(config),
            store,
            ids: Arc::new(SessionIds::default()),
        }
    }
}

/// Reply frames for one request
#[derive(Debug, Default)]
pub struct Dispatch {
    pub replies: Vec<Packet>,
    /// The session ended with this request
    pub close: bool,
}

/// The last request handled and what it was answered with
struct Answered {
    request: Packet,
    replies: Vec<Packet>,
}

impl Answered {
    /// A retransmission repeats the request byte for byte
    fn matches(&self, packet: &Packet) -> bool {
        self.request.session_id == packet.session_id
            && self.request.command == packet.command
            && self.request.reply_id == packet.reply_id
            && self.request.payload == packet.payload
    }
}

/// Handles the requests of one client session
pub struct SessionDispatcher {
    ctx: SimContext,
    session: Session,
    read_buffer: Option<Bytes>,
    upload: Option<PendingTransfer>,
    uploaded: Option<Bytes>,
    last: Option<Answered>,
}

impl SessionDispatcher {
    pub fn new(ctx: SimContext, transport: TransportKind, peer: SocketAddr) -> Self {
        Self {
            ctx,
            session: Session::new(transport).with_peer(peer),
            read_buffer: None,
            upload: None,
            uploaded: None,
            last: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Answer one request frame
    pub fn dispatch(&mut self, packet: Packet) -> Dispatch {
        trace!("Request: {:?}", packet);

        if let Some(last) = self.last.as_ref().filter(|last| last.matches(&packet)) {
            debug!("Retransmitted {}, replaying {} frames", packet, last.replies.len());
            return Dispatch {
                replies: last.replies.clone(),
                close: false,
            };
        }

        let request = Request::decode(&packet);
        let reply_id = packet.reply_id;

        let out = if !request.is_handshake() && !self.may_execute() {
            debug!("Rejecting {} before authentication", packet);
            self.ack(Command::AckUnauth, reply_id)
        } else {
            self.handle(request, reply_id)
        };

        if out.close {
            self.session.close();
            self.read_buffer = None;
            self.upload = None;
            self.uploaded = None;
            self.last = None;
        } else if packet.kind() != Some(Command::Connect) {
            self.last = Some(Answered {
                request: packet,
                replies: out.replies.clone(),
            });
        }

        for reply in &out.replies {
            trace!("Reply: {:?}", reply);
        }
        out
    }

    fn may_execute(&self) -> bool {
        match self.session.state() {
            SessionState::Connected => self.ctx.config.password == 0 || self.session.is_authenticated(),
            _ => false,
        }
    }

    fn handle(&mut self, request: Request, reply_id: u16) -> Dispatch {
        match request {
            Request::Connect => self.connect(reply_id),
            Request::Auth { key } => self.auth(&key, reply_id),
            Request::Exit => {
                info!("Session {} closed by client", self.session.session_id());
                Dispatch {
                    close: true,
                    ..self.ack(Command::AckOk, reply_id)
                }
            }
            Request::Restart | Request::PowerOff => {
                info!("Session {} ended by power command", self.session.session_id());
                Dispatch {
                    close: true,
                    ..self.ack(Command::AckOk, reply_id)
                }
            }
            Request::EnableDevice => {
                self.ctx.store.lock().set_enabled(true);
                self.ack(Command::AckOk, reply_id)
            }
            Request::DisableDevice => {
                self.ctx.store.lock().set_enabled(false);
                self.ack(Command::AckOk, reply_id)
            }
            Request::RefreshData
            | Request::StartVerify
            | Request::StartEnroll
            | Request::CancelCapture => self.ack(Command::AckOk, reply_id),
            Request::TestVoice { index } => {
                debug!(index, "Playing voice prompt");
                self.ack(Command::AckOk, reply_id)
            }
            Request::Unlock { tenths } => {
                info!("Door unlocked for {:.1}s", f64::from(tenths) / 10.0);
                self.ack(Command::AckOk, reply_id)
            }
            Request::WriteLcd { line, text } => {
                self.ctx.store.lock().write_lcd(line, text);
                self.ack(Command::AckOk, reply_id)
            }
            Request::ClearLcd => {
                self.ctx.store.lock().clear_lcd();
                self.ack(Command::AckOk, reply_id)
            }
            Request::GetVersion => {
                let mut payload = self.ctx.config.profile.firmware_version.clone().into_bytes();
                payload.push(0);
                self.reply(Command::AckOk, reply_id, payload)
            }
            Request::GetTime => {
                let now = self.ctx.store.lock().now();
                self.reply(Command::AckOk, reply_id, encode_time_bytes(&now).to_vec())
            }
            Request::SetTime { time } => {
                info!("Clock set to {}", time);
                self.ctx.store.lock().set_time(time);
                self.ack(Command::AckOk, reply_id)
            }
            Request::OptionsRead { name } => {
                let payload = match self.ctx.store.lock().option(&name) {
                    Some(value) => format!("{name}={value}\0").into_bytes(),
                    None => Vec::new(),
                };
                self.reply(Command::AckOk, reply_id, payload)
            }
            Request::OptionsWrite { name, value } => {
                debug!("Option {} set to {:?}", name, value);
                self.ctx.store.lock().set_option(name, value);
                self.ack(Command::AckOk, reply_id)
            }
            Request::GetFreeSizes => {
                let capacity = self.ctx.store.lock().capacity();
                self.reply(Command::AckOk, reply_id, capacity.encode())
            }
            Request::GetPinWidth => {
                let width = self.ctx.config.profile.pin_width;
                self.reply(Command::AckOk, reply_id, vec![width])
            }
            Request::ReadUsers => self.data_set_reply(FCT_USER, reply_id),
            Request::ReadAttendance => self.data_set_reply(FCT_ATTLOG, reply_id),
            Request::ReadDb { fct } => self.data_set_reply(fct, reply_id),
            Request::PrepareBuffer { command, fct, ext } => {
                self.prepare_buffer(command, fct, ext, reply_id)
            }
            Request::ReadBuffer { start, size } => self.read_buffer(start, size, reply_id),
            Request::FreeData => {
                self.read_buffer = None;
                self.upload = None;
                self.uploaded = None;
                self.ack(Command::AckOk, reply_id)
            }
            Request::PrepareData { size } => {
                debug!(size, "Upload announced");
                if size == 0 {
                    self.upload = None;
                    self.uploaded = Some(Bytes::new());
                } else {
                    self.upload = Some(PendingTransfer::new(size));
                    self.uploaded = None;
                }
                self.ack(Command::AckOk, reply_id)
            }
            Request::Data { chunk } => self.upload_chunk(chunk, reply_id),
            Request::SaveUserTemps => self.save_user_templates(reply_id),
            Request::WriteUser { record } => self.write_user(&record, reply_id),
            Request::DeleteUser { uid } => {
                if self.ctx.store.lock().delete_user(uid) {
                    info!("Deleted user {}", uid);
                    self.ack(Command::AckOk, reply_id)
                } else {
                    self.ack(Command::AckError, reply_id)
                }
            }
            Request::DeleteTemplate { uid, finger_index } => {
                if self.ctx.store.lock().delete_template(uid, finger_index) {
                    self.ack(Command::AckOk, reply_id)
                } else {
                    self.ack(Command::AckError, reply_id)
                }
            }
            Request::GetUserTemplate { uid, finger_index } => {
                let encoded = self
                    .ctx
                    .store
                    .lock()
                    .template(uid, finger_index)
                    .map(TemplateRecord::encode);
                match encoded {
                    Some(Ok(bytes)) => self.reply(Command::Data, reply_id, bytes),
                    _ => self.ack(Command::AckError, reply_id),
                }
            }
            Request::ClearAttendance => {
                info!("Attendance log cleared");
                self.ctx.store.lock().clear_attendance();
                self.ack(Command::AckOk, reply_id)
            }
            Request::ClearData => {
                info!("All data cleared");
                self.ctx.store.lock().clear_data();
                self.ack(Command::AckOk, reply_id)
            }
            Request::RegisterEvents { flags } => {
                debug!(?flags, "Events registered");
                self.ctx.store.lock().set_events(flags);
                self.ack(Command::AckOk, reply_id)
            }
            Request::Malformed(command) => {
                warn!("Malformed {} request", command);
                self.ack(Command::AckError, reply_id)
            }
            Request::Unsupported(command) => {
                warn!("Unsupported command {}", command);
                self.ack(Command::AckError, reply_id)
            }
            Request::Unknown(code) => {
                warn!("Unknown command code {}", code);
                self.ack(Command::AckError, reply_id)
            }
        }
    }

    fn connect(&mut self, reply_id: u16) -> Dispatch {
        self.session.close();
        self.read_buffer = None;
        self.upload = None;
        self.uploaded = None;
        self.last = None;

        if let Err(e) = self.session.begin_connect() {
            warn!("Handshake failed: {}", e);
            return self.ack(Command::AckError, reply_id);
        }
        let session_id = self.ctx.ids.next();
        self.session.assign_id(session_id);

        if self.ctx.config.password == 0 {
            if let Err(e) = self.session.establish(false) {
                warn!("Handshake failed: {}", e);
                return self.ack(Command::AckError, reply_id);
            }
            info!("Session {} connected", session_id);
            self.ack(Command::AckOk, reply_id)
        } else {
            debug!("Session {} awaiting CommKey", session_id);
            self.ack(Command::AckUnauth, reply_id)
        }
    }

    fn auth(&mut self, key: &[u8], reply_id: u16) -> Dispatch {
        let password = self.ctx.config.password;
        let session_id = self.session.session_id();

        match self.session.state() {
            SessionState::Connecting => {}
            SessionState::Connected => return self.ack(Command::AckOk, reply_id),
            _ => return self.ack(Command::AckUnauth, reply_id),
        }

        if password != 0 && !verify_commkey(key, password, session_id, AUTH_TICKS) {
            warn!("Session {} sent a wrong CommKey", session_id);
            return self.ack(Command::AckUnauth, reply_id);
        }

        match self.session.establish(password != 0) {
            Ok(()) => {
                info!("Session {} authenticated", session_id);
                self.ack(Command::AckOk, reply_id)
            }
            Err(e) => {
                warn!("Handshake failed: {}", e);
                self.ack(Command::AckError, reply_id)
            }
        }
    }

    /// Data set selected by a function code, with its size prefix
    fn data_set(&self, fct: u8) -> Option<Vec<u8>> {
        let store = self.ctx.store.lock();
        let data = match fct {
            FCT_USER => store.users_data(),
            FCT_ATTLOG => store.attendance_data(),
            FCT_FINGERTMP => store.templates_data(),
            // operation log and unknown codes have nothing to report
            _ => {
                debug!("Empty data set for function code {}", fct);
                Ok(with_size_prefix(&[]))
            }
        };
        match data {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Failed to encode data set {}: {}", fct, e);
                None
            }
        }
    }

    fn data_set_reply(&mut self, fct: u8, reply_id: u16) -> Dispatch {
        match self.data_set(fct) {
            Some(data) => self.reply(Command::Data, reply_id, data),
            None => self.ack(Command::AckError, reply_id),
        }
    }

    fn prepare_buffer(&mut self, command: u16, fct: u8, ext: u32, reply_id: u16) -> Dispatch {
        debug!(command, fct, ext, "Staging data set");

        let Some(data) = self.data_set(fct) else {
            return self.ack(Command::AckError, reply_id);
        };

        if data.len() <= self.ctx.config.inline_limit {
            return self.reply(Command::Data, reply_id, data);
        }

        let mut payload = vec![0u8];
        payload.extend_from_slice(&(data.len() as u32).to_le_bytes());
        debug!(size = data.len(), "Data set staged for READ_BUFFER");
        self.read_buffer = Some(Bytes::from(data));
        self.reply(Command::AckOk, reply_id, payload)
    }

    fn read_buffer(&mut self, start: u32, size: u32, reply_id: u16) -> Dispatch {
        let Some(buffer) = &self.read_buffer else {
            warn!("READ_BUFFER without a staged data set");
            return self.ack(Command::AckError, reply_id);
        };

        let start = start as usize;
        let end = start.saturating_add(size as usize).min(buffer.len());
        if start >= end {
            return self.ack(Command::AckError, reply_id);
        }
        let chunk = buffer.slice(start..end);
        trace!(start, len = chunk.len(), "Serving chunk");

        let frame_size = self.ctx.config.data_frame_size;
        if chunk.len() <= frame_size {
            return self.reply(Command::Data, reply_id, chunk);
        }

        let session_id = self.session.session_id();
        let mut replies = Vec::with_capacity(chunk.len().div_ceil(frame_size) + 2);
        replies.push(Packet::with_payload(
            Command::PrepareData,
            session_id,
            reply_id,
            (chunk.len() as u32).to_le_bytes().to_vec(),
        ));
        let mut offset = 0;
        while offset < chunk.len() {
            let next = (offset + frame_size).min(chunk.len());
            replies.push(Packet::with_payload(
                Command::Data,
                session_id,
                reply_id,
                chunk.slice(offset..next),
            ));
            offset = next;
        }
        replies.push(Packet::new(Command::AckOk, session_id, reply_id));

        Dispatch {
            replies,
            close: false,
        }
    }

    fn upload_chunk(&mut self, chunk: Bytes, reply_id: u16) -> Dispatch {
        let Some(upload) = self.upload.as_mut() else {
            warn!("DATA without PREPARE_DATA");
            return self.ack(Command::AckError, reply_id);
        };

        if let Err(e) = upload.push(chunk) {
            warn!("Upload aborted: {}", e);
            self.upload = None;
            return self.ack(Command::AckError, reply_id);
        }

        if upload.is_complete() {
            match self.upload.take().map(PendingTransfer::finish) {
                Some(Ok(data)) => {
                    debug!(size = data.len(), "Upload complete");
                    self.uploaded = Some(data);
                }
                Some(Err(e)) => {
                    warn!("Upload aborted: {}", e);
                    return self.ack(Command::AckError, reply_id);
                }
                None => {}
            }
        }
        self.ack(Command::AckOk, reply_id)
    }

    fn save_user_templates(&mut self, reply_id: u16) -> Dispatch {
        let Some(data) = self.uploaded.take() else {
            warn!("SAVE_USERTEMPS without a complete upload");
            return self.ack(Command::AckError, reply_id);
        };

        let bundle = match parse_bundle(&data) {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!("Rejected upload bundle: {}", e);
                return self.ack(Command::AckError, reply_id);
            }
        };

        info!(
            users = bundle.users.len(),
            templates = bundle.templates.len(),
            "Saving uploaded users and templates"
        );

        let mut store = self.ctx.store.lock();
        for user in bundle.users {
            store.upsert_user(user);
        }
        for template in bundle.templates {
            store.upsert_template(template);
        }
        drop(store);

        self.ack(Command::AckOk, reply_id)
    }

    fn write_user(&mut self, record: &[u8], reply_id: u16) -> Dispatch {
        let layout = if record.len() >= UserLayout::Extended.record_size() {
            UserLayout::Extended
        } else if record.len() >= UserLayout::Compact.record_size() {
            UserLayout::Compact
        } else {
            warn!("USER_WRQ record of {} bytes is too short", record.len());
            return self.ack(Command::AckError, reply_id);
        };

        match UserRecord::decode(record, layout) {
            Ok(user) => {
                info!("Saved {}", user);
                self.ctx.store.lock().upsert_user(user);
                self.ack(Command::AckOk, reply_id)
            }
            Err(e) => {
                warn!("Rejected user record: {}", e);
                self.ack(Command::AckError, reply_id)
            }
        }
    }

    fn ack(&self, command: Command, reply_id: u16) -> Dispatch {
        self.reply(command, reply_id, Bytes::new())
    }

    fn reply(&self, command: Command, reply_id: u16, payload: impl Into<Bytes>) -> Dispatch {
        Dispatch {
            replies: vec![Packet::with_payload(
                command,
                self.session.session_id(),
                reply_id,
                payload,
            )],
            close: false,
        }
    }
}
