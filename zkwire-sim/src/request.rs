//! Decoded client requests
//!
//! Every command the simulator understands has its own variant carrying
//! its parsed arguments. Codes outside that set still decode, as
//! [`Request::Unsupported`] or [`Request::Unknown`], so the dispatcher can
//! answer them.

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use chrono::NaiveDateTime;
use zkwire_core::{constants::data_types::FCT_FINGERTMP, Command, EventFlags, Packet};
use zkwire_types::time::decode_time_bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Connect,
    Exit,
    Auth { key: Bytes },
    EnableDevice,
    DisableDevice,
    Restart,
    PowerOff,
    RefreshData,
    TestVoice { index: u32 },
    GetVersion,
    GetTime,
    SetTime { time: NaiveDateTime },
    OptionsRead { name: String },
    OptionsWrite { name: String, value: String },
    GetFreeSizes,
    GetPinWidth,
    ReadUsers,
    ReadAttendance,
    ReadDb { fct: u8 },
    PrepareBuffer { command: u16, fct: u8, ext: u32 },
    ReadBuffer { start: u32, size: u32 },
    FreeData,
    PrepareData { size: u32 },
    Data { chunk: Bytes },
    SaveUserTemps,
    WriteUser { record: Bytes },
    DeleteUser { uid: u16 },
    DeleteTemplate { uid: u16, finger_index: u8 },
    GetUserTemplate { uid: u16, finger_index: u8 },
    ClearAttendance,
    ClearData,
    Unlock { tenths: u32 },
    StartVerify,
    StartEnroll,
    CancelCapture,
    WriteLcd { line: u16, text: String },
    ClearLcd,
    RegisterEvents { flags: EventFlags },
    /// Known command whose payload is too short for its arguments
    Malformed(Command),
    /// Known command the simulator does not implement
    Unsupported(Command),
    /// Code outside the command table
    Unknown(u16),
}

impl Request {
    pub fn decode(packet: &Packet) -> Self {
        let Some(command) = packet.kind() else {
            return Self::Unknown(packet.command);
        };
        let p = &packet.payload;

        let request = match command {
            Command::Connect => Some(Self::Connect),
            Command::Exit => Some(Self::Exit),
            Command::Auth => (p.len() >= 4).then(|| Self::Auth { key: p.slice(..4) }),
            Command::EnableDevice => Some(Self::EnableDevice),
            Command::DisableDevice => Some(Self::DisableDevice),
            Command::Restart => Some(Self::Restart),
            Command::PowerOff => Some(Self::PowerOff),
            Command::RefreshData => Some(Self::RefreshData),
            Command::TestVoice => Some(Self::TestVoice {
                index: read_u32(p, 0).unwrap_or(0),
            }),
            Command::GetVersion => Some(Self::GetVersion),
            Command::GetTime => Some(Self::GetTime),
            Command::SetTime => decode_time_bytes(p).ok().map(|time| Self::SetTime { time }),
            Command::OptionsRrq => Some(Self::OptionsRead { name: text(p) }),
            Command::OptionsWrq => text(p).split_once('=').map(|(name, value)| Self::OptionsWrite {
                name: name.to_string(),
                value: value.to_string(),
            }),
            Command::GetFreeSizes => Some(Self::GetFreeSizes),
            Command::GetPinWidth => Some(Self::GetPinWidth),
            Command::UserTempRrq => Some(Self::ReadUsers),
            Command::AttLogRrq => Some(Self::ReadAttendance),
            Command::DbRrq => Some(Self::ReadDb {
                fct: p.first().copied().unwrap_or(FCT_FINGERTMP),
            }),
            Command::PrepareBuffer => (p.len() >= 11).then(|| Self::PrepareBuffer {
                command: LittleEndian::read_u16(&p[1..3]),
                fct: p[3],
                ext: LittleEndian::read_u32(&p[7..11]),
            }),
            Command::ReadBuffer => read_u32(p, 0)
                .zip(read_u32(p, 4))
                .map(|(start, size)| Self::ReadBuffer { start, size }),
            Command::FreeData => Some(Self::FreeData),
            Command::PrepareData => read_u32(p, 0).map(|size| Self::PrepareData { size }),
            Command::Data => Some(Self::Data { chunk: p.clone() }),
            Command::SaveUserTemps => Some(Self::SaveUserTemps),
            Command::UserWrq => Some(Self::WriteUser { record: p.clone() }),
            Command::DeleteUser => read_u16(p, 0).map(|uid| Self::DeleteUser { uid }),
            Command::DeleteUserTemp => uid_finger(p)
                .map(|(uid, finger_index)| Self::DeleteTemplate { uid, finger_index }),
            Command::GetUserTemp => uid_finger(p)
                .map(|(uid, finger_index)| Self::GetUserTemplate { uid, finger_index }),
            Command::ClearAttLog => Some(Self::ClearAttendance),
            Command::ClearData => Some(Self::ClearData),
            Command::Unlock => Some(Self::Unlock {
                tenths: read_u32(p, 0).unwrap_or(0),
            }),
            Command::StartVerify => Some(Self::StartVerify),
            Command::StartEnroll => Some(Self::StartEnroll),
            Command::CancelCapture => Some(Self::CancelCapture),
            Command::WriteLcd => read_u16(p, 0).map(|line| Self::WriteLcd {
                line,
                text: String::from_utf8_lossy(p.get(4..).unwrap_or_default()).into_owned(),
            }),
            Command::ClearLcd => Some(Self::ClearLcd),
            Command::RegEvent => read_u32(p, 0).map(|bits| Self::RegisterEvents {
                flags: EventFlags::from_bits_truncate(bits),
            }),
            other => return Self::Unsupported(other),
        };

        request.unwrap_or(Self::Malformed(command))
    }

    /// Allowed before the session has authenticated
    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::Connect | Self::Auth { .. } | Self::Exit)
    }
}

fn read_u16(p: &[u8], at: usize) -> Option<u16> {
    p.get(at..at + 2).map(LittleEndian::read_u16)
}

fn read_u32(p: &[u8], at: usize) -> Option<u32> {
    p.get(at..at + 4).map(LittleEndian::read_u32)
}

fn uid_finger(p: &[u8]) -> Option<(u16, u8)> {
    Some((read_u16(p, 0)?, *p.get(2)?))
}

/// NUL-terminated text argument
fn text(p: &[u8]) -> String {
    let end = p.iter().position(|&b| b == 0).unwrap_or(p.len());
    String::from_utf8_lossy(&p[..end]).into_owned()
}
