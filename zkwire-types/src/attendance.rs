//! Attendance log records
//!
//! Each record is 40 bytes: uid u16, user_id 24s, verify mode u8, packed
//! time u32, punch u8, 8 reserved bytes.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use chrono::NaiveDateTime;

use crate::{
    error::{Error, Result},
    fields::{read_str, write_str},
    time::{decode_time, encode_time},
};

/// Width of one attendance record
pub const ATTENDANCE_RECORD_SIZE: usize = 40;

/// How the user proved their identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VerifyMode {
    Password,
    #[default]
    Fingerprint,
    Card,
    Face,
    Other(u8),
}

impl From<u8> for VerifyMode {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Password,
            1 => Self::Fingerprint,
            2 => Self::Card,
            15 => Self::Face,
            other => Self::Other(other),
        }
    }
}

impl From<VerifyMode> for u8 {
    fn from(value: VerifyMode) -> u8 {
        match value {
            VerifyMode::Password => 0,
            VerifyMode::Fingerprint => 1,
            VerifyMode::Card => 2,
            VerifyMode::Face => 15,
            VerifyMode::Other(other) => other,
        }
    }
}

/// Punch state selected on the keypad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PunchType {
    #[default]
    CheckIn,
    CheckOut,
    BreakOut,
    BreakIn,
    OvertimeIn,
    OvertimeOut,
    Other(u8),
}

impl From<u8> for PunchType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::CheckIn,
            1 => Self::CheckOut,
            2 => Self::BreakOut,
            3 => Self::BreakIn,
            4 => Self::OvertimeIn,
            5 => Self::OvertimeOut,
            other => Self::Other(other),
        }
    }
}

impl From<PunchType> for u8 {
    fn from(value: PunchType) -> u8 {
        match value {
            PunchType::CheckIn => 0,
            PunchType::CheckOut => 1,
            PunchType::BreakOut => 2,
            PunchType::BreakIn => 3,
            PunchType::OvertimeIn => 4,
            PunchType::OvertimeOut => 5,
            PunchType::Other(other) => other,
        }
    }
}

/// One attendance punch
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttendanceRecord {
    pub uid: u16,
    pub user_id: String,
    pub timestamp: NaiveDateTime,
    pub status: VerifyMode,
    pub punch: PunchType,
}

impl AttendanceRecord {
    /// Decode one 40-byte record
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < ATTENDANCE_RECORD_SIZE {
            return Err(Error::MalformedRecord {
                record: "attendance",
                expected: ATTENDANCE_RECORD_SIZE,
                actual: data.len(),
            });
        }

        Ok(Self {
            uid: LittleEndian::read_u16(&data[0..2]),
            user_id: read_str(&data[2..26]),
            status: VerifyMode::from(data[26]),
            timestamp: decode_time(LittleEndian::read_u32(&data[27..31]))?,
            punch: PunchType::from(data[31]),
        })
    }

    /// Encode one 40-byte record
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(ATTENDANCE_RECORD_SIZE);
        out.extend_from_slice(&self.uid.to_le_bytes());
        write_str(&mut out, &self.user_id, 24, "user_id")?;
        out.push(self.status.into());
        out.extend_from_slice(&encode_time(&self.timestamp).to_le_bytes());
        out.push(self.punch.into());
        out.resize(ATTENDANCE_RECORD_SIZE, 0);
        Ok(out)
    }
}

impl fmt::Display for AttendanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Attendance[{} uid={} at {} ({:?}, {:?})]",
            self.user_id, self.uid, self.timestamp, self.punch, self.status
        )
    }
}

/// Decode an attendance data set body (size prefix already stripped)
pub fn decode_attendance(body: &[u8]) -> Result<Vec<AttendanceRecord>> {
    let mut chunks = body.chunks_exact(ATTENDANCE_RECORD_SIZE);
    let records = chunks
        .by_ref()
        .map(AttendanceRecord::decode)
        .collect::<Result<Vec<_>>>()?;

    let rest = chunks.remainder();
    if !rest.is_empty() {
        return Err(Error::MalformedRecord {
            record: "attendance",
            expected: ATTENDANCE_RECORD_SIZE,
            actual: rest.len(),
        });
    }
    Ok(records)
}

/// Encode attendance records back to back
pub fn encode_attendance(records: &[AttendanceRecord]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(records.len() * ATTENDANCE_RECORD_SIZE);
    for record in records {
        out.extend_from_slice(&record.encode()?);
    }
    Ok(out)
}
