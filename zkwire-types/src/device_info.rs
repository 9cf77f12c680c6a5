//! Device information structures

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Device information
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    /// Device serial number
    pub serial_number: String,

    /// Firmware version
    pub firmware_version: String,

    /// Platform name
    pub platform: Option<String>,

    /// Device name (user-assigned)
    pub device_name: Option<String>,

    /// MAC address
    pub mac_address: Option<String>,

    /// Width of the enrollment number keypad field
    pub pin_width: Option<u8>,
}

impl DeviceInfo {
    pub fn new(serial_number: impl Into<String>, firmware_version: impl Into<String>) -> Self {
        Self {
            serial_number: serial_number.into(),
            firmware_version: firmware_version.into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device[SN: {}, FW: {}",
            self.serial_number, self.firmware_version
        )?;
        if let Some(platform) = &self.platform {
            write!(f, ", Platform: {}", platform)?;
        }
        if let Some(name) = &self.device_name {
            write!(f, ", Name: {}", name)?;
        }
        write!(f, "]")
    }
}

/// Network settings reported through device options
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NetworkParams {
    pub ip: String,
    pub netmask: String,
    pub gateway: String,
}

/// Split an option reply of the form `name=value\0`
///
/// Returns an empty string when the device does not know the option.
///
/// ```
/// use zkwire_types::device_info::parse_option;
///
/// assert_eq!(parse_option(b"~Platform=ZEM560\0"), "ZEM560");
/// assert_eq!(parse_option(b""), "");
/// ```
pub fn parse_option(payload: &[u8]) -> String {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    let text = String::from_utf8_lossy(&payload[..end]);
    match text.split_once('=') {
        Some((_, value)) => value.to_string(),
        None => String::new(),
    }
}

/// Record counters and capacities from CMD_GET_FREE_SIZES
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Capacity {
    pub users: i32,
    pub fingers: i32,
    pub records: i32,
    pub cards: i32,
    pub fingers_cap: i32,
    pub users_cap: i32,
    pub records_cap: i32,
    pub fingers_available: i32,
    pub users_available: i32,
    pub records_available: i32,
    pub faces: i32,
    pub faces_cap: i32,
}

impl Capacity {
    /// Size of the counter block without face counters
    pub const BASE_SIZE: usize = 80;

    /// Size of the counter block with face counters
    pub const FULL_SIZE: usize = 92;

    /// Decode the counter block
    ///
    /// Face counters are read when present.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::BASE_SIZE {
            return Err(Error::MalformedRecord {
                record: "capacity",
                expected: Self::BASE_SIZE,
                actual: data.len(),
            });
        }

        let mut fields = [0i32; 20];
        LittleEndian::read_i32_into(&data[..Self::BASE_SIZE], &mut fields);

        let mut capacity = Self {
            users: fields[4],
            fingers: fields[6],
            records: fields[8],
            cards: fields[12],
            fingers_cap: fields[14],
            users_cap: fields[15],
            records_cap: fields[16],
            fingers_available: fields[17],
            users_available: fields[18],
            records_available: fields[19],
            ..Self::default()
        };

        if data.len() >= Self::FULL_SIZE {
            let mut faces = [0i32; 3];
            LittleEndian::read_i32_into(&data[Self::BASE_SIZE..Self::FULL_SIZE], &mut faces);
            capacity.faces = faces[0];
            capacity.faces_cap = faces[2];
        }

        Ok(capacity)
    }

    /// Encode the full 92-byte block
    pub fn encode(&self) -> Vec<u8> {
        let mut fields = [0i32; 23];
        fields[4] = self.users;
        fields[6] = self.fingers;
        fields[8] = self.records;
        fields[12] = self.cards;
        fields[14] = self.fingers_cap;
        fields[15] = self.users_cap;
        fields[16] = self.records_cap;
        fields[17] = self.fingers_available;
        fields[18] = self.users_available;
        fields[19] = self.records_available;
        fields[20] = self.faces;
        fields[22] = self.faces_cap;

        let mut out = vec![0u8; Self::FULL_SIZE];
        LittleEndian::write_i32_into(&fields, &mut out);
        out
    }
}
