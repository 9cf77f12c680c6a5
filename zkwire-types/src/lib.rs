//! Record types and binary codecs for zkwire
//!
//! Every data set a terminal exchanges (users, attendance, fingerprint
//! templates, capacity counters) has a fixed little-endian layout. This crate
//! converts between those layouts and typed records.

pub mod attendance;
pub mod device_info;
pub mod error;
pub mod template;
pub mod time;
pub mod user;

mod fields;

pub use attendance::{AttendanceRecord, PunchType, VerifyMode};
pub use device_info::{Capacity, DeviceInfo, NetworkParams};
pub use error::{Error, Result};
pub use template::TemplateRecord;
pub use user::{Privilege, UserLayout, UserRecord};

/// Strip the u32 total-size prefix of a data set
///
/// Returns the bytes after the prefix, limited to the announced size.
///
/// ```
/// let body = zkwire_types::strip_size_prefix(&[3, 0, 0, 0, 7, 8, 9]).unwrap();
/// assert_eq!(body, &[7, 8, 9]);
/// ```
pub fn strip_size_prefix(data: &[u8]) -> Result<&[u8]> {
    if data.len() < 4 {
        return Err(Error::MalformedRecord {
            record: "data set",
            expected: 4,
            actual: data.len(),
        });
    }
    let announced = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let body = &data[4..];
    if body.len() < announced {
        return Err(Error::MalformedRecord {
            record: "data set",
            expected: announced,
            actual: body.len(),
        });
    }
    Ok(&body[..announced])
}

/// Prefix a data set body with its u32 size
pub fn with_size_prefix(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 4);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    out
}
