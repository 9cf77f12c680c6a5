//! Protocol constants

use std::time::Duration;

/// TCP start marker, two little-endian words (`50 50 82 7D` on the wire)
pub const TCP_MAGIC_1: u16 = 0x5050;
pub const TCP_MAGIC_2: u16 = 0x7D82;

/// Default device port
pub const DEFAULT_PORT: u16 = 4370;

/// Default connection timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum retransmissions of a UDP request
pub const MAX_RETRIES: usize = 3;

/// Reply id stamped on CMD_CONNECT
pub const CONNECT_REPLY_ID: u16 = 0;

/// Ticks value mixed into the CommKey
pub const AUTH_TICKS: u8 = 50;

/// Largest chunk requested per CMD_READ_BUFFER over TCP
pub const MAX_CHUNK_TCP: u32 = 0xFFC0;

/// Largest chunk requested per CMD_READ_BUFFER over UDP
pub const MAX_CHUNK_UDP: u32 = 16 * 1024;

/// Largest payload of a single CMD_DATA frame during uploads and streamed chunks
pub const DATA_FRAME_SIZE: usize = 1024;

/// Data set selectors used with CMD_PREPARE_BUFFER / CMD_DB_RRQ
pub mod data_types {
    /// Attendance log
    pub const FCT_ATTLOG: u8 = 1;

    /// Fingerprint template
    pub const FCT_FINGERTMP: u8 = 2;

    /// Operation log
    pub const FCT_OPLOG: u8 = 4;

    /// User record
    pub const FCT_USER: u8 = 5;
}

bitflags::bitflags! {
    /// Real-time event flags registered with CMD_REG_EVENT
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EventFlags: u32 {
        const ATTLOG = 1;
        const FINGER = 1 << 1;
        const ENROLL_USER = 1 << 2;
        const ENROLL_FINGER = 1 << 3;
        const BUTTON = 1 << 4;
        const UNLOCK = 1 << 5;
        const VERIFY = 1 << 7;
        const FINGER_FEATURE = 1 << 8;
        const ALARM = 1 << 9;
    }
}
