//! # zkwire
//!
//! Client for ZKTeco attendance terminals over their binary TCP/UDP protocol.
//!
//! ## Features
//!
//! - Session handshake with CommKey authentication
//! - Reply matching with UDP retransmission
//! - Chunked download of users, attendance logs and fingerprint templates
//! - Uploads of users with their templates
//! - Device control (LCD, door relay, clock, restart)
//!
//! ## Quick Start
//!
//! ```no_run
//! use zkwire::Device;
//!
//! #[tokio::main]
//! async fn main() -> zkwire::Result<()> {
//!     // Connect to device
//!     let mut device = Device::new("192.168.1.201", 4370);
//!     device.connect().await?;
//!
//!     for user in device.list_users().await? {
//!         println!("{}", user);
//!     }
//!
//!     // Disconnect
//!     device.disconnect().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod transfer;

// Re-exports
pub use config::DeviceConfig;
pub use connection::Connection;
pub use device::{Device, UserRef};
pub use error::{Error, Result};

// Re-export types
pub use zkwire_core::{Command, EventFlags, Packet, Session, SessionState, TransportKind};
pub use zkwire_types::{
    AttendanceRecord, Capacity, DeviceInfo, NetworkParams, Privilege, PunchType, TemplateRecord,
    UserLayout, UserRecord, VerifyMode,
};
