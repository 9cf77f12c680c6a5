//! # zkwire-core
//!
//! Core protocol implementation for ZKTeco biometric devices.
//!
//! This crate provides the low-level protocol primitives:
//! - Packet structure and encoding/decoding
//! - Checksum calculation
//! - TCP stream framing
//! - Command definitions
//! - Session state machine
//! - Chunked transfer reassembly
//! - CommKey authentication

pub mod auth;
pub mod checksum;
pub mod command;
pub mod constants;
pub mod error;
pub mod framing;
pub mod packet;
pub mod session;
pub mod transfer;

pub use checksum::{Checksum, OnesComplement};
pub use command::Command;
pub use constants::EventFlags;
pub use error::{Error, Result};
pub use framing::FrameDecoder;
pub use packet::Packet;
pub use session::{Session, SessionState, TransportKind};
pub use transfer::{Accepted, ChunkPlan, ChunkRequest, PendingTransfer};

/// Maximum packet size (64KB)
pub const MAX_PACKET_SIZE: usize = 65535;
