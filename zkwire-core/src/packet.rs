//! Protocol packet structure and encoding/decoding

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    checksum::{Checksum, OnesComplement},
    command::Command,
    error::{Error, Result},
};

/// Protocol packet
///
/// # Packet Structure
///
/// ```text
/// ┌─────────────┬─────────────┬─────────────┬─────────────┬─────────────┐
/// │   Command   │  Checksum   │  SessionID  │  ReplyID    │   Payload   │
/// │   2 bytes   │   2 bytes   │   2 bytes   │   2 bytes   │   N bytes   │
/// │ (LE u16)    │  (LE u16)   │  (LE u16)   │  (LE u16)   │   (bytes)   │
/// └─────────────┴─────────────┴─────────────┴─────────────┴─────────────┘
/// ```
///
/// The command is kept as the raw wire value so that codes outside
/// [`Command`] survive decoding; use [`Packet::kind`] to classify it.
///
/// # Examples
///
/// ```
/// use zkwire_core::{Packet, Command};
///
/// let packet = Packet::new(Command::Connect, 0, 0);
/// let encoded = packet.encode();
///
/// let decoded = Packet::decode(encoded).unwrap();
/// assert_eq!(decoded.kind(), Some(Command::Connect));
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    /// Command code
    pub command: u16,

    /// Session identifier (assigned by device on connect)
    pub session_id: u16,

    /// Reply number (increments per command in session)
    pub reply_id: u16,

    /// Packet payload (command-specific data)
    pub payload: Bytes,
}

impl Packet {
    /// Packet header size in bytes
    pub const HEADER_SIZE: usize = 8;

    /// Create a new packet with empty payload
    pub fn new(command: impl Into<u16>, session_id: u16, reply_id: u16) -> Self {
        Self {
            command: command.into(),
            session_id,
            reply_id,
            payload: Bytes::new(),
        }
    }

    /// Create a packet with payload
    ///
    /// # Examples
    ///
    /// ```
    /// use zkwire_core::{Packet, Command};
    ///
    /// let packet = Packet::with_payload(Command::Auth, 1234, 1, vec![1, 2, 3, 4]);
    /// assert_eq!(packet.payload.len(), 4);
    /// ```
    pub fn with_payload(
        command: impl Into<u16>,
        session_id: u16,
        reply_id: u16,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            command: command.into(),
            session_id,
            reply_id,
            payload: payload.into(),
        }
    }

    /// The command as a known code, if it is one
    pub fn kind(&self) -> Option<Command> {
        Command::try_from(self.command).ok()
    }

    /// Calculate checksum for this packet
    pub fn checksum(&self) -> u16 {
        self.checksum_with(&OnesComplement)
    }

    fn checksum_with(&self, algo: &impl Checksum) -> u16 {
        algo.compute(self.command, self.session_id, self.reply_id, &self.payload)
    }

    /// Encode packet to bytes
    ///
    /// ```
    /// use zkwire_core::{Packet, Command};
    ///
    /// let bytes = Packet::new(Command::Connect, 0, 0).encode();
    /// assert_eq!(&bytes[..], &[0xE8, 0x03, 0x17, 0xFC, 0, 0, 0, 0]);
    /// ```
    pub fn encode(&self) -> BytesMut {
        self.encode_with(&OnesComplement)
    }

    /// Encode packet with a specific checksum algorithm
    pub fn encode_with(&self, algo: &impl Checksum) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());

        buf.put_u16_le(self.command);
        buf.put_u16_le(self.checksum_with(algo));
        buf.put_u16_le(self.session_id);
        buf.put_u16_le(self.reply_id);
        buf.put_slice(&self.payload);

        buf
    }

    /// Decode packet from bytes
    ///
    /// # Errors
    ///
    /// - [`Error::PacketTooShort`] if the buffer is shorter than the header
    /// - [`Error::ChecksumMismatch`] if the embedded checksum is wrong
    pub fn decode(buf: BytesMut) -> Result<Self> {
        Self::decode_with(buf, &OnesComplement)
    }

    /// Decode packet with a specific checksum algorithm
    pub fn decode_with(mut buf: BytesMut, algo: &impl Checksum) -> Result<Self> {
        if buf.len() < Self::HEADER_SIZE {
            return Err(Error::PacketTooShort {
                expected: Self::HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let command = buf.get_u16_le();
        let received = buf.get_u16_le();
        let session_id = buf.get_u16_le();
        let reply_id = buf.get_u16_le();

        let packet = Self {
            command,
            session_id,
            reply_id,
            payload: buf.freeze(),
        };

        let expected = packet.checksum_with(algo);
        if expected != received {
            return Err(Error::ChecksumMismatch { expected, received });
        }

        Ok(packet)
    }

    /// Check if this is a response packet (ACK)
    pub fn is_response(&self) -> bool {
        self.kind().is_some_and(Command::is_response)
    }

    /// Check if this is a success response
    pub fn is_success(&self) -> bool {
        self.kind().is_some_and(Command::is_success)
    }

    /// Check if this is an error response
    pub fn is_error(&self) -> bool {
        self.kind().is_some_and(Command::is_error)
    }

    /// Payload interpreted as a NUL-terminated string
    pub fn payload_str(&self) -> String {
        let end = self
            .payload
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.payload.len());
        String::from_utf8_lossy(&self.payload[..end]).into_owned()
    }

    /// Get total packet size
    pub fn size(&self) -> usize {
        Self::HEADER_SIZE + self.payload.len()
    }
}

struct CommandName(u16);

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Command::try_from(self.0) {
            Ok(command) => write!(f, "{}", command),
            Err(_) => write!(f, "CMD_UNKNOWN({})", self.0),
        }
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("command", &format_args!("{}", CommandName(self.command)))
            .field("session_id", &format_args!("0x{:04X}", self.session_id))
            .field("reply_id", &format_args!("0x{:04X}", self.reply_id))
            .field("checksum", &format_args!("0x{:04X}", self.checksum()))
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet[{}](session={}, reply={}, len={})",
            CommandName(self.command),
            self.session_id,
            self.reply_id,
            self.payload.len()
        )
    }
}
