//! TCP stream framing
//!
//! Over TCP every packet is preceded by an 8-byte header:
//!
//! ```text
//! ┌─────────────┬─────────────┬──────────────────┬───────────────┐
//! │ 0x5050 (LE) │ 0x7D82 (LE) │ inner length u32 │ packet bytes  │
//! └─────────────┴─────────────┴──────────────────┴───────────────┘
//! ```
//!
//! There is no end marker; the length field alone delimits the frame. UDP
//! carries bare packets, one per datagram.

use bytes::{Buf, BufMut, BytesMut};
use tracing::{trace, warn};

use crate::{
    constants::{TCP_MAGIC_1, TCP_MAGIC_2},
    error::{Error, Result},
    packet::Packet,
};

/// Size of the TCP frame header
pub const FRAME_HEADER_SIZE: usize = 8;

/// Start marker as it appears on the wire
pub const START_MARKER: [u8; 4] = [0x50, 0x50, 0x82, 0x7D];

/// Default ceiling for a single inner packet
pub const DEFAULT_MAX_FRAME: usize = 1_000_000;

/// Wrap an already encoded packet in the TCP frame header
pub fn wrap_bytes(packet: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + packet.len());
    buf.put_u16_le(TCP_MAGIC_1);
    buf.put_u16_le(TCP_MAGIC_2);
    buf.put_u32_le(packet.len() as u32);
    buf.put_slice(packet);
    buf
}

/// Encode a packet and wrap it for TCP
///
/// # Examples
///
/// ```
/// use zkwire_core::{framing, Command, Packet};
///
/// let frame = framing::wrap(&Packet::new(Command::Connect, 0, 0));
/// assert_eq!(&frame[..8], &[0x50, 0x50, 0x82, 0x7D, 8, 0, 0, 0]);
/// ```
pub fn wrap(packet: &Packet) -> BytesMut {
    wrap_bytes(&packet.encode())
}

/// Incremental decoder for a TCP byte stream
///
/// Bytes are appended to a caller-owned buffer; [`FrameDecoder::decode`]
/// splits off one inner packet at a time.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    max_frame: usize,
}

impl FrameDecoder {
    /// Create a decoder with the default frame ceiling
    pub fn new() -> Self {
        Self {
            max_frame: DEFAULT_MAX_FRAME,
        }
    }

    /// Set the largest inner packet accepted
    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    /// Largest inner packet accepted
    pub fn max_frame(&self) -> usize {
        self.max_frame
    }

    /// Try to take one inner packet off the front of `buf`
    ///
    /// Returns `Ok(None)` while the frame is incomplete; the bytes stay
    /// buffered. Garbage in front of a marker is discarded.
    ///
    /// # Errors
    ///
    /// [`Error::FrameTooLarge`] when the length field exceeds the ceiling.
    /// The offending header is consumed so the stream can resync.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<BytesMut>> {
        self.resync(buf);

        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let size = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
        if size > self.max_frame {
            buf.advance(START_MARKER.len());
            return Err(Error::FrameTooLarge {
                size,
                max: self.max_frame,
            });
        }

        if buf.len() < FRAME_HEADER_SIZE + size {
            trace!(
                buffered = buf.len(),
                needed = FRAME_HEADER_SIZE + size,
                "Partial frame"
            );
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        Ok(Some(buf.split_to(size)))
    }

    /// Drop bytes until the buffer starts with a marker (or a prefix of one)
    fn resync(&self, buf: &mut BytesMut) {
        let start = match find_marker(buf) {
            Some(0) => return,
            Some(pos) => pos,
            None => buf.len() - partial_marker_suffix(buf),
        };

        if start > 0 {
            warn!(
                discarded = start,
                head = %hex::encode(&buf[..start.min(16)]),
                "Invalid frame marker, resyncing"
            );
            buf.advance(start);
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn find_marker(buf: &[u8]) -> Option<usize> {
    buf.windows(START_MARKER.len())
        .position(|window| window == START_MARKER)
}

/// Length of the longest buffer suffix that is a proper prefix of the marker
fn partial_marker_suffix(buf: &[u8]) -> usize {
    (1..START_MARKER.len())
        .rev()
        .find(|&n| buf.len() >= n && buf[buf.len() - n..] == START_MARKER[..n])
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wrap_header() {
        let packet = Packet::with_payload(Command::Data, 1, 2, vec![0xAA; 4]);
        let frame = wrap(&packet);

        assert_eq!(&frame[..4], &START_MARKER);
        assert_eq!(&frame[4..8], &12u32.to_le_bytes());
        assert_eq!(frame.len(), 20);
    }

    #[test]
    fn test_decode_complete_frame() {
        let packet = Packet::new(Command::Connect, 0, 0);
        let mut buf = wrap(&packet);

        let inner = FrameDecoder::new().decode(&mut buf).unwrap().unwrap();

        assert_eq!(Packet::decode(inner).unwrap(), packet);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_partial_frame_keeps_bytes() {
        let frame = wrap(&Packet::with_payload(Command::Data, 7, 3, vec![1; 32]));
        let decoder = FrameDecoder::new();

        let mut buf = BytesMut::from(&frame[..13]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 13);

        buf.extend_from_slice(&frame[13..]);
        let inner = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(inner.len(), 40);
    }

    #[test]
    fn test_decode_two_frames_back_to_back() {
        let mut buf = wrap(&Packet::new(Command::AckOk, 5, 1));
        buf.extend_from_slice(&wrap(&Packet::new(Command::AckOk, 5, 2)));
        let decoder = FrameDecoder::new();

        let first = Packet::decode(decoder.decode(&mut buf).unwrap().unwrap()).unwrap();
        let second = Packet::decode(decoder.decode(&mut buf).unwrap().unwrap()).unwrap();

        assert_eq!(first.reply_id, 1);
        assert_eq!(second.reply_id, 2);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut buf = BytesMut::from(&b"\x01\x02\x03garbage"[..]);
        buf.extend_from_slice(&wrap(&Packet::new(Command::Exit, 9, 4)));

        let inner = FrameDecoder::new().decode(&mut buf).unwrap().unwrap();
        assert_eq!(Packet::decode(inner).unwrap().kind(), Some(Command::Exit));
    }

    #[test]
    fn test_garbage_keeps_partial_marker() {
        let mut buf = BytesMut::from(&[0x00, 0x11, 0x50, 0x50][..]);
        assert!(FrameDecoder::new().decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], &[0x50, 0x50]);
    }

    #[test]
    fn test_frame_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(TCP_MAGIC_1);
        buf.put_u16_le(TCP_MAGIC_2);
        buf.put_u32_le(2048);

        let result = FrameDecoder::new().with_max_frame(1024).decode(&mut buf);
        assert!(matches!(
            result,
            Err(Error::FrameTooLarge { size: 2048, max: 1024 })
        ));
    }
}
