//! Packet checksum
//!
//! The vendor algorithm is an ones-complement style 16-bit sum:
//! 1. Build buffer: [Command, 0x0000, SessionID, ReplyID, Payload]
//! 2. Sum as unsigned 16-bit little-endian words (odd trailing byte is a low byte)
//! 3. While the sum exceeds 0xFFFF, subtract 0xFFFF
//! 4. Take the ones complement
//!
//! The algorithm sits behind the [`Checksum`] trait so the codec can be driven
//! by a different variant without touching the packet layout.

use tracing::trace;

/// A 16-bit frame checksum over the header fields and payload
pub trait Checksum {
    /// Compute the checksum the sender places in the header
    fn compute(&self, command: u16, session_id: u16, reply_id: u16, payload: &[u8]) -> u16;

    /// Verify a received checksum
    fn verify(
        &self,
        command: u16,
        session_id: u16,
        reply_id: u16,
        payload: &[u8],
        expected: u16,
    ) -> bool {
        self.compute(command, session_id, reply_id, payload) == expected
    }
}

/// The checksum used by ZKTeco terminals
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OnesComplement;

impl Checksum for OnesComplement {
    fn compute(&self, command: u16, session_id: u16, reply_id: u16, payload: &[u8]) -> u16 {
        // checksum field itself counts as zero
        let mut sum = fold(0, u32::from(command));
        sum = fold(sum, u32::from(session_id));
        sum = fold(sum, u32::from(reply_id));

        let mut words = payload.chunks_exact(2);
        for word in &mut words {
            sum = fold(sum, u32::from(u16::from_le_bytes([word[0], word[1]])));
        }
        if let [last] = words.remainder() {
            sum = fold(sum, u32::from(*last));
        }

        let checksum = !sum as u16;

        trace!(
            command,
            session_id,
            reply_id,
            payload_len = payload.len(),
            checksum = format!("0x{:04X}", checksum),
            "Calculated checksum"
        );

        checksum
    }
}

#[inline]
fn fold(sum: u32, word: u32) -> u32 {
    let mut sum = sum + word;
    while sum > 0xFFFF {
        sum -= 0xFFFF;
    }
    sum
}

/// Calculate the default packet checksum
///
/// # Examples
///
/// ```
/// use zkwire_core::checksum;
///
/// // CMD_CONNECT, session 0, reply 0, no payload
/// assert_eq!(checksum::calculate(1000, 0, 0, &[]), 0xFC17);
/// ```
pub fn calculate(command: u16, session_id: u16, reply_id: u16, payload: &[u8]) -> u16 {
    OnesComplement.compute(command, session_id, reply_id, payload)
}

/// Verify a checksum with the default algorithm
pub fn verify(command: u16, session_id: u16, reply_id: u16, payload: &[u8], expected: u16) -> bool {
    OnesComplement.verify(command, session_id, reply_id, payload, expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_golden_connect() {
        assert_eq!(calculate(1000, 0, 0, &[]), 0xFC17);
    }

    #[test]
    fn test_golden_wraps_above_16_bits() {
        // 0x03E8 + 0xFFFE = 0x103E6 -> 0x03E7 -> !0x03E7
        assert_eq!(calculate(1000, 0, 0xFFFE, &[]), 0xFC18);
    }

    #[test]
    fn test_golden_odd_payload() {
        // 0x03E8 + 0x0201 + 0x0003 = 0x05EC
        assert_eq!(calculate(1000, 0, 0, &[0x01, 0x02, 0x03]), 0xFA13);
    }

    #[test]
    fn test_golden_ack_ok() {
        // CMD_ACK_OK (2000) with session 1000: 0x07D0 + 0x03E8 = 0x0BB8
        assert_eq!(calculate(2000, 1000, 0, &[]), 0xF447);
    }

    #[test]
    fn test_checksum_verify() {
        let payload = [0xAB, 0xCD];
        let checksum = calculate(1000, 50, 100, &payload);

        assert!(verify(1000, 50, 100, &payload, checksum));
        assert!(!verify(1000, 50, 100, &payload, checksum.wrapping_add(1)));
    }

    #[test]
    fn test_checksum_different_sessions() {
        assert_ne!(calculate(1000, 100, 0, &[]), calculate(1000, 200, 0, &[]));
    }

    #[test]
    fn test_checksum_large_payload() {
        let payload = vec![0xFF; 1000];
        assert_eq!(calculate(1000, 0, 0, &payload), calculate(1000, 0, 0, &payload));
    }

    #[test]
    fn test_custom_checksum_is_pluggable() {
        struct Xor;
        impl Checksum for Xor {
            fn compute(&self, command: u16, session_id: u16, reply_id: u16, payload: &[u8]) -> u16 {
                payload
                    .iter()
                    .fold(command ^ session_id ^ reply_id, |acc, b| acc ^ u16::from(*b))
            }
        }

        assert_eq!(Xor.compute(1, 2, 4, &[8]), 15);
        assert!(Xor.verify(1, 2, 4, &[8], 15));
    }

    #[test]
    fn test_frames_from_an_off_by_one_peer() {
        // peers that complement into 0xFFFE instead of 0xFFFF
        struct OffByOne;
        impl Checksum for OffByOne {
            fn compute(&self, command: u16, session_id: u16, reply_id: u16, payload: &[u8]) -> u16 {
                OnesComplement
                    .compute(command, session_id, reply_id, payload)
                    .wrapping_sub(1)
            }
        }

        let packet = crate::Packet::new(2000u16, 1000, 0);
        let frame = packet.encode_with(&OffByOne);
        assert_eq!(&frame[2..4], &0xF446u16.to_le_bytes());

        assert!(matches!(
            crate::Packet::decode(frame.clone()),
            Err(crate::Error::ChecksumMismatch { .. })
        ));
        assert_eq!(crate::Packet::decode_with(frame, &OffByOne).unwrap(), packet);
    }
}
