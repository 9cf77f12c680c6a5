//! CommKey authentication
//!
//! Terminals with a communication password answer CMD_CONNECT with
//! CMD_ACK_UNAUTH. The client then proves knowledge of the password by sending
//! a 4-byte key scrambled with the session id (the `MakeKey` routine of the
//! vendor SDK).

use bytes::Bytes;

/// Derive the CMD_AUTH payload from password and session id
///
/// Steps: bit-reverse the password, add the session id, XOR with `"ZKSO"`,
/// swap the two 16-bit halves, then mix in `ticks`.
///
/// # Examples
///
/// ```
/// use zkwire_core::auth;
///
/// let key = auth::make_commkey(0, 32031, 50);
/// assert_eq!(key.len(), 4);
/// ```
pub fn make_commkey(password: u32, session_id: u16, ticks: u8) -> Bytes {
    let k = password.reverse_bits().wrapping_add(u32::from(session_id));

    let mut b = k.to_le_bytes();
    for (byte, salt) in b.iter_mut().zip(*b"ZKSO") {
        *byte ^= salt;
    }

    // swap halves: [b0 b1 b2 b3] -> [b2 b3 b0 b1]
    let mut key = [b[2], b[3], b[0], b[1]];

    key[0] ^= ticks;
    key[1] ^= ticks;
    key[2] = ticks;
    key[3] ^= ticks;

    Bytes::copy_from_slice(&key)
}

/// Check a received CMD_AUTH payload against the expected password
pub fn verify_commkey(payload: &[u8], password: u32, session_id: u16, ticks: u8) -> bool {
    payload.len() >= 4 && payload[..4] == make_commkey(password, session_id, ticks)[..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_commkey_golden_zero() {
        // 0 + 0 = 0, XOR "ZKSO" = 5A 4B 53 4F, swapped = 53 4F 5A 4B
        // ticks 50 (0x32): 61 7D 32 79
        let key = make_commkey(0, 0, 50);
        assert_eq!(&key[..], &[0x61, 0x7D, 0x32, 0x79]);
    }

    #[test]
    fn test_commkey_deterministic() {
        assert_eq!(make_commkey(0, 32031, 50), make_commkey(0, 32031, 50));
    }

    #[test]
    fn test_commkey_depends_on_inputs() {
        assert_ne!(make_commkey(0, 100, 50), make_commkey(12345, 100, 50));
        assert_ne!(make_commkey(0, 100, 50), make_commkey(0, 200, 50));
    }

    #[test]
    fn test_verify_commkey() {
        let key = make_commkey(1234, 77, 50);
        assert!(verify_commkey(&key, 1234, 77, 50));
        assert!(!verify_commkey(&key, 4321, 77, 50));
        assert!(!verify_commkey(&key[..2], 1234, 77, 50));
    }
}
