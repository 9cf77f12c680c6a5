//! Error types for zkwire-core

/// Result type alias for zkwire-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Packet is too short to be valid
    #[error("Packet too short: expected at least {expected} bytes, got {actual} bytes")]
    PacketTooShort {
        expected: usize,
        actual: usize,
    },

    /// TCP frame announces more bytes than allowed
    #[error("Frame too large: {size} bytes (max: {max} bytes)")]
    FrameTooLarge {
        size: usize,
        max: usize,
    },

    /// Checksum verification failed
    #[error("Checksum mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    ChecksumMismatch {
        expected: u16,
        received: u16,
    },

    /// Unknown command code
    #[error("Unknown command code: {0}")]
    UnknownCommand(u16),

    /// Invalid session state
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    /// Session not initialized
    #[error("Session not initialized - connect to device first")]
    SessionNotInitialized,

    /// Reply does not belong to the request in flight
    #[error("Stale reply: expected reply id {expected}, got {actual}")]
    StaleReply {
        expected: u16,
        actual: u16,
    },

    /// Chunk lies outside the announced transfer size
    #[error("Chunk at offset {offset} ({len} bytes) exceeds transfer size {total}")]
    ChunkOutOfRange {
        offset: u32,
        len: usize,
        total: u32,
    },

    /// Chunk overlaps data already received
    #[error("Chunk at offset {offset} overlaps received data")]
    ChunkOverlap {
        offset: u32,
    },

    /// Transfer finished before all bytes arrived
    #[error("Transfer incomplete: received {received} of {expected} bytes")]
    TransferIncomplete {
        received: u32,
        expected: u32,
    },

    /// Transfer aborted
    #[error("Transfer aborted: {0}")]
    TransferAborted(String),
}

impl Error {
    /// Frame could not be parsed at all (drop it, never fatal)
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::PacketTooShort { .. } | Self::FrameTooLarge { .. }
        )
    }

    /// Error belongs to a chunked transfer
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            Self::ChunkOutOfRange { .. }
                | Self::ChunkOverlap { .. }
                | Self::TransferIncomplete { .. }
                | Self::TransferAborted(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let short = Error::PacketTooShort { expected: 8, actual: 3 };
        assert!(short.is_malformed());
        assert!(!short.is_transfer());

        let checksum = Error::ChecksumMismatch { expected: 1, received: 2 };
        assert!(!checksum.is_malformed());

        let aborted = Error::TransferAborted("disconnect".into());
        assert!(aborted.is_transfer());
        assert!(!aborted.is_malformed());
    }
}
