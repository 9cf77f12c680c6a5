//! High-level error types

use zkwire_core::Command;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] zkwire_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] zkwire_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] zkwire_types::Error),

    #[error("Device not connected")]
    NotConnected,

    /// TCP request got no reply in time; the session was closed
    #[error("Timed out waiting for reply")]
    Timeout,

    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// UDP retransmissions exhausted; the session was closed
    #[error("Connection lost")]
    ConnectionLost,

    /// Chunked transfer failed; no partial data is returned
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Device answered with an error code
    #[error("{command} rejected by device: {reason}")]
    Device { command: Command, reason: String },

    #[error("Invalid response from device: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap a reassembly failure
    pub(crate) fn transfer(err: zkwire_core::Error) -> Self {
        if err.is_transfer() {
            Error::Transfer(err.to_string())
        } else {
            Error::Core(err)
        }
    }

    /// The session is gone and a reconnect is needed
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::NotConnected | Error::Timeout | Error::ConnectionLost => true,
            Error::Transport(e) => e.is_closed(),
            _ => false,
        }
    }
}
