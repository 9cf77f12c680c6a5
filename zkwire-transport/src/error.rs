//! Transport errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Read timeout")]
    ReadTimeout,

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Byte stream could not be split into frames
    #[error("Framing error: {0}")]
    Framing(#[from] zkwire_core::Error),
}

impl Error {
    /// No data arrived within the deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ReadTimeout | Self::ConnectionTimeout)
    }

    /// The underlying channel is gone
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::NotConnected | Self::Io(_))
    }
}
