//! Error types for record codecs

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A record slot is shorter than the record layout
    #[error("Malformed {record} record: expected {expected} bytes, got {actual}")]
    MalformedRecord {
        record: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// Packed timestamp does not name a calendar date
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(u32),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Parse(e.to_string())
    }
}
