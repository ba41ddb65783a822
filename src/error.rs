use std::io::ErrorKind;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, StatErr>;

/// Uniform error definition for both status protocols.
#[derive(Debug, Error)]
pub enum StatErr {
    /// Socket creation, name resolution or connect failed.
    #[error("connection error: {0}")]
    ConnectionErr(String),
    /// A caller supplied value was rejected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The server answered with something that does not follow the protocol.
    #[error("protocol error: {0}")]
    ProtocolErr(String),
    /// The status JSON could not be parsed.
    #[error("parse error: {0}")]
    ParseErr(String),
    /// A socket read or write ran into the configured timeout.
    #[error("timed out: {0}")]
    TimeoutErr(String),
    /// Any other socket failure.
    #[error("I/O error: {0}")]
    IoErr(std::io::Error),
}

impl From<std::io::Error> for StatErr {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            // Unix reports an expired SO_RCVTIMEO as WouldBlock, Windows as TimedOut.
            ErrorKind::TimedOut | ErrorKind::WouldBlock => StatErr::TimeoutErr(err.to_string()),
            _ => StatErr::IoErr(err),
        }
    }
}

impl From<serde_json::Error> for StatErr {
    fn from(err: serde_json::Error) -> Self {
        StatErr::ParseErr(err.to_string())
    }
}
