//! Error types for the library

use std::io;

use thiserror::Error;

use crate::protocol::{MessageType, ParseError};
use crate::transport::Port;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while talking to the camera
#[derive(Error, Debug)]
pub enum Error {
    /// A channel could not be connected
    #[error("{port} channel unavailable: {source}")]
    TransportUnavailable {
        port: Port,
        #[source]
        source: io::Error,
    },

    /// Write or read failure, timeout, or a non-success response
    #[error("{message_type} exchange failed: {reason}")]
    ExchangeFailed {
        message_type: MessageType,
        reason: String,
    },

    /// Operation issued out of order; rejected before any I/O
    #[error("Protocol sequence violation: {0}")]
    ProtocolSequenceViolation(String),

    /// Value outside the known table, or focus point outside the grid
    #[error("Unknown or invalid value: {0}")]
    UnknownOrInvalidValue(String),

    /// Malformed wire data
    #[error("Malformed message: {0}")]
    Parse(#[from] ParseError),

    /// IO errors outside an exchange (live-view reader, config files)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn exchange(message_type: MessageType, reason: impl Into<String>) -> Self {
        Error::ExchangeFailed {
            message_type,
            reason: reason.into(),
        }
    }
}
