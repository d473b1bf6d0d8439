//! Handshake error types.
//!
//! Every variant is terminal for the handshake attempt it came from.
//! Nothing here is retried; the caller decides whether to close the
//! connection or start a fresh attempt.

use thiserror::Error;

use crate::protocol::{NoIntersection, Rejection};

/// Handshake errors.
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// Local and remote tables share no version.
    ///
    /// Local only; the responder turns it into a version mismatch on the wire.
    #[error("Negotiation failed: {0}")]
    NoIntersection(#[from] NoIntersection),

    /// Handshake rejected, either by the peer or while decoding its data.
    #[error("Handshake rejected: {0}")]
    Rejected(#[from] Rejection),

    /// Bytes are not a handshake message.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Message not valid in the current handshake state.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Frame length prefix exceeds the configured limit.
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Announced frame size.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Peer did not answer in time.
    #[error("Handshake timed out after {0}s")]
    Timeout(u64),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for handshake operations
pub type Result<T> = std::result::Result<T, HandshakeError>;

impl HandshakeError {
    /// Rejection carried by this error, if any
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for HandshakeError {
    fn from(err: toml::de::Error) -> Self {
        HandshakeError::Config(err.to_string())
    }
}

