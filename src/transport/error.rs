//! Session error types.

use std::io;

use thiserror::Error;

use super::frame::{FrameError, FramePart};
use crate::handshake::HandshakeError;

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Handshake rejected: bad envelope, signature or message.
    #[error("handshake failed: {0}")]
    HandshakeFailed(#[from] HandshakeError),

    /// Handshake did not complete within the configured timeout.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// A received frame failed its MAC check. The session is closed.
    #[error("frame {0} authentication failed")]
    FrameAuthenticationFailure(FramePart),

    /// Outgoing payload exceeds the frame size limit. Nothing was sent and
    /// the session stays open.
    #[error("payload of {size} bytes exceeds frame limit {max}")]
    PayloadTooLarge {
        /// Payload length.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// A received frame could not be decoded. The session is closed.
    #[error("frame error: {0}")]
    Frame(FrameError),

    /// The session was closed.
    #[error("session closed")]
    SessionClosed,

    /// I/O error on the underlying stream.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl From<FrameError> for SessionError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::AuthenticationFailure { part } => {
                SessionError::FrameAuthenticationFailure(part)
            }
            other => SessionError::Frame(other),
        }
    }
}

impl SessionError {
    /// Check if this error ends the session.
    ///
    /// Only an outgoing payload over the size limit leaves the session
    /// usable; an oversized incoming frame is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionError::PayloadTooLarge { .. })
    }

    /// Check if this error indicates a forged or corrupted peer message.
    pub fn is_security_error(&self) -> bool {
        match self {
            SessionError::FrameAuthenticationFailure(_) => true,
            SessionError::HandshakeFailed(HandshakeError::Crypto(err)) => {
                err.is_authentication_failure()
            }
            SessionError::HandshakeFailed(HandshakeError::EphemeralKeyMismatch) => true,
            _ => false,
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
