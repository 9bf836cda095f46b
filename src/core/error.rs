//! Error types for the RLPx transport.

use thiserror::Error;

/// Errors from key handling and the ECIES envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Malformed or out-of-range key material.
    #[error("invalid key: {0}")]
    InvalidKey(&'static str),

    /// Signature could not be parsed or no key could be recovered from it.
    #[error("invalid signature")]
    InvalidSignature,

    /// Envelope encryption failed in an underlying primitive.
    #[error("envelope encryption failed")]
    EncryptionError,

    /// Envelope MAC mismatch (tampered data or wrong key).
    #[error("envelope authentication failed")]
    AuthenticationFailure,

    /// Envelope shorter than the fixed ECIES overhead.
    #[error("envelope too short: {0} bytes")]
    EnvelopeTooShort(usize),
}

impl CryptoError {
    /// Check if this error came from a failed authenticity check.
    ///
    /// Such failures are terminal for the connection that produced them.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            CryptoError::AuthenticationFailure | CryptoError::InvalidSignature
        )
    }
}

/// Top-level RLPx errors.
#[derive(Debug, Error)]
pub enum RlpxError {
    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Handshake error.
    #[error("handshake error: {0}")]
    Handshake(#[from] crate::handshake::HandshakeError),

    /// Frame codec error.
    #[error("frame error: {0}")]
    Frame(#[from] crate::transport::FrameError),

    /// Session error.
    #[cfg(feature = "transport")]
    #[error("session error: {0}")]
    Session(#[from] crate::transport::SessionError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
