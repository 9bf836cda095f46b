//! Session configuration.

use std::time::Duration;

use crate::core::{DEFAULT_HANDSHAKE_TIMEOUT, HANDSHAKE_VERSION, MAX_FRAME_SIZE};
use crate::handshake::HandshakeEncoding;

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Upper bound on the whole handshake, both messages included.
    pub handshake_timeout: Duration,

    /// Largest payload sent or accepted in one frame.
    pub max_frame_size: usize,

    /// Encoding of the auth packet when dialing. A recipient always answers
    /// in the encoding it received.
    pub handshake_encoding: HandshakeEncoding,

    /// Protocol version advertised in the handshake.
    pub protocol_version: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_frame_size: MAX_FRAME_SIZE,
            handshake_encoding: HandshakeEncoding::Eip8,
            protocol_version: HANDSHAKE_VERSION,
        }
    }
}

impl SessionConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
        }
    }

    /// Set the handshake timeout.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set the frame payload limit (capped at 2^24 - 1).
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size.min(MAX_FRAME_SIZE);
        self
    }

    /// Set the handshake encoding used when dialing.
    pub fn handshake_encoding(mut self, encoding: HandshakeEncoding) -> Self {
        self.config.handshake_encoding = encoding;
        self
    }

    /// Set the advertised protocol version.
    pub fn protocol_version(mut self, version: u8) -> Self {
        self.config.protocol_version = version;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
