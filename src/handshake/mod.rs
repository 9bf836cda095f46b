//! Authenticated key agreement
//!
//! A two-message handshake. The initiator already knows the recipient's
//! long-term key; the recipient learns the initiator's from the auth
//! message.
//!
//! ```text
//! Initiator                                 Recipient
//!     |                                         |
//!     |---- auth: ECIES(sig, pubkey, nonce) --->|
//!     |                                         |
//!     |<--- ack: ECIES(ephemeral pub, nonce) ---|
//!     |                                         |
//!   [SessionSecrets]                     [SessionSecrets]
//! ```
//!
//! [`Handshake`] is sans-I/O: it produces packets to send and consumes
//! packets received, and leaves reading and writing to the caller (see
//! [`crate::transport::Session`]).

mod messages;
mod secrets;

pub use messages::{AckMessage, AuthMessage, LegacyAuth};
pub use secrets::SessionSecrets;

use std::io;

use rand::{rngs::OsRng, Rng, RngCore};
use thiserror::Error;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::core::{
    CryptoError, ACK_LEGACY_PACKET_SIZE, AUTH_LEGACY_PACKET_SIZE, ECIES_OVERHEAD,
    EIP8_MAX_PADDING, EIP8_MIN_PADDING, EIP8_PREFIX_SIZE, HANDSHAKE_VERSION, HASH_SIZE, NONCE_SIZE,
};
use crate::crypto::{ecies, recover, Identity, PublicKey};
use crate::rlp::RlpError;

/// Handshake errors. Any of them leaves the handshake in
/// [`HandshakeState::Failed`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Envelope, key or signature failure.
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),

    /// Message body could not be parsed.
    #[error("malformed handshake message: {0}")]
    Malformed(&'static str),

    /// EIP-8 body is not valid RLP.
    #[error("malformed handshake message: {0}")]
    Rlp(#[from] RlpError),

    /// Legacy auth carried an ephemeral key hash that does not match the
    /// key recovered from the signature.
    #[error("ephemeral key hash mismatch")]
    EphemeralKeyMismatch,

    /// Operation called out of order.
    #[error("invalid handshake state: expected {expected:?}, found {actual:?}")]
    InvalidState {
        /// State the operation requires.
        expected: HandshakeState,
        /// State the handshake was in.
        actual: HandshakeState,
    },

    /// The stream failed or ended before the handshake completed.
    #[error("i/o error during handshake: {0}")]
    Io(io::ErrorKind),
}

impl From<io::Error> for HandshakeError {
    fn from(err: io::Error) -> Self {
        HandshakeError::Io(err.kind())
    }
}

/// Which side of the handshake we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Dialed the connection and sends auth.
    Initiator,
    /// Accepted the connection and sends ack.
    Recipient,
}

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Initiator has not sent auth yet.
    Idle,
    /// Initiator sent auth, waiting for ack.
    SentAuth,
    /// Initiator received a valid ack.
    ReceivedAck,
    /// Recipient waiting for auth.
    AwaitingAuth,
    /// Recipient received a valid auth.
    ReceivedAuth,
    /// Recipient sent ack.
    SentAck,
    /// Secrets derived.
    Established,
    /// Terminal failure.
    Failed,
}

/// Packet encoding used on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HandshakeEncoding {
    /// Size-prefixed RLP bodies with random padding.
    #[default]
    Eip8,
    /// Fixed-size bodies.
    Legacy,
}

/// Result of feeding a packet to the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadProgress {
    /// The packet was consumed.
    Complete,
    /// The packet is longer than what was supplied; read this many more
    /// bytes, append them, and call again.
    NeedMore(usize),
}

/// Packet framing as detected on receive.
enum Packet {
    Legacy(Vec<u8>),
    Eip8(Vec<u8>),
    Incomplete(usize),
}

/// Handshake state machine for one side of one connection.
pub struct Handshake {
    role: Role,
    state: HandshakeState,
    encoding: HandshakeEncoding,
    version: u8,
    local: Identity,
    ephemeral: Identity,
    nonce: [u8; NONCE_SIZE],
    remote: Option<PublicKey>,
    remote_ephemeral: Option<PublicKey>,
    remote_nonce: Option<[u8; NONCE_SIZE]>,
    remote_version: Option<u8>,
    auth_packet: Vec<u8>,
    ack_packet: Vec<u8>,
}

impl Handshake {
    /// Start a handshake towards a peer whose long-term key we know.
    pub fn initiator(local: &Identity, remote: PublicKey, encoding: HandshakeEncoding) -> Self {
        let mut handshake = Self::new(Role::Initiator, HandshakeState::Idle, local, encoding);
        handshake.remote = Some(remote);
        handshake
    }

    /// Wait for a handshake from an unknown peer.
    ///
    /// The ack is sent in whatever encoding the auth arrived in.
    pub fn recipient(local: &Identity) -> Self {
        Self::new(
            Role::Recipient,
            HandshakeState::AwaitingAuth,
            local,
            HandshakeEncoding::default(),
        )
    }

    fn new(
        role: Role,
        state: HandshakeState,
        local: &Identity,
        encoding: HandshakeEncoding,
    ) -> Self {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        Self {
            role,
            state,
            encoding,
            version: HANDSHAKE_VERSION,
            local: local.clone(),
            ephemeral: Identity::generate(),
            nonce,
            remote: None,
            remote_ephemeral: None,
            remote_nonce: None,
            remote_version: None,
            auth_packet: Vec::new(),
            ack_packet: Vec::new(),
        }
    }

    /// Set the protocol version advertised in our message.
    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    #[cfg(test)]
    fn with_ephemeral(mut self, ephemeral: Identity, nonce: [u8; NONCE_SIZE]) -> Self {
        self.ephemeral = ephemeral;
        self.nonce = nonce;
        self
    }

    /// Our side of the handshake.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Encoding in use (for a recipient, known once auth is read).
    pub fn encoding(&self) -> HandshakeEncoding {
        self.encoding
    }

    /// The peer's long-term key, if known.
    pub fn remote_public_key(&self) -> Option<&PublicKey> {
        self.remote.as_ref()
    }

    /// Version the peer advertised, once its message has been read.
    /// Versions above 255 read as 255.
    pub fn remote_version(&self) -> Option<u8> {
        self.remote_version
    }

    /// Our ephemeral public key.
    pub fn ephemeral_public_key(&self) -> &PublicKey {
        self.ephemeral.public_key()
    }

    /// Number of bytes to read before the next `read_*` call.
    ///
    /// This is the legacy packet size, which is also enough to learn the
    /// full length of an EIP-8 packet.
    pub fn initial_read_size(&self) -> usize {
        match self.role {
            Role::Initiator => ACK_LEGACY_PACKET_SIZE,
            Role::Recipient => AUTH_LEGACY_PACKET_SIZE,
        }
    }

    /// Build the auth packet. Initiator only.
    pub fn write_auth(&mut self) -> Result<Vec<u8>, HandshakeError> {
        self.step(HandshakeState::Idle, |hs| {
            let remote = hs.remote.ok_or(HandshakeError::Malformed("no remote key"))?;

            let signed = hs.signed_token(&remote);
            let auth = AuthMessage {
                signature: hs.ephemeral.sign_recoverable(&signed),
                initiator_public_key: *hs.local.public_key(),
                nonce: hs.nonce,
                version: hs.version,
            };

            let packet = match hs.encoding {
                HandshakeEncoding::Legacy => {
                    ecies::seal(&remote, &auth.encode_legacy(hs.ephemeral.public_key()), &[])?
                }
                HandshakeEncoding::Eip8 => seal_eip8(&remote, auth.encode_eip8())?,
            };

            hs.auth_packet = packet.clone();
            hs.state = HandshakeState::SentAuth;
            debug!(
                remote = %remote.short_hex(),
                encoding = ?hs.encoding,
                size = packet.len(),
                "sent auth"
            );
            Ok(packet)
        })
    }

    /// Consume the auth packet. Recipient only.
    ///
    /// Verifies the signature, learns the initiator's long-term and
    /// ephemeral keys, and records the encoding for the ack.
    pub fn read_auth(&mut self, packet: &[u8]) -> Result<ReadProgress, HandshakeError> {
        self.step(HandshakeState::AwaitingAuth, |hs| {
            let (auth, ephemeral_hash, encoding) =
                match hs.open_packet(packet, AUTH_LEGACY_PACKET_SIZE)? {
                    Packet::Incomplete(missing) => return Ok(ReadProgress::NeedMore(missing)),
                    Packet::Legacy(body) => {
                        let legacy = AuthMessage::decode_legacy(&body)?;
                        (legacy.message, Some(legacy.ephemeral_hash), HandshakeEncoding::Legacy)
                    }
                    Packet::Eip8(body) => {
                        (AuthMessage::decode_eip8(&body)?, None, HandshakeEncoding::Eip8)
                    }
                };

            let remote = auth.initiator_public_key;
            let signed = xor_token(&hs.local, &remote, &auth.nonce);
            let remote_ephemeral = recover(&signed, &auth.signature)?;

            if let Some(expected) = ephemeral_hash {
                if remote_ephemeral.id_hash() != expected {
                    return Err(HandshakeError::EphemeralKeyMismatch);
                }
            }

            hs.remote = Some(remote);
            hs.remote_ephemeral = Some(remote_ephemeral);
            hs.remote_nonce = Some(auth.nonce);
            hs.remote_version = Some(auth.version);
            hs.encoding = encoding;
            hs.auth_packet = packet.to_vec();
            hs.state = HandshakeState::ReceivedAuth;
            debug!(
                remote = %remote.short_hex(),
                encoding = ?encoding,
                version = auth.version,
                "received auth"
            );
            Ok(ReadProgress::Complete)
        })
    }

    /// Build the ack packet. Recipient only.
    pub fn write_ack(&mut self) -> Result<Vec<u8>, HandshakeError> {
        self.step(HandshakeState::ReceivedAuth, |hs| {
            let remote = hs.remote.ok_or(HandshakeError::Malformed("no remote key"))?;

            let ack = AckMessage {
                ephemeral_public_key: *hs.ephemeral.public_key(),
                nonce: hs.nonce,
                version: hs.version,
            };

            let packet = match hs.encoding {
                HandshakeEncoding::Legacy => ecies::seal(&remote, &ack.encode_legacy(), &[])?,
                HandshakeEncoding::Eip8 => seal_eip8(&remote, ack.encode_eip8())?,
            };

            hs.ack_packet = packet.clone();
            hs.state = HandshakeState::SentAck;
            debug!(remote = %remote.short_hex(), size = packet.len(), "sent ack");
            Ok(packet)
        })
    }

    /// Consume the ack packet. Initiator only.
    pub fn read_ack(&mut self, packet: &[u8]) -> Result<ReadProgress, HandshakeError> {
        self.step(HandshakeState::SentAuth, |hs| {
            let ack = match hs.open_packet(packet, ACK_LEGACY_PACKET_SIZE)? {
                Packet::Incomplete(missing) => return Ok(ReadProgress::NeedMore(missing)),
                Packet::Legacy(body) => AckMessage::decode_legacy(&body)?,
                Packet::Eip8(body) => AckMessage::decode_eip8(&body)?,
            };

            hs.remote_ephemeral = Some(ack.ephemeral_public_key);
            hs.remote_nonce = Some(ack.nonce);
            hs.remote_version = Some(ack.version);
            hs.ack_packet = packet.to_vec();
            hs.state = HandshakeState::ReceivedAck;
            debug!(version = ack.version, "received ack");
            Ok(ReadProgress::Complete)
        })
    }

    /// Derive the session secrets. Valid after `read_ack` (initiator) or
    /// `write_ack` (recipient).
    pub fn finish(&mut self) -> Result<SessionSecrets, HandshakeError> {
        let expected = match self.role {
            Role::Initiator => HandshakeState::ReceivedAck,
            Role::Recipient => HandshakeState::SentAck,
        };

        self.step(expected, |hs| {
            let missing = HandshakeError::Malformed("handshake incomplete");
            let remote = hs.remote.ok_or(missing.clone())?;
            let remote_ephemeral = hs.remote_ephemeral.ok_or(missing.clone())?;
            let remote_nonce = hs.remote_nonce.ok_or(missing)?;

            let (initiator_nonce, recipient_nonce) = match hs.role {
                Role::Initiator => (hs.nonce, remote_nonce),
                Role::Recipient => (remote_nonce, hs.nonce),
            };

            let secrets = SessionSecrets::derive(
                hs.role,
                &hs.ephemeral.ecdh(&remote_ephemeral),
                &initiator_nonce,
                &recipient_nonce,
                &hs.auth_packet,
                &hs.ack_packet,
                remote,
            );

            hs.auth_packet.clear();
            hs.ack_packet.clear();
            hs.state = HandshakeState::Established;
            debug!(role = ?hs.role, remote = %remote.short_hex(), "handshake established");
            Ok(secrets)
        })
    }

    /// Run one transition, moving to `Failed` on any error.
    fn step<T>(
        &mut self,
        expected: HandshakeState,
        f: impl FnOnce(&mut Self) -> Result<T, HandshakeError>,
    ) -> Result<T, HandshakeError> {
        if self.state != expected {
            let err = HandshakeError::InvalidState {
                expected,
                actual: self.state,
            };
            self.state = HandshakeState::Failed;
            return Err(err);
        }

        f(self).inspect_err(|err| {
            warn!(role = ?self.role, error = %err, "handshake failed");
            self.state = HandshakeState::Failed;
        })
    }

    /// `ECDH(static, static) xor nonce`, the digest the initiator's
    /// ephemeral key signs.
    fn signed_token(&self, remote: &PublicKey) -> Zeroizing<[u8; HASH_SIZE]> {
        xor_token(&self.local, remote, &self.nonce)
    }

    /// Detect the packet encoding and open the envelope.
    ///
    /// A packet of exactly the legacy size is tried as legacy first; if that
    /// does not authenticate, the first two bytes are an EIP-8 size prefix.
    fn open_packet(&self, packet: &[u8], legacy_size: usize) -> Result<Packet, HandshakeError> {
        if packet.len() == legacy_size {
            if let Ok(body) = ecies::open(&self.local, packet, &[]) {
                return Ok(Packet::Legacy(body));
            }
        }

        if packet.len() < EIP8_PREFIX_SIZE {
            return Ok(Packet::Incomplete(EIP8_PREFIX_SIZE - packet.len()));
        }

        let (prefix, envelope) = packet.split_at(EIP8_PREFIX_SIZE);
        let size = usize::from(u16::from_be_bytes([prefix[0], prefix[1]]));
        if envelope.len() < size {
            return Ok(Packet::Incomplete(size - envelope.len()));
        }
        if envelope.len() > size {
            return Err(HandshakeError::Malformed("trailing bytes after handshake packet"));
        }

        Ok(Packet::Eip8(ecies::open(&self.local, envelope, prefix)?))
    }
}

impl std::fmt::Debug for Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("encoding", &self.encoding)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

fn xor_token(
    local: &Identity,
    remote: &PublicKey,
    nonce: &[u8; NONCE_SIZE],
) -> Zeroizing<[u8; HASH_SIZE]> {
    let token = local.ecdh(remote);
    let mut out = Zeroizing::new([0u8; HASH_SIZE]);
    for (o, (t, n)) in out.iter_mut().zip(token.as_bytes().iter().zip(nonce)) {
        *o = t ^ n;
    }
    out
}

/// Pad an EIP-8 body, prefix it with its sealed size, and seal it.
fn seal_eip8(remote: &PublicKey, mut body: Vec<u8>) -> Result<Vec<u8>, HandshakeError> {
    let padding = OsRng.gen_range(EIP8_MIN_PADDING..=EIP8_MAX_PADDING);
    let start = body.len();
    body.resize(start + padding, 0);
    OsRng.fill_bytes(&mut body[start..]);

    let size = u16::try_from(body.len() + ECIES_OVERHEAD)
        .map_err(|_| HandshakeError::Malformed("handshake packet too large"))?;
    let prefix = size.to_be_bytes();

    let envelope = ecies::seal(remote, &body, &prefix)?;
    let mut packet = Vec::with_capacity(EIP8_PREFIX_SIZE + envelope.len());
    packet.extend_from_slice(&prefix);
    packet.extend_from_slice(&envelope);
    Ok(packet)
}
