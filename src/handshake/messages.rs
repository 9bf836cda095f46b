//! Auth and ack message bodies
//!
//! Each message has two encodings:
//!
//! ```text
//! legacy auth: sig (65) || keccak256(ephemeral pub) (32) || pubkey (64) || nonce (32) || 0x00
//! legacy ack:  ephemeral pub (64) || nonce (32) || 0x00
//!
//! EIP-8 auth:  rlp([sig, pubkey, nonce, version, ...]) || padding
//! EIP-8 ack:   rlp([ephemeral pub, nonce, version, ...]) || padding
//! ```
//!
//! Bodies here are plaintext; sealing, the size prefix and padding are the
//! state machine's job.

use sha3::{Digest, Keccak256};

use crate::core::{
    ACK_LEGACY_BODY_SIZE, AUTH_LEGACY_BODY_SIZE, HANDSHAKE_VERSION, HASH_SIZE, NONCE_SIZE,
    PUBLIC_KEY_SIZE, SIGNATURE_SIZE,
};
use crate::crypto::PublicKey;
use crate::rlp;

use super::HandshakeError;

/// The initiator's first message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthMessage {
    /// Recoverable signature by the initiator's ephemeral key over
    /// `ECDH(static, static) xor nonce`.
    pub signature: [u8; SIGNATURE_SIZE],
    /// The initiator's long-term public key.
    pub initiator_public_key: PublicKey,
    /// The initiator's nonce.
    pub nonce: [u8; NONCE_SIZE],
    /// Advertised protocol version.
    pub version: u8,
}

/// A decoded legacy auth body, carrying the ephemeral key hash that only
/// the legacy encoding transmits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyAuth {
    /// The decoded message.
    pub message: AuthMessage,
    /// Keccak-256 of the initiator's ephemeral public key.
    pub ephemeral_hash: [u8; HASH_SIZE],
}

impl AuthMessage {
    /// Encode as a fixed-size legacy body.
    pub fn encode_legacy(&self, ephemeral: &PublicKey) -> Vec<u8> {
        let mut out = Vec::with_capacity(AUTH_LEGACY_BODY_SIZE);
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&Keccak256::digest(ephemeral.to_bytes()));
        out.extend_from_slice(&self.initiator_public_key.to_bytes());
        out.extend_from_slice(&self.nonce);
        out.push(0x00);
        out
    }

    /// Decode a legacy body. The version is implied.
    pub fn decode_legacy(body: &[u8]) -> Result<LegacyAuth, HandshakeError> {
        if body.len() != AUTH_LEGACY_BODY_SIZE {
            return Err(HandshakeError::Malformed("legacy auth body has wrong length"));
        }

        let (signature, rest) = body.split_at(SIGNATURE_SIZE);
        let (ephemeral_hash, rest) = rest.split_at(HASH_SIZE);
        let (public_key, rest) = rest.split_at(PUBLIC_KEY_SIZE);
        let nonce = &rest[..NONCE_SIZE];

        Ok(LegacyAuth {
            message: AuthMessage {
                signature: to_array(signature)?,
                initiator_public_key: PublicKey::from_bytes(public_key)?,
                nonce: to_array(nonce)?,
                version: HANDSHAKE_VERSION,
            },
            ephemeral_hash: to_array(ephemeral_hash)?,
        })
    }

    /// Encode as an EIP-8 RLP list, without padding.
    pub fn encode_eip8(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(SIGNATURE_SIZE + PUBLIC_KEY_SIZE + NONCE_SIZE + 8);
        rlp::encode_bytes(&mut payload, &self.signature);
        rlp::encode_bytes(&mut payload, &self.initiator_public_key.to_bytes());
        rlp::encode_bytes(&mut payload, &self.nonce);
        rlp::encode_uint(&mut payload, u64::from(self.version));

        let mut out = Vec::with_capacity(payload.len() + 3);
        rlp::encode_list(&mut out, &payload);
        out
    }

    /// Decode an EIP-8 body. Extra list elements and trailing padding are
    /// ignored.
    pub fn decode_eip8(body: &[u8]) -> Result<Self, HandshakeError> {
        let (items, _padding) = rlp::decode_list(body)?;

        Ok(Self {
            signature: rlp::element(&items, 0)?.array()?,
            initiator_public_key: PublicKey::from_bytes(rlp::element(&items, 1)?.bytes()?)?,
            nonce: rlp::element(&items, 2)?.array()?,
            version: decode_version(rlp::element(&items, 3)?)?,
        })
    }
}

/// The recipient's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckMessage {
    /// The recipient's ephemeral public key.
    pub ephemeral_public_key: PublicKey,
    /// The recipient's nonce.
    pub nonce: [u8; NONCE_SIZE],
    /// Advertised protocol version.
    pub version: u8,
}

impl AckMessage {
    /// Encode as a fixed-size legacy body.
    pub fn encode_legacy(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ACK_LEGACY_BODY_SIZE);
        out.extend_from_slice(&self.ephemeral_public_key.to_bytes());
        out.extend_from_slice(&self.nonce);
        out.push(0x00);
        out
    }

    /// Decode a legacy body. The version is implied.
    pub fn decode_legacy(body: &[u8]) -> Result<Self, HandshakeError> {
        if body.len() != ACK_LEGACY_BODY_SIZE {
            return Err(HandshakeError::Malformed("legacy ack body has wrong length"));
        }

        let (public_key, rest) = body.split_at(PUBLIC_KEY_SIZE);
        Ok(Self {
            ephemeral_public_key: PublicKey::from_bytes(public_key)?,
            nonce: to_array(&rest[..NONCE_SIZE])?,
            version: HANDSHAKE_VERSION,
        })
    }

    /// Encode as an EIP-8 RLP list, without padding.
    pub fn encode_eip8(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(PUBLIC_KEY_SIZE + NONCE_SIZE + 8);
        rlp::encode_bytes(&mut payload, &self.ephemeral_public_key.to_bytes());
        rlp::encode_bytes(&mut payload, &self.nonce);
        rlp::encode_uint(&mut payload, u64::from(self.version));

        let mut out = Vec::with_capacity(payload.len() + 3);
        rlp::encode_list(&mut out, &payload);
        out
    }

    /// Decode an EIP-8 body.
    pub fn decode_eip8(body: &[u8]) -> Result<Self, HandshakeError> {
        let (items, _padding) = rlp::decode_list(body)?;

        Ok(Self {
            ephemeral_public_key: PublicKey::from_bytes(rlp::element(&items, 0)?.bytes()?)?,
            nonce: rlp::element(&items, 1)?.array()?,
            version: decode_version(rlp::element(&items, 2)?)?,
        })
    }
}

/// Versions are recorded, not enforced: anything above `u8::MAX` saturates.
fn decode_version(item: rlp::Item<'_>) -> Result<u8, HandshakeError> {
    match item.uint() {
        Ok(version) => Ok(u8::try_from(version).unwrap_or(u8::MAX)),
        Err(rlp::RlpError::IntegerOverflow) => Ok(u8::MAX),
        Err(err) => Err(err.into()),
    }
}

fn to_array<const N: usize>(bytes: &[u8]) -> Result<[u8; N], HandshakeError> {
    bytes
        .try_into()
        .map_err(|_| HandshakeError::Malformed("field has wrong length"))
}
