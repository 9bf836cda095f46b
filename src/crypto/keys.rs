//! secp256k1 identity key management
//!
//! Provides node identities (long-term key pairs), peer public keys, ECDH and
//! recoverable signatures for the RLPx handshake.

use std::fmt;

use rand::rngs::OsRng;
use secp256k1::{
    ecdh::shared_secret_point,
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, SECP256K1,
};
use sha3::{Digest, Keccak256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::core::{
    CryptoError, ADDRESS_HASH_SIZE, HASH_SIZE, PUBLIC_KEY_SIZE, PUBLIC_KEY_TAGGED_SIZE,
    SECRET_KEY_SIZE, SHARED_SECRET_SIZE, SIGNATURE_SIZE,
};

/// A peer's public key: a secp256k1 point, serialized as 64 bytes (X || Y).
///
/// Construction validates that the point lies on the curve.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(secp256k1::PublicKey);

impl PublicKey {
    /// Parse a public key from 64 bytes (X || Y) or 65 bytes (0x04 || X || Y).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let mut tagged = [0u8; PUBLIC_KEY_TAGGED_SIZE];
        match bytes.len() {
            PUBLIC_KEY_SIZE => {
                tagged[0] = 0x04;
                tagged[1..].copy_from_slice(bytes);
            }
            PUBLIC_KEY_TAGGED_SIZE if bytes[0] == 0x04 => tagged.copy_from_slice(bytes),
            _ => return Err(CryptoError::InvalidKey("public key must be 64 or 65 bytes")),
        }

        secp256k1::PublicKey::from_slice(&tagged)
            .map(Self)
            .map_err(|_| CryptoError::InvalidKey("public key is not a curve point"))
    }

    /// Parse a public key from a hex string (64 or 65 bytes, optional `0x`).
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s.trim().trim_start_matches("0x"))
            .map_err(|_| CryptoError::InvalidKey("public key is not valid hex"))?;
        Self::from_bytes(&bytes)
    }

    /// Serialize as 64 bytes (X || Y).
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        let tagged = self.0.serialize_uncompressed();
        let mut out = [0u8; PUBLIC_KEY_SIZE];
        out.copy_from_slice(&tagged[1..]);
        out
    }

    /// Hex encoding of the 64-byte form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Keccak-256 of the 64-byte public key.
    pub fn id_hash(&self) -> [u8; HASH_SIZE] {
        Keccak256::digest(self.to_bytes()).into()
    }

    /// Network address hash of this key. See [`address_hash`].
    pub fn address_hash(&self) -> [u8; ADDRESS_HASH_SIZE] {
        address_hash(self)
    }

    /// Short hex prefix of the id hash, for logs.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.id_hash()[..4])
    }

    pub(crate) fn inner(&self) -> &secp256k1::PublicKey {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.short_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Network-level address of a public key: the last 20 bytes of
/// Keccak-256(X || Y).
pub fn address_hash(key: &PublicKey) -> [u8; ADDRESS_HASH_SIZE] {
    let digest = key.id_hash();
    let mut out = [0u8; ADDRESS_HASH_SIZE];
    out.copy_from_slice(&digest[HASH_SIZE - ADDRESS_HASH_SIZE..]);
    out
}

/// ECDH shared secret (x-coordinate of the shared point).
///
/// Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_SIZE]);

impl SharedSecret {
    /// Get the raw secret bytes.
    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_SIZE] {
        &self.0
    }
}

/// A secp256k1 key pair: a node's long-term identity, or a per-handshake
/// ephemeral key.
///
/// The secret scalar is erased on drop.
#[derive(Clone)]
pub struct Identity {
    secret: secp256k1::SecretKey,
    public: PublicKey,
}

impl Identity {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let secret = secp256k1::SecretKey::new(&mut OsRng);
        Self::from_secret(secret)
    }

    /// Create an identity from a 32-byte secret scalar.
    ///
    /// Fails with `InvalidKey` if the scalar is zero or not below the curve
    /// order.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(CryptoError::InvalidKey("secret key must be 32 bytes"));
        }
        let secret = secp256k1::SecretKey::from_slice(bytes)
            .map_err(|_| CryptoError::InvalidKey("secret scalar out of range"))?;
        Ok(Self::from_secret(secret))
    }

    /// Create an identity from a hex-encoded secret scalar.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(
            hex::decode(s.trim().trim_start_matches("0x"))
                .map_err(|_| CryptoError::InvalidKey("secret key is not valid hex"))?,
        );
        Self::from_secret_bytes(&bytes)
    }

    fn from_secret(secret: secp256k1::SecretKey) -> Self {
        let public = PublicKey(secp256k1::PublicKey::from_secret_key_global(&secret));
        Self { secret, public }
    }

    /// Get the public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Get the secret scalar.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; SECRET_KEY_SIZE]> {
        Zeroizing::new(self.secret.secret_bytes())
    }

    /// Compute the ECDH shared secret with a remote public key.
    pub fn ecdh(&self, remote: &PublicKey) -> SharedSecret {
        let mut point = shared_secret_point(remote.inner(), &self.secret);
        let mut x = [0u8; SHARED_SECRET_SIZE];
        x.copy_from_slice(&point[..SHARED_SECRET_SIZE]);
        point.zeroize();
        SharedSecret(x)
    }

    /// Sign a 32-byte digest, producing `r || s || v` with `v` in {0, 1}.
    pub fn sign_recoverable(&self, digest: &[u8; HASH_SIZE]) -> [u8; SIGNATURE_SIZE] {
        let message = Message::from_digest(*digest);
        let signature = SECP256K1.sign_ecdsa_recoverable(&message, &self.secret);
        let (recovery_id, compact) = signature.serialize_compact();

        let mut out = [0u8; SIGNATURE_SIZE];
        out[..64].copy_from_slice(&compact);
        out[64] = recovery_id.to_i32() as u8;
        out
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl Drop for Identity {
    fn drop(&mut self) {
        self.secret.non_secure_erase();
    }
}

/// Recover the public key that produced `signature` over `digest`.
pub fn recover(
    digest: &[u8; HASH_SIZE],
    signature: &[u8; SIGNATURE_SIZE],
) -> Result<PublicKey, CryptoError> {
    let recovery_id =
        RecoveryId::from_i32(i32::from(signature[64])).map_err(|_| CryptoError::InvalidSignature)?;
    let signature = RecoverableSignature::from_compact(&signature[..64], recovery_id)
        .map_err(|_| CryptoError::InvalidSignature)?;
    let message = Message::from_digest(*digest);

    SECP256K1
        .recover_ecdsa(&message, &signature)
        .map(PublicKey)
        .map_err(|_| CryptoError::InvalidSignature)
}
