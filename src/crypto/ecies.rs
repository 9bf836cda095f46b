//! ECIES encrypted envelope
//!
//! Used only for the two handshake packets, before any session key exists.
//! The envelope bootstraps confidentiality from the recipient's long-term
//! public key alone.
//!
//! ```text
//! envelope = 0x04 || R (64) || IV (16) || AES-128-CTR(kE, IV, m) || tag (32)
//!
//! z   = ECDH(r, K_recipient).x
//! k   = ConcatKDF-SHA256(z, 32)
//! kE  = k[0..16]
//! kM  = SHA-256(k[16..32])
//! tag = HMAC-SHA256(kM, IV || ciphertext || shared_mac_data)
//! ```
//!
//! These keys are never reused for frames; see [`crate::transport::FrameCodec`].

use aes::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::{
    CryptoError, ECIES_IV_SIZE, ECIES_KEY_SIZE, ECIES_OVERHEAD, ECIES_TAG_SIZE, HASH_SIZE,
    PUBLIC_KEY_TAGGED_SIZE,
};

use super::keys::{Identity, PublicKey, SharedSecret};

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Encryption and MAC keys derived from one ECDH shared secret.
#[derive(Zeroize, ZeroizeOnDrop)]
struct EnvelopeKeys {
    encryption: [u8; ECIES_KEY_SIZE],
    mac: [u8; HASH_SIZE],
}

impl EnvelopeKeys {
    fn derive(shared: &SharedSecret) -> Self {
        let mut okm = concat_kdf(shared);

        let mut encryption = [0u8; ECIES_KEY_SIZE];
        encryption.copy_from_slice(&okm[..ECIES_KEY_SIZE]);
        let mac: [u8; HASH_SIZE] = Sha256::digest(&okm[ECIES_KEY_SIZE..]).into();
        okm.zeroize();

        Self { encryption, mac }
    }

    fn apply_keystream(&self, iv: &[u8], data: &mut [u8]) -> Result<(), CryptoError> {
        let mut cipher = Aes128Ctr::new_from_slices(&self.encryption, iv)
            .map_err(|_| CryptoError::EncryptionError)?;
        cipher.apply_keystream(data);
        Ok(())
    }

    fn mac(
        &self,
        iv_and_ciphertext: &[u8],
        shared_mac_data: &[u8],
    ) -> Result<HmacSha256, CryptoError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.mac).map_err(|_| CryptoError::EncryptionError)?;
        mac.update(iv_and_ciphertext);
        mac.update(shared_mac_data);
        Ok(mac)
    }
}

/// NIST SP 800-56 concatenation KDF over SHA-256 with empty other-info.
///
/// 32 bytes of output is exactly one hash block, so a single round with
/// counter 1 suffices.
fn concat_kdf(shared: &SharedSecret) -> [u8; HASH_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(1u32.to_be_bytes());
    hasher.update(shared.as_bytes());
    hasher.finalize().into()
}

/// Encrypt and authenticate `plaintext` to `recipient`.
///
/// `shared_mac_data` is authenticated but not transmitted inside the
/// envelope (the EIP-8 size prefix, or empty for legacy packets).
pub fn seal(
    recipient: &PublicKey,
    plaintext: &[u8],
    shared_mac_data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = Identity::generate();
    let mut iv = [0u8; ECIES_IV_SIZE];
    OsRng.fill_bytes(&mut iv);
    seal_with(&ephemeral, &iv, recipient, plaintext, shared_mac_data)
}

pub(crate) fn seal_with(
    ephemeral: &Identity,
    iv: &[u8; ECIES_IV_SIZE],
    recipient: &PublicKey,
    plaintext: &[u8],
    shared_mac_data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let keys = EnvelopeKeys::derive(&ephemeral.ecdh(recipient));

    let mut out = Vec::with_capacity(ECIES_OVERHEAD + plaintext.len());
    out.push(0x04);
    out.extend_from_slice(&ephemeral.public_key().to_bytes());
    out.extend_from_slice(iv);
    let body_start = out.len();
    out.extend_from_slice(plaintext);
    keys.apply_keystream(iv, &mut out[body_start..])?;

    let tag = keys
        .mac(&out[PUBLIC_KEY_TAGGED_SIZE..], shared_mac_data)?
        .finalize()
        .into_bytes();
    out.extend_from_slice(&tag);
    Ok(out)
}

/// Verify and decrypt an envelope addressed to `recipient`.
///
/// The tag is checked in constant time before anything is decrypted. A
/// failure here is fatal for the handshake; the same envelope must never be
/// retried.
pub fn open(
    recipient: &Identity,
    envelope: &[u8],
    shared_mac_data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if envelope.len() < ECIES_OVERHEAD {
        return Err(CryptoError::EnvelopeTooShort(envelope.len()));
    }

    let ephemeral = PublicKey::from_bytes(&envelope[..PUBLIC_KEY_TAGGED_SIZE])?;
    let keys = EnvelopeKeys::derive(&recipient.ecdh(&ephemeral));

    let (body, tag) = envelope.split_at(envelope.len() - ECIES_TAG_SIZE);
    keys.mac(&body[PUBLIC_KEY_TAGGED_SIZE..], shared_mac_data)?
        .verify_slice(tag)
        .map_err(|_| CryptoError::AuthenticationFailure)?;

    let (iv, ciphertext) = body[PUBLIC_KEY_TAGGED_SIZE..].split_at(ECIES_IV_SIZE);
    let mut plaintext = ciphertext.to_vec();
    keys.apply_keystream(iv, &mut plaintext)?;
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(hex_str: &str) -> Identity {
        Identity::from_hex(hex_str).unwrap()
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let recipient = Identity::generate();
        let plaintext = b"auth body";

        let envelope = seal(recipient.public_key(), plaintext, b"").unwrap();
        assert_eq!(envelope.len(), plaintext.len() + ECIES_OVERHEAD);

        let opened = open(&recipient, &envelope, b"").unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_empty_plaintext() {
        let recipient = Identity::generate();
        let envelope = seal(recipient.public_key(), b"", b"").unwrap();
        assert_eq!(envelope.len(), ECIES_OVERHEAD);
        assert!(open(&recipient, &envelope, b"").unwrap().is_empty());
    }

    #[test]
    fn test_shared_mac_data_is_authenticated() {
        let recipient = Identity::generate();
        let envelope = seal(recipient.public_key(), b"payload", &[0x01, 0x2c]).unwrap();

        assert!(open(&recipient, &envelope, &[0x01, 0x2c]).is_ok());
        assert_eq!(
            open(&recipient, &envelope, &[0x01, 0x2d]),
            Err(CryptoError::AuthenticationFailure)
        );
        assert_eq!(
            open(&recipient, &envelope, b""),
            Err(CryptoError::AuthenticationFailure)
        );
    }

    #[test]
    fn test_open_wrong_key_fails() {
        let recipient = Identity::generate();
        let other = Identity::generate();

        let envelope = seal(recipient.public_key(), b"secret", b"").unwrap();
        assert_eq!(
            open(&other, &envelope, b""),
            Err(CryptoError::AuthenticationFailure)
        );
    }

    #[test]
    fn test_tampering_any_region_fails() {
        let recipient = Identity::generate();
        let envelope = seal(recipient.public_key(), b"tamper me", b"").unwrap();

        // IV, ciphertext and tag regions. Flipping the ephemeral key usually
        // yields an invalid point instead, covered separately.
        for index in [65, 80, 81, 85, envelope.len() - 32, envelope.len() - 1] {
            let mut tampered = envelope.clone();
            tampered[index] ^= 0x01;
            assert_eq!(
                open(&recipient, &tampered, b""),
                Err(CryptoError::AuthenticationFailure),
                "byte {index} not authenticated"
            );
        }
    }

    #[test]
    fn test_tampered_ephemeral_key_fails() {
        let recipient = Identity::generate();
        let mut envelope = seal(recipient.public_key(), b"x", b"").unwrap();
        envelope[10] ^= 0x01;

        let err = open(&recipient, &envelope, b"").unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidKey(_) | CryptoError::AuthenticationFailure
        ));
    }

    #[test]
    fn test_envelope_too_short() {
        let recipient = Identity::generate();
        assert_eq!(
            open(&recipient, &[0x04; 100], b""),
            Err(CryptoError::EnvelopeTooShort(100))
        );
    }

    #[test]
    fn test_fresh_ephemeral_and_iv_per_seal() {
        let recipient = Identity::generate();
        let a = seal(recipient.public_key(), b"same", b"").unwrap();
        let b = seal(recipient.public_key(), b"same", b"").unwrap();

        assert_ne!(a[..65], b[..65]);
        assert_ne!(a[65..81], b[65..81]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_known_answer() {
        let recipient =
            secret("b71c71a67e1177ad4e901695e1b4b9ee17ae16c6668d313eac2f96dbcda3f291");
        let ephemeral =
            secret("869d6ecf5211f1cc60418a13b9d870b22959d0c16f02bec714c960dd2298a32d");
        let iv = [0x11u8; ECIES_IV_SIZE];

        let envelope =
            seal_with(&ephemeral, &iv, recipient.public_key(), b"hello rlpx", b"\x00\x7b")
                .unwrap();
        assert_eq!(hex::encode(&envelope), KNOWN_ENVELOPE);
        assert_eq!(open(&recipient, &envelope, b"\x00\x7b").unwrap(), b"hello rlpx");
    }

    const KNOWN_ENVELOPE: &str = concat!(
        "04654d1044b69c577a44e5f01a1209523adb4026e70c62d1c13a067acabc09d2",
        "667a49821a0ad4b634554d330a15a58fe61f8a8e0544b310c6de7b0c8da7528a",
        "8d11111111111111111111111111111111563c43e46e21b28eec25f6e37b0ebe",
        "a946d66dddd6f337a18b3fffe3d5d84bce4f33d822133dfc20b1a6",
    );
}
