//! Per-direction frame MAC.
//!
//! A running Keccak-256 state seeded by the handshake. Every header and
//! body ciphertext is folded in, so each tag commits to the whole history
//! of the direction.
//!
//! ```text
//! header: absorb(AES(mac_secret, digest[..16]) xor header_ct); tag = digest[..16]
//! body:   absorb(body_ct); d = digest
//!         absorb(AES(mac_secret, d[..16]) xor d[..16]);          tag = digest[..16]
//! ```

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::{Aes256, Block};
use sha3::{Digest, Keccak256};

use crate::core::{FRAME_HEADER_SIZE, FRAME_MAC_SIZE, HASH_SIZE};

/// Running MAC state for one direction.
pub struct FrameMac {
    hash: Keccak256,
    cipher: Aes256,
}

impl FrameMac {
    /// Create from the MAC secret and the seeded Keccak state.
    pub fn new(mac_secret: &[u8; HASH_SIZE], seeded: Keccak256) -> Self {
        Self {
            hash: seeded,
            cipher: Aes256::new(GenericArray::from_slice(mac_secret)),
        }
    }

    /// Current digest of the running state.
    pub fn digest(&self) -> [u8; HASH_SIZE] {
        self.hash.clone().finalize().into()
    }

    /// Fold in a header ciphertext and return its tag.
    pub fn update_header(
        &mut self,
        header_ciphertext: &[u8; FRAME_HEADER_SIZE],
    ) -> [u8; FRAME_MAC_SIZE] {
        let digest = self.digest();
        self.fold(&digest, header_ciphertext)
    }

    /// Fold in a (padded) body ciphertext and return its tag.
    pub fn update_body(&mut self, body_ciphertext: &[u8]) -> [u8; FRAME_MAC_SIZE] {
        self.hash.update(body_ciphertext);
        let digest = self.digest();
        self.fold(&digest, &digest[..FRAME_MAC_SIZE])
    }

    fn fold(&mut self, digest: &[u8; HASH_SIZE], seed: &[u8]) -> [u8; FRAME_MAC_SIZE] {
        let mut block = Block::clone_from_slice(&digest[..FRAME_MAC_SIZE]);
        self.cipher.encrypt_block(&mut block);
        for (b, s) in block.iter_mut().zip(seed) {
            *b ^= s;
        }
        self.hash.update(block);

        let mut tag = [0u8; FRAME_MAC_SIZE];
        tag.copy_from_slice(&self.digest()[..FRAME_MAC_SIZE]);
        tag
    }
}

impl std::fmt::Debug for FrameMac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameMac").finish_non_exhaustive()
    }
}
