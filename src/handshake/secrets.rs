//! Session secret derivation
//!
//! ```text
//! e      = ECDH(ephemeral_local, ephemeral_remote).x
//! shared = keccak256(e || keccak256(recipient_nonce || initiator_nonce))
//! aes    = keccak256(e || shared)
//! mac    = keccak256(e || aes)
//!
//! mac1 = keccak256-state((mac xor recipient_nonce) || auth_packet)
//! mac2 = keccak256-state((mac xor initiator_nonce) || ack_packet)
//!
//! initiator: egress = mac1, ingress = mac2
//! recipient: egress = mac2, ingress = mac1
//! ```
//!
//! The two packets are absorbed exactly as they went over the wire, size
//! prefix included for EIP-8.

use std::fmt;

use sha3::{Digest, Keccak256};
use zeroize::{Zeroize, Zeroizing};

use crate::core::{HASH_SIZE, NONCE_SIZE};
use crate::crypto::{PublicKey, SharedSecret};

use super::Role;

/// Keys and running MAC states for one established session.
///
/// Secrets are erased on drop. The running Keccak states are not zeroized
/// by the hasher, so they are dropped as soon as the frame codec has cloned
/// them.
pub struct SessionSecrets {
    role: Role,
    remote: PublicKey,
    aes_secret: [u8; HASH_SIZE],
    mac_secret: [u8; HASH_SIZE],
    egress_mac: Keccak256,
    ingress_mac: Keccak256,
}

impl SessionSecrets {
    /// Derive session secrets from the completed handshake.
    pub fn derive(
        role: Role,
        ephemeral_secret: &SharedSecret,
        initiator_nonce: &[u8; NONCE_SIZE],
        recipient_nonce: &[u8; NONCE_SIZE],
        auth_packet: &[u8],
        ack_packet: &[u8],
        remote: PublicKey,
    ) -> Self {
        let e = ephemeral_secret.as_bytes();

        let nonce_hash = keccak(&[recipient_nonce, initiator_nonce]);
        let shared = Zeroizing::new(keccak(&[e, &nonce_hash]));
        let aes_secret = keccak(&[e, shared.as_slice()]);
        let mac_secret = keccak(&[e, &aes_secret]);

        let mac1 = seed_mac(&mac_secret, recipient_nonce, auth_packet);
        let mac2 = seed_mac(&mac_secret, initiator_nonce, ack_packet);

        let (egress_mac, ingress_mac) = match role {
            Role::Initiator => (mac1, mac2),
            Role::Recipient => (mac2, mac1),
        };

        Self {
            role,
            remote,
            aes_secret,
            mac_secret,
            egress_mac,
            ingress_mac,
        }
    }

    /// Our side of the handshake.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The authenticated long-term key of the peer.
    pub fn remote_public_key(&self) -> &PublicKey {
        &self.remote
    }

    /// Frame encryption key (AES-256-CTR, both directions).
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn aes_secret(&self) -> &[u8; HASH_SIZE] {
        &self.aes_secret
    }

    /// Frame MAC key (AES-256 block cipher for MAC seeds).
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn mac_secret(&self) -> &[u8; HASH_SIZE] {
        &self.mac_secret
    }

    /// Current digest of the egress MAC state.
    pub fn egress_seed(&self) -> [u8; HASH_SIZE] {
        self.egress_mac.clone().finalize().into()
    }

    /// Current digest of the ingress MAC state.
    pub fn ingress_seed(&self) -> [u8; HASH_SIZE] {
        self.ingress_mac.clone().finalize().into()
    }

    pub(crate) fn egress_mac(&self) -> Keccak256 {
        self.egress_mac.clone()
    }

    pub(crate) fn ingress_mac(&self) -> Keccak256 {
        self.ingress_mac.clone()
    }
}

impl fmt::Debug for SessionSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSecrets")
            .field("role", &self.role)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

impl Drop for SessionSecrets {
    fn drop(&mut self) {
        self.aes_secret.zeroize();
        self.mac_secret.zeroize();
    }
}

fn keccak(parts: &[&[u8]]) -> [u8; HASH_SIZE] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn seed_mac(mac_secret: &[u8; HASH_SIZE], nonce: &[u8; NONCE_SIZE], packet: &[u8]) -> Keccak256 {
    let mut seed = Zeroizing::new([0u8; HASH_SIZE]);
    for (out, (m, n)) in seed.iter_mut().zip(mac_secret.iter().zip(nonce)) {
        *out = m ^ n;
    }

    let mut mac = Keccak256::new();
    mac.update(seed.as_slice());
    mac.update(packet);
    mac
}
