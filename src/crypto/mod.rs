//! Cryptographic building blocks
//!
//! - [`keys`]: secp256k1 identities, ECDH and recoverable signatures
//! - [`ecies`]: the encrypted envelope used by the handshake packets

pub mod ecies;
pub mod keys;

pub use keys::{address_hash, recover, Identity, PublicKey, SharedSecret};
