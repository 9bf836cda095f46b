//! # RLPx Transport
//!
//! Encrypted, authenticated peer-to-peer transport over TCP, as spoken by
//! devp2p nodes. Two nodes identified by secp256k1 keys run a two-message
//! handshake, derive per-session secrets, and exchange framed messages:
//!
//! - **Identity**: long-term secp256k1 key pairs; the public key is the node id
//! - **Key agreement**: ECIES-sealed auth and ack messages (legacy and EIP-8)
//! - **Forward secrecy**: session keys come from ephemeral ECDH only
//! - **Framing**: AES-256-CTR with running Keccak-256 MACs per direction
//!
//! ## Feature Flags
//!
//! - `transport` (default): async [`Session`](transport::Session) over tokio
//!   streams. Without it the crate is sans-I/O: handshake state machine and
//!   frame codec only.
//!
//! ## Modules
//!
//! - [`core`]: constants and error types (always included)
//! - [`crypto`]: identities, ECDH, signatures and the ECIES envelope
//! - [`handshake`]: auth/ack state machine and session-secret derivation
//! - [`transport`]: frame codec, session configuration and sessions
//! - [`rlp`]: the small RLP subset used on the wire
//!
//! ## Example Usage
//!
//! ```rust
//! use rlpx_transport::prelude::*;
//!
//! let alice = Identity::generate();
//! let bob = Identity::generate();
//!
//! let mut initiator = Handshake::initiator(&alice, *bob.public_key(), HandshakeEncoding::Eip8);
//! let mut recipient = Handshake::recipient(&bob);
//!
//! let auth = initiator.write_auth()?;
//! recipient.read_auth(&auth)?;
//! let ack = recipient.write_ack()?;
//! initiator.read_ack(&ack)?;
//!
//! let mut a = FrameCodec::new(&initiator.finish()?);
//! let mut b = FrameCodec::new(&recipient.finish()?);
//!
//! let wire = a.encode(b"ping")?;
//! assert_eq!(b.decode(&wire)?, b"ping");
//! # Ok::<(), RlpxError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

pub mod crypto;
pub mod handshake;
pub mod rlp;

// Frame codec always; sessions feature-gated inside
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{CryptoError, RlpxError};

    pub use crate::crypto::{Identity, PublicKey};

    pub use crate::handshake::{
        Handshake, HandshakeEncoding, HandshakeError, HandshakeState, ReadProgress, Role,
        SessionSecrets,
    };

    pub use crate::transport::{
        Frame, FrameCodec, FrameError, FrameReader, FrameWriter, SessionConfig,
        SessionConfigBuilder,
    };

    #[cfg(feature = "transport")]
    pub use crate::transport::{Session, SessionError};
}

// Re-export commonly used items at crate root
pub use core::{CryptoError, RlpxError};
pub use crypto::{Identity, PublicKey};
pub use handshake::{HandshakeEncoding, Role};
pub use transport::{FrameCodec, SessionConfig};

#[cfg(feature = "transport")]
pub use transport::{Session, SessionError};
