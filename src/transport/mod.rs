//! Transport layer
//!
//! Framing and sessions on top of the handshake's secrets:
//!
//! - **Frame codec**: [`FrameWriter`], [`FrameReader`] and [`FrameCodec`]
//!   encrypt and authenticate frames with per-direction running MACs
//! - **Sessions**: [`Session`] runs the handshake on an async stream and then
//!   sends and receives frames (requires the `transport` feature)
//! - **Configuration**: [`SessionConfig`] and its builder
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Application protocols           │
//! ├─────────────────────────────────────────┤
//! │   Session: send / receive / close       │  ← This module
//! │   FrameCodec: AES-256-CTR + Keccak MAC  │
//! ├─────────────────────────────────────────┤
//! │   Handshake: ECIES auth / ack           │
//! ├─────────────────────────────────────────┤
//! │        TCP (any async byte stream)      │
//! └─────────────────────────────────────────┘
//! ```

mod config;
mod frame;
mod mac;

#[cfg(feature = "transport")]
mod error;
#[cfg(feature = "transport")]
mod session;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use frame::*;
pub use mac::FrameMac;

#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub use error::{SessionError, SessionResult};
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub use session::Session;
