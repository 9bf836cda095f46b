//! Protocol constants for the RLPx transport.
//!
//! These values are fixed by the wire protocol and MUST NOT be changed;
//! peers that disagree on any of them cannot interoperate.

use std::time::Duration;

// =============================================================================
// KEY MATERIAL
// =============================================================================

/// secp256k1 secret scalar size.
pub const SECRET_KEY_SIZE: usize = 32;

/// Uncompressed public key size without the 0x04 tag (X || Y).
pub const PUBLIC_KEY_SIZE: usize = 64;

/// Uncompressed public key size including the 0x04 tag.
pub const PUBLIC_KEY_TAGGED_SIZE: usize = 65;

/// ECDH shared secret size (x-coordinate of the shared point).
pub const SHARED_SECRET_SIZE: usize = 32;

/// Recoverable ECDSA signature size (r || s || v).
pub const SIGNATURE_SIZE: usize = 65;

/// Keccak-256 / SHA-256 output size.
pub const HASH_SIZE: usize = 32;

/// Address hash size (last 20 bytes of the Keccak-256 of the public key).
pub const ADDRESS_HASH_SIZE: usize = 20;

/// Handshake nonce size.
pub const NONCE_SIZE: usize = 32;

// =============================================================================
// ECIES ENVELOPE
// =============================================================================

/// AES-128-CTR key size used inside the envelope.
pub const ECIES_KEY_SIZE: usize = 16;

/// AES block / CTR initialization vector size.
pub const ECIES_IV_SIZE: usize = 16;

/// HMAC-SHA256 tag size.
pub const ECIES_TAG_SIZE: usize = 32;

/// Bytes added by sealing: ephemeral key (65) + IV (16) + tag (32).
pub const ECIES_OVERHEAD: usize = PUBLIC_KEY_TAGGED_SIZE + ECIES_IV_SIZE + ECIES_TAG_SIZE;

// =============================================================================
// HANDSHAKE (auth / ack)
// =============================================================================

/// Handshake protocol version advertised in auth and ack messages.
pub const HANDSHAKE_VERSION: u8 = 4;

/// Legacy auth body: signature + H(ephemeral) + public key + nonce + flag.
pub const AUTH_LEGACY_BODY_SIZE: usize =
    SIGNATURE_SIZE + HASH_SIZE + PUBLIC_KEY_SIZE + NONCE_SIZE + 1;

/// Legacy ack body: ephemeral public key + nonce + flag.
pub const ACK_LEGACY_BODY_SIZE: usize = PUBLIC_KEY_SIZE + NONCE_SIZE + 1;

/// Sealed legacy auth packet size (307 bytes).
pub const AUTH_LEGACY_PACKET_SIZE: usize = AUTH_LEGACY_BODY_SIZE + ECIES_OVERHEAD;

/// Sealed legacy ack packet size (210 bytes).
pub const ACK_LEGACY_PACKET_SIZE: usize = ACK_LEGACY_BODY_SIZE + ECIES_OVERHEAD;

/// EIP-8 size prefix length.
pub const EIP8_PREFIX_SIZE: usize = 2;

/// Minimum random padding appended to EIP-8 bodies.
pub const EIP8_MIN_PADDING: usize = 100;

/// Maximum random padding appended to EIP-8 bodies.
pub const EIP8_MAX_PADDING: usize = 300;

/// Largest handshake packet the size prefix can describe.
pub const MAX_HANDSHAKE_PACKET_SIZE: usize = EIP8_PREFIX_SIZE + u16::MAX as usize;

/// Default time budget for a complete handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// FRAMES
// =============================================================================

/// Encrypted frame header size.
pub const FRAME_HEADER_SIZE: usize = 16;

/// Truncated running-MAC size (header MAC and body MAC).
pub const FRAME_MAC_SIZE: usize = 16;

/// Frame bodies are zero-padded to a multiple of this.
pub const FRAME_BLOCK_SIZE: usize = 16;

/// Header plus header MAC, read before the body length is known.
pub const FRAME_PREFIX_SIZE: usize = FRAME_HEADER_SIZE + FRAME_MAC_SIZE;

/// Largest body the 24-bit size field can declare.
pub const MAX_FRAME_SIZE: usize = 0x00FF_FFFF;

/// Size field width in the header plaintext.
pub const FRAME_SIZE_FIELD: usize = 3;
