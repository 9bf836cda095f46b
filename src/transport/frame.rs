//! Frame encoding and decoding for established sessions.
//!
//! Wire format:
//!
//! ```text
//! +------------------+------------+---------------------------+------------+
//! | header ciphertext| header MAC | body ciphertext           | body MAC   |
//! | 16 bytes         | 16 bytes   | size rounded up to 16     | 16 bytes   |
//! +------------------+------------+---------------------------+------------+
//!
//! header plaintext = size (3 bytes BE) || rlp([capability-id, context-id]) || zero pad
//! ```
//!
//! Both directions use AES-256-CTR keyed with the session's AES secret and a
//! zero IV. The keystream continues across frames and is never reset, so a
//! writer and its reader must process exactly the same sequence of frames.

use aes::cipher::{generic_array::GenericArray, KeyIvInit, StreamCipher};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::trace;

use crate::core::{
    FRAME_BLOCK_SIZE, FRAME_HEADER_SIZE, FRAME_MAC_SIZE, FRAME_PREFIX_SIZE, FRAME_SIZE_FIELD,
    MAX_FRAME_SIZE,
};
use crate::handshake::SessionSecrets;
use crate::rlp;

use super::mac::FrameMac;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Which part of a frame failed authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramePart {
    /// The 16-byte header.
    Header,
    /// The padded body.
    Body,
}

impl std::fmt::Display for FramePart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FramePart::Header => f.write_str("header"),
            FramePart::Body => f.write_str("body"),
        }
    }
}

/// Frame codec errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// MAC mismatch. The direction's state is desynchronized and the session
    /// cannot continue.
    #[error("frame {part} authentication failed")]
    AuthenticationFailure {
        /// Part that failed.
        part: FramePart,
    },

    /// Payload exceeds the 24-bit size field or the configured limit.
    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge {
        /// Payload size.
        size: usize,
        /// Limit in force.
        max: usize,
    },

    /// Header decrypted but its data could not be parsed.
    #[error("malformed frame header")]
    MalformedHeader,

    /// Not enough bytes for the frame.
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    TooShort {
        /// Bytes required.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },

    /// Bytes left over after a complete frame.
    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),
}

impl FrameError {
    /// Check if this is a MAC failure.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, FrameError::AuthenticationFailure { .. })
    }
}

/// A decrypted frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload size in bytes, before padding.
    pub size: usize,
    /// Context tag carried in the header data.
    pub context_id: u16,
}

impl FrameHeader {
    /// Serialize the header plaintext.
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        let size = (self.size as u32).to_be_bytes();
        buf[..FRAME_SIZE_FIELD].copy_from_slice(&size[1..]);

        let mut payload = Vec::with_capacity(4);
        rlp::encode_uint(&mut payload, 0);
        rlp::encode_uint(&mut payload, u64::from(self.context_id));
        let mut data = Vec::with_capacity(payload.len() + 1);
        rlp::encode_list(&mut data, &payload);

        buf[FRAME_SIZE_FIELD..FRAME_SIZE_FIELD + data.len()].copy_from_slice(&data);
        buf
    }

    /// Parse a decrypted header plaintext.
    ///
    /// A missing context element reads as zero.
    pub fn from_bytes(bytes: &[u8; FRAME_HEADER_SIZE]) -> Result<Self, FrameError> {
        let size = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]) as usize;

        let (items, _padding) =
            rlp::decode_list(&bytes[FRAME_SIZE_FIELD..]).map_err(|_| FrameError::MalformedHeader)?;
        let context_id = match items.get(1) {
            Some(item) => item
                .uint()
                .ok()
                .and_then(|id| u16::try_from(id).ok())
                .ok_or(FrameError::MalformedHeader)?,
            None => 0,
        };

        Ok(Self { size, context_id })
    }

    /// Body size on the wire: padded payload plus body MAC.
    pub fn body_wire_len(&self) -> usize {
        padded_len(self.size) + FRAME_MAC_SIZE
    }

    /// Whole frame size on the wire.
    pub fn frame_wire_len(&self) -> usize {
        FRAME_PREFIX_SIZE + self.body_wire_len()
    }
}

fn padded_len(size: usize) -> usize {
    size.div_ceil(FRAME_BLOCK_SIZE) * FRAME_BLOCK_SIZE
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Context tag from the header.
    pub context_id: u16,
    /// Decrypted payload.
    pub payload: Vec<u8>,
}

fn new_cipher(secrets: &SessionSecrets) -> Aes256Ctr {
    let iv = GenericArray::default();
    Aes256Ctr::new(GenericArray::from_slice(secrets.aes_secret()), &iv)
}

/// Egress half: encrypts and authenticates outgoing frames.
pub struct FrameWriter {
    cipher: Aes256Ctr,
    mac: FrameMac,
    max_frame_size: usize,
    frames_written: u64,
}

impl FrameWriter {
    /// Create the egress half from established session secrets.
    pub fn new(secrets: &SessionSecrets) -> Self {
        Self {
            cipher: new_cipher(secrets),
            mac: FrameMac::new(secrets.mac_secret(), secrets.egress_mac()),
            max_frame_size: MAX_FRAME_SIZE,
            frames_written: 0,
        }
    }

    /// Lower the payload limit (capped at the 24-bit size field).
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max.min(MAX_FRAME_SIZE);
        self
    }

    /// Encrypt and authenticate one frame.
    ///
    /// Oversized payloads are rejected before any state changes.
    pub fn write_frame(&mut self, payload: &[u8], context_id: u16) -> Result<Vec<u8>, FrameError> {
        if payload.len() > self.max_frame_size {
            return Err(FrameError::TooLarge {
                size: payload.len(),
                max: self.max_frame_size,
            });
        }

        let header = FrameHeader {
            size: payload.len(),
            context_id,
        };
        let mut out = Vec::with_capacity(header.frame_wire_len());

        let mut header_ct = header.to_bytes();
        self.cipher.apply_keystream(&mut header_ct);
        let header_mac = self.mac.update_header(&header_ct);
        out.extend_from_slice(&header_ct);
        out.extend_from_slice(&header_mac);

        let body_start = out.len();
        out.extend_from_slice(payload);
        out.resize(body_start + padded_len(payload.len()), 0);
        self.cipher.apply_keystream(&mut out[body_start..]);
        let body_mac = self.mac.update_body(&out[body_start..]);
        out.extend_from_slice(&body_mac);

        self.frames_written += 1;
        trace!(size = payload.len(), context_id, frame = self.frames_written, "wrote frame");
        Ok(out)
    }

    /// Number of frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Current digest of the egress MAC.
    pub fn mac_digest(&self) -> [u8; 32] {
        self.mac.digest()
    }
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter")
            .field("max_frame_size", &self.max_frame_size)
            .field("frames_written", &self.frames_written)
            .finish_non_exhaustive()
    }
}

/// Ingress half: verifies and decrypts incoming frames.
///
/// Reading is two-step so a stream reader knows how many body bytes to
/// wait for: [`read_header`](Self::read_header) on the first 32 bytes, then
/// [`read_body`](Self::read_body) on the next
/// [`body_wire_len`](FrameHeader::body_wire_len) bytes.
pub struct FrameReader {
    cipher: Aes256Ctr,
    mac: FrameMac,
    max_frame_size: usize,
    frames_read: u64,
}

impl FrameReader {
    /// Create the ingress half from established session secrets.
    pub fn new(secrets: &SessionSecrets) -> Self {
        Self {
            cipher: new_cipher(secrets),
            mac: FrameMac::new(secrets.mac_secret(), secrets.ingress_mac()),
            max_frame_size: MAX_FRAME_SIZE,
            frames_read: 0,
        }
    }

    /// Lower the accepted payload size (capped at the 24-bit size field).
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max.min(MAX_FRAME_SIZE);
        self
    }

    /// Authenticate and decrypt a frame header.
    ///
    /// The MAC is checked before the size is decrypted.
    pub fn read_header(
        &mut self,
        prefix: &[u8; FRAME_PREFIX_SIZE],
    ) -> Result<FrameHeader, FrameError> {
        let (header_ct, mac) = prefix.split_at(FRAME_HEADER_SIZE);
        let mut header = [0u8; FRAME_HEADER_SIZE];
        header.copy_from_slice(header_ct);

        let expected = self.mac.update_header(&header);
        if !bool::from(expected[..].ct_eq(mac)) {
            return Err(FrameError::AuthenticationFailure {
                part: FramePart::Header,
            });
        }

        self.cipher.apply_keystream(&mut header);
        let header = FrameHeader::from_bytes(&header)?;
        if header.size > self.max_frame_size {
            return Err(FrameError::TooLarge {
                size: header.size,
                max: self.max_frame_size,
            });
        }
        Ok(header)
    }

    /// Authenticate and decrypt a frame body, truncating the padding.
    pub fn read_body(&mut self, header: &FrameHeader, body: &[u8]) -> Result<Vec<u8>, FrameError> {
        let expected_len = header.body_wire_len();
        if body.len() != expected_len {
            return Err(FrameError::TooShort {
                expected: expected_len,
                actual: body.len(),
            });
        }

        let (ciphertext, mac) = body.split_at(expected_len - FRAME_MAC_SIZE);
        let expected = self.mac.update_body(ciphertext);
        if !bool::from(expected[..].ct_eq(mac)) {
            return Err(FrameError::AuthenticationFailure {
                part: FramePart::Body,
            });
        }

        let mut payload = ciphertext.to_vec();
        self.cipher.apply_keystream(&mut payload);
        payload.truncate(header.size);

        self.frames_read += 1;
        trace!(
            size = header.size,
            context_id = header.context_id,
            frame = self.frames_read,
            "read frame"
        );
        Ok(payload)
    }

    /// Decode exactly one complete frame from `wire`.
    pub fn read_frame(&mut self, wire: &[u8]) -> Result<Frame, FrameError> {
        let prefix: &[u8; FRAME_PREFIX_SIZE] = wire
            .get(..FRAME_PREFIX_SIZE)
            .and_then(|p| p.try_into().ok())
            .ok_or(FrameError::TooShort {
                expected: FRAME_PREFIX_SIZE,
                actual: wire.len(),
            })?;

        let header = self.read_header(prefix)?;
        let total = header.frame_wire_len();
        if wire.len() < total {
            return Err(FrameError::TooShort {
                expected: total,
                actual: wire.len(),
            });
        }
        if wire.len() > total {
            return Err(FrameError::TrailingBytes(wire.len() - total));
        }

        let payload = self.read_body(&header, &wire[FRAME_PREFIX_SIZE..])?;
        Ok(Frame {
            context_id: header.context_id,
            payload,
        })
    }

    /// Number of frames read so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Current digest of the ingress MAC.
    pub fn mac_digest(&self) -> [u8; 32] {
        self.mac.digest()
    }
}

impl std::fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader")
            .field("max_frame_size", &self.max_frame_size)
            .field("frames_read", &self.frames_read)
            .finish_non_exhaustive()
    }
}

/// Both halves of a session's frame codec, for in-memory use.
#[derive(Debug)]
pub struct FrameCodec {
    writer: FrameWriter,
    reader: FrameReader,
}

impl FrameCodec {
    /// Create a codec from established session secrets.
    pub fn new(secrets: &SessionSecrets) -> Self {
        Self {
            writer: FrameWriter::new(secrets),
            reader: FrameReader::new(secrets),
        }
    }

    /// Apply a payload limit to both directions.
    pub fn with_max_frame_size(self, max: usize) -> Self {
        Self {
            writer: self.writer.with_max_frame_size(max),
            reader: self.reader.with_max_frame_size(max),
        }
    }

    /// Encode a payload with context id zero.
    pub fn encode(&mut self, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
        self.writer.write_frame(payload, 0)
    }

    /// Decode one complete frame and return its payload.
    pub fn decode(&mut self, wire: &[u8]) -> Result<Vec<u8>, FrameError> {
        self.reader.read_frame(wire).map(|frame| frame.payload)
    }

    /// The egress half.
    pub fn writer(&mut self) -> &mut FrameWriter {
        &mut self.writer
    }

    /// The ingress half.
    pub fn reader(&mut self) -> &mut FrameReader {
        &mut self.reader
    }

    /// Split into independently owned halves.
    pub fn split(self) -> (FrameWriter, FrameReader) {
        (self.writer, self.reader)
    }
}
