//! Minimal RLP subset
//!
//! Only what the handshake bodies and frame header data need: byte strings,
//! unsigned integers and flat lists. Decoding is tolerant of trailing data so
//! that EIP-8 padding and extra list elements from newer peers are ignored.

use thiserror::Error;

/// RLP decoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RlpError {
    /// Input ended before the declared length.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Expected a list, found a byte string.
    #[error("expected a list")]
    ExpectedList,

    /// Expected a byte string, found a list.
    #[error("expected a byte string")]
    ExpectedBytes,

    /// Byte string has the wrong length for the field.
    #[error("expected {expected} bytes, got {actual}")]
    WrongLength {
        /// Required length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Integer does not fit the target type.
    #[error("integer overflow")]
    IntegerOverflow,

    /// List has fewer elements than required.
    #[error("list has {actual} elements, need at least {expected}")]
    MissingElement {
        /// Required element count.
        expected: usize,
        /// Actual element count.
        actual: usize,
    },
}

/// A decoded RLP item, borrowing its payload from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Item<'a> {
    /// Byte string payload.
    Bytes(&'a [u8]),
    /// List payload (still encoded).
    List(&'a [u8]),
}

impl<'a> Item<'a> {
    /// Get the byte string payload.
    pub fn bytes(self) -> Result<&'a [u8], RlpError> {
        match self {
            Item::Bytes(bytes) => Ok(bytes),
            Item::List(_) => Err(RlpError::ExpectedBytes),
        }
    }

    /// Get a byte string of exactly `N` bytes.
    pub fn array<const N: usize>(self) -> Result<[u8; N], RlpError> {
        let bytes = self.bytes()?;
        bytes.try_into().map_err(|_| RlpError::WrongLength {
            expected: N,
            actual: bytes.len(),
        })
    }

    /// Interpret a byte string as a big-endian unsigned integer.
    pub fn uint(self) -> Result<u64, RlpError> {
        let bytes = self.bytes()?;
        if bytes.len() > 8 {
            return Err(RlpError::IntegerOverflow);
        }
        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }
}

/// Append an RLP byte string.
pub fn encode_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        out.push(bytes[0]);
    } else {
        encode_header(out, 0x80, bytes.len());
        out.extend_from_slice(bytes);
    }
}

/// Append an RLP unsigned integer (minimal big-endian, zero is empty).
pub fn encode_uint(out: &mut Vec<u8>, value: u64) {
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    encode_bytes(out, &bytes[start..]);
}

/// Append an RLP list whose items are already encoded in `payload`.
pub fn encode_list(out: &mut Vec<u8>, payload: &[u8]) {
    encode_header(out, 0xc0, payload.len());
    out.extend_from_slice(payload);
}

fn encode_header(out: &mut Vec<u8>, offset: u8, len: usize) {
    if len < 56 {
        out.push(offset + len as u8);
    } else {
        let bytes = (len as u64).to_be_bytes();
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        out.push(offset + 55 + (bytes.len() - start) as u8);
        out.extend_from_slice(&bytes[start..]);
    }
}

/// Decode one item from the front of `data`, returning it and the remainder.
pub fn decode_item(data: &[u8]) -> Result<(Item<'_>, &[u8]), RlpError> {
    let (&first, rest) = data.split_first().ok_or(RlpError::UnexpectedEof)?;

    let (is_list, header_len, payload_len) = match first {
        0x00..=0x7f => return Ok((Item::Bytes(&data[..1]), rest)),
        0x80..=0xb7 => (false, 1, usize::from(first - 0x80)),
        0xb8..=0xbf => {
            let len_len = usize::from(first - 0xb7);
            (false, 1 + len_len, read_length(rest, len_len)?)
        }
        0xc0..=0xf7 => (true, 1, usize::from(first - 0xc0)),
        0xf8..=0xff => {
            let len_len = usize::from(first - 0xf7);
            (true, 1 + len_len, read_length(rest, len_len)?)
        }
    };

    let end = header_len
        .checked_add(payload_len)
        .ok_or(RlpError::UnexpectedEof)?;
    if data.len() < end {
        return Err(RlpError::UnexpectedEof);
    }

    let payload = &data[header_len..end];
    let item = if is_list {
        Item::List(payload)
    } else {
        Item::Bytes(payload)
    };
    Ok((item, &data[end..]))
}

fn read_length(data: &[u8], len_len: usize) -> Result<usize, RlpError> {
    if len_len > std::mem::size_of::<usize>() {
        return Err(RlpError::IntegerOverflow);
    }
    let bytes = data.get(..len_len).ok_or(RlpError::UnexpectedEof)?;
    Ok(bytes.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b)))
}

/// Decode a list at the front of `data` into its items.
///
/// Bytes after the list (such as EIP-8 padding) are returned untouched.
pub fn decode_list(data: &[u8]) -> Result<(Vec<Item<'_>>, &[u8]), RlpError> {
    let (item, rest) = decode_item(data)?;
    let Item::List(mut payload) = item else {
        return Err(RlpError::ExpectedList);
    };

    let mut items = Vec::new();
    while !payload.is_empty() {
        let (item, remaining) = decode_item(payload)?;
        items.push(item);
        payload = remaining;
    }
    Ok((items, rest))
}

/// Get list element `index`, failing if the list is too short.
pub fn element<'a>(items: &[Item<'a>], index: usize) -> Result<Item<'a>, RlpError> {
    items.get(index).copied().ok_or(RlpError::MissingElement {
        expected: index + 1,
        actual: items.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded_uint(value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        encode_uint(&mut out, value);
        out
    }

    #[test]
    fn test_encode_uint() {
        assert_eq!(encoded_uint(0), vec![0x80]);
        assert_eq!(encoded_uint(4), vec![0x04]);
        assert_eq!(encoded_uint(0x7f), vec![0x7f]);
        assert_eq!(encoded_uint(0x80), vec![0x81, 0x80]);
        assert_eq!(encoded_uint(0x0400), vec![0x82, 0x04, 0x00]);
    }

    #[test]
    fn test_encode_strings() {
        let mut out = Vec::new();
        encode_bytes(&mut out, b"dog");
        assert_eq!(out, vec![0x83, b'd', b'o', b'g']);

        let mut out = Vec::new();
        encode_bytes(&mut out, &[0xaa; 64]);
        assert_eq!(&out[..2], &[0xb8, 0x40]);
        assert_eq!(out.len(), 66);
    }

    #[test]
    fn test_encode_empty_header_list() {
        // Frame header data [0, 0].
        let mut payload = Vec::new();
        encode_uint(&mut payload, 0);
        encode_uint(&mut payload, 0);
        let mut out = Vec::new();
        encode_list(&mut out, &payload);
        assert_eq!(out, vec![0xc2, 0x80, 0x80]);
    }

    #[test]
    fn test_decode_list_with_trailing_padding() {
        let mut payload = Vec::new();
        encode_bytes(&mut payload, &[0x11; 65]);
        encode_uint(&mut payload, 4);
        let mut data = Vec::new();
        encode_list(&mut data, &payload);
        data.extend_from_slice(&[0xff; 10]);

        let (items, rest) = decode_list(&data).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].array::<65>().unwrap(), [0x11; 65]);
        assert_eq!(items[1].uint().unwrap(), 4);
        assert_eq!(rest, &[0xff; 10]);
    }

    #[test]
    fn test_decode_long_list_header() {
        let mut payload = Vec::new();
        for _ in 0..3 {
            encode_bytes(&mut payload, &[0x22; 32]);
        }
        let mut data = Vec::new();
        encode_list(&mut data, &payload);
        assert_eq!(data[0], 0xf8);
        assert_eq!(data[1], 99);

        let (items, rest) = decode_list(&data).unwrap();
        assert_eq!(items.len(), 3);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode_item(&[]), Err(RlpError::UnexpectedEof));
        assert_eq!(decode_item(&[0x83, 0x01]), Err(RlpError::UnexpectedEof));
        assert_eq!(decode_list(&[0x83, 1, 2, 3]), Err(RlpError::ExpectedList));
        assert_eq!(decode_list(&[0xc2, 0x80]), Err(RlpError::UnexpectedEof));

        let (items, _) = decode_list(&[0xc1, 0x80]).unwrap();
        assert_eq!(
            items[0].array::<32>(),
            Err(RlpError::WrongLength {
                expected: 32,
                actual: 0
            })
        );
        assert_eq!(
            element(&items, 3),
            Err(RlpError::MissingElement {
                expected: 4,
                actual: 1
            })
        );
        assert_eq!(Item::List(&[]).uint(), Err(RlpError::ExpectedBytes));
        assert_eq!(Item::Bytes(&[1; 9]).uint(), Err(RlpError::IntegerOverflow));
    }
}
