//! URL-safe base64 without padding, as used by every TCF consent string.
//!
//! Each character carries exactly 6 bits, so a string of `n` characters holds `6 * n` bits.
//! Decoding packs those bits MSB-first into bytes, the last byte being zero padded.
use thiserror::Error;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// The error type that describes failures to decode Base64 encoded strings.
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum DecodeError {
    /// An invalid byte was found in the input. The offset and offending byte are provided.
    #[error("invalid byte {1} at offset {0}")]
    InvalidByte(usize, u8),
}

/// Decodes a URL-safe base64 string.
///
/// The returned buffer holds `6 * s.len()` meaningful bits.
pub fn decode(s: &str) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity((s.len() * 6).div_ceil(8));
    let mut buffer = 0u16;
    let mut bits = 0u8;

    for (offset, b) in s.bytes().enumerate() {
        let value = base64_value(b).ok_or(DecodeError::InvalidByte(offset, b))?;

        buffer = (buffer << 6) | u16::from(value);
        bits += 6;

        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }

    // flush remaining bits, left aligned
    if bits > 0 {
        out.push((buffer << (8 - bits)) as u8);
    }

    Ok(out)
}

/// Encodes every bit of `bytes`.
pub fn encode(bytes: &[u8]) -> String {
    encode_bits(bytes, bytes.len() * 8)
}

/// Encodes the first `bits` bits of `bytes` as the shortest string able to hold them.
///
/// The last character is padded with zero bits.
pub fn encode_bits(bytes: &[u8], bits: usize) -> String {
    let bits = bits.min(bytes.len() * 8);
    let chars = bits.div_ceil(6);
    let mut out = String::with_capacity(chars);

    for c in 0..chars {
        let mut value = 0u8;
        for i in 0..6 {
            let pos = c * 6 + i;
            let bit = pos < bits && (bytes[pos / 8] >> (7 - pos % 8)) & 1 == 1;
            value = (value << 1) | u8::from(bit);
        }
        out.push(char::from(ALPHABET[value as usize]));
    }

    out
}

fn base64_value(b: u8) -> Option<u8> {
    match b {
        b'A'..=b'Z' => Some(b - b'A'),
        b'a'..=b'z' => Some(b - b'a' + 26),
        b'0'..=b'9' => Some(b - b'0' + 52),
        b'-' => Some(62),
        b'_' => Some(63),
        _ => None,
    }
}
