//! Decoder for the return value of a view method that yields a single
//! dynamic array (`uint256[]`).
//!
//! The ABI head is one 32-byte offset word, followed at that offset by a
//! 32-byte length word and `length` element words. Only the head layout a
//! single dynamic return value produces is supported: the offset word is read
//! and ignored, the length is always taken from the second word.

use crate::error::DecodeError;
use alloy_primitives::U256;
use std::str::FromStr;
use tracing::warn;

/// Hex characters in one 32-byte ABI word.
pub const WORD_HEX_LEN: usize = 64;

/// Offset word plus length word.
const HEADER_HEX_LEN: usize = 2 * WORD_HEX_LEN;

/// How a payload that is too short to hold an array header is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Report a count of zero and log a warning. Keeps the monitoring signal
    /// alive at the cost of hiding a broken response.
    #[default]
    ZeroOnMalformed,
    /// Surface the short payload as an error.
    Reject,
}

impl FromStr for MalformedPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zero" | "zero_on_malformed" => Ok(MalformedPolicy::ZeroOnMalformed),
            "reject" | "strict" => Ok(MalformedPolicy::Reject),
            other => Err(anyhow::anyhow!(
                "Unknown malformed payload policy '{}', expected 'zero' or 'reject'",
                other
            )),
        }
    }
}

/// The header of a dynamic array as found in a raw `eth_call` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayHeader {
    /// `"0x"`, an empty string, or a string without the `0x` prefix.
    Empty,
    /// Fewer than two words after the prefix; holds the hex length seen.
    Insufficient(usize),
    Decoded { offset: U256, length: U256 },
}

fn payload(raw: &str) -> Option<&str> {
    raw.strip_prefix("0x").filter(|hex| !hex.is_empty())
}

fn parse_word(hex: &str, index: usize) -> Result<U256, DecodeError> {
    let start = index * WORD_HEX_LEN;
    let word = hex
        .get(start..start + WORD_HEX_LEN)
        .ok_or_else(|| DecodeError::InvalidHex {
            word: index,
            detail: "not a 64 character ASCII word".to_string(),
        })?;

    if !word.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DecodeError::InvalidHex {
            word: index,
            detail: format!("non-hex characters in '{word}'"),
        });
    }

    U256::from_str_radix(word, 16).map_err(|e| DecodeError::InvalidHex {
        word: index,
        detail: e.to_string(),
    })
}

/// Reads the offset and length words. Only non-hex input is an error; empty
/// and short payloads are reported through [`ArrayHeader`].
pub fn read_header(raw: &str) -> Result<ArrayHeader, DecodeError> {
    let Some(hex) = payload(raw) else {
        return Ok(ArrayHeader::Empty);
    };

    if hex.len() < HEADER_HEX_LEN {
        return Ok(ArrayHeader::Insufficient(hex.len()));
    }

    let offset = parse_word(hex, 0)?;
    let length = parse_word(hex, 1)?;

    Ok(ArrayHeader::Decoded { offset, length })
}

impl MalformedPolicy {
    /// Turns a header into the array length this policy reports.
    pub fn resolve(self, header: &ArrayHeader) -> Result<U256, DecodeError> {
        match (header, self) {
            (ArrayHeader::Empty, _) => Ok(U256::ZERO),
            (ArrayHeader::Insufficient(len), MalformedPolicy::ZeroOnMalformed) => {
                warn!(hex_len = len, "Insufficient data length, treating as 0");
                Ok(U256::ZERO)
            }
            (ArrayHeader::Insufficient(len), MalformedPolicy::Reject) => {
                Err(DecodeError::InsufficientData(*len))
            }
            (ArrayHeader::Decoded { length, .. }, _) => Ok(*length),
        }
    }
}

/// Decodes the declared length of the returned array.
pub fn decode_array_length(raw: &str, policy: MalformedPolicy) -> Result<U256, DecodeError> {
    policy.resolve(&read_header(raw)?)
}

/// Decodes the array elements. Element words missing from the payload are
/// dropped, so the result may be shorter than the declared length.
pub fn decode_array_elements(raw: &str) -> Result<Vec<U256>, DecodeError> {
    let length = match read_header(raw)? {
        ArrayHeader::Decoded { length, .. } => length,
        ArrayHeader::Empty | ArrayHeader::Insufficient(_) => return Ok(Vec::new()),
    };

    // `read_header` only returns `Decoded` for a prefixed payload
    let hex = payload(raw).unwrap_or_default();
    let available = (hex.len() - HEADER_HEX_LEN) / WORD_HEX_LEN;
    let count = if length < U256::from(available) {
        length.to::<usize>()
    } else {
        available
    };

    (0..count).map(|i| parse_word(hex, i + 2)).collect()
}
