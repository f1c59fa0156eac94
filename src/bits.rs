//! Bitstring type shared by the health tests and key derivation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors from parsing a textual bitstring.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BitParseError {
    /// A character other than `0` or `1`.
    #[error("invalid character {found:?} at position {position} (expected '0' or '1')")]
    InvalidCharacter {
        /// Zero-based index of the offending character.
        position: usize,
        /// The character found.
        found: char,
    },
}

/// Measurement counts reported by a bit source, keyed `"0"` / `"1"` on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitCounts {
    /// Number of `0` outcomes.
    #[serde(rename = "0")]
    pub zeros: u64,
    /// Number of `1` outcomes.
    #[serde(rename = "1")]
    pub ones: u64,
}

impl BitCounts {
    /// Total number of outcomes.
    pub fn total(&self) -> u64 {
        self.zeros + self.ones
    }
}

impl From<&BitString> for BitCounts {
    fn from(bits: &BitString) -> Self {
        let zeros = bits.count_zeros() as u64;
        Self {
            zeros,
            ones: bits.len() as u64 - zeros,
        }
    }
}

/// An ordered, immutable sequence of bits.
///
/// This is the unit of analysis for the health tests and the input
/// keying material for the KDF. Each element is stored as `0` or `1`.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BitString {
    bits: Vec<u8>,
}

impl BitString {
    /// Creates an empty bitstring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a bitstring from booleans.
    pub fn from_bools<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        Self {
            bits: iter.into_iter().map(u8::from).collect(),
        }
    }

    /// Unpacks `bit_len` bits from big-endian bytes, MSB first.
    ///
    /// Bits beyond `bytes.len() * 8` are not invented; the result is
    /// truncated to what the bytes actually hold.
    pub fn from_packed_bytes(bytes: &[u8], bit_len: usize) -> Self {
        let bits = bytes
            .iter()
            .flat_map(|byte| (0..8).rev().map(move |shift| (byte >> shift) & 1))
            .take(bit_len)
            .collect();
        Self { bits }
    }

    /// Returns the number of bits.
    #[inline]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Returns true if there are no bits.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Returns the bits as a slice of `0`/`1` values.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bits
    }

    /// Returns the bit at `index`, if any.
    #[inline]
    pub fn get(&self, index: usize) -> Option<bool> {
        self.bits.get(index).map(|&b| b == 1)
    }

    /// Iterates over the bits as booleans.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.bits.iter().map(|&b| b == 1)
    }

    /// Counts `0` bits.
    pub fn count_zeros(&self) -> usize {
        self.bits.iter().filter(|&&b| b == 0).count()
    }

    /// Counts `1` bits.
    pub fn count_ones(&self) -> usize {
        self.bits.len() - self.count_zeros()
    }

    /// Length of the longest run of identical consecutive bits.
    pub fn longest_run(&self) -> usize {
        let mut longest = 0;
        let mut run = 0;
        let mut prev = None;
        for &bit in &self.bits {
            run = if prev == Some(bit) { run + 1 } else { 1 };
            longest = longest.max(run);
            prev = Some(bit);
        }
        longest
    }

    /// Packs the bits into big-endian bytes.
    ///
    /// The sequence is right-padded with zero bits up to a multiple of
    /// eight. When the length is not byte aligned the padding dilutes the
    /// entropy per packed byte; this is accepted rather than corrected.
    pub fn to_packed_bytes(&self) -> Vec<u8> {
        self.bits
            .chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .chain(std::iter::repeat(&0))
                    .take(8)
                    .fold(0u8, |acc, &bit| (acc << 1) | bit)
            })
            .collect()
    }

    /// Inverts the bit at `index`; out-of-range indices are ignored.
    pub(crate) fn flip(&mut self, index: usize) {
        if let Some(bit) = self.bits.get_mut(index) {
            *bit ^= 1;
        }
    }
}

impl FromStr for BitString {
    type Err = BitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bits = s
            .chars()
            .enumerate()
            .map(|(position, c)| match c {
                '0' => Ok(0),
                '1' => Ok(1),
                found => Err(BitParseError::InvalidCharacter { position, found }),
            })
            .collect::<Result<Vec<u8>, _>>()?;
        Ok(Self { bits })
    }
}

impl TryFrom<String> for BitString {
    type Error = BitParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BitString> for String {
    fn from(value: BitString) -> Self {
        value.to_string()
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: String = self
            .bits
            .iter()
            .map(|&b| if b == 1 { '1' } else { '0' })
            .collect();
        f.write_str(&text)
    }
}

impl fmt::Debug for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitString")
            .field("len", &self.bits.len())
            .field("zeros", &self.count_zeros())
            .field("longest_run", &self.longest_run())
            .finish()
    }
}
