//! A batch of bits returned by a bit source.

use crate::bits::{BitCounts, BitString};
use serde::Serialize;

/// Bits sampled from a source along with their measurement counts.
#[derive(Debug, Clone, Serialize)]
pub struct BitSample {
    /// The sampled bits, in order.
    pub bits: BitString,
    /// Outcome counts over `bits`.
    pub counts: BitCounts,
    /// Sampling budget requested from the backend.
    pub shots: usize,
    /// Backend that produced the sample.
    pub source: String,
}

impl BitSample {
    /// Creates a sample, computing counts from the bits.
    pub fn new(bits: BitString, shots: usize, source: &str) -> Self {
        Self {
            counts: BitCounts::from(&bits),
            bits,
            shots,
            source: source.to_string(),
        }
    }
}
