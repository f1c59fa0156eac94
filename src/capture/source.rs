//! Bit-source abstraction.
//!
//! This module provides a trait over random bit sources, allowing a
//! real sampling backend and deterministic test doubles to be swapped
//! by configuration.

use super::sample::BitSample;
use crate::bits::BitString;
use crate::config::{SourceConfig, SourceKind};
use rand_chacha::ChaCha20Rng;
use rand_core::{OsRng, RngCore, SeedableRng};
use thiserror::Error;

/// Errors that can occur while sampling a bit source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The request itself is malformed.
    #[error("invalid sampling request: {0}")]
    InvalidRequest(String),
    /// The backend could not produce bits.
    #[error("bit source unavailable: {0}")]
    Unavailable(String),
}

/// Trait for random bit sources.
///
/// The core treats a source as opaque: its output is only judged by
/// the health gate.
pub trait BitSource {
    /// Short backend name for logs and reports.
    fn name(&self) -> &str;

    /// Produces `num_bits` bits; `shots` is the backend's sampling budget.
    fn sample(&mut self, num_bits: usize, shots: usize) -> Result<BitSample, SourceError>;
}

impl<T: BitSource + ?Sized> BitSource for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn sample(&mut self, num_bits: usize, shots: usize) -> Result<BitSample, SourceError> {
        (**self).sample(num_bits, shots)
    }
}

fn check_request(num_bits: usize) -> Result<(), SourceError> {
    if num_bits == 0 {
        return Err(SourceError::InvalidRequest(
            "num_bits must be positive".to_string(),
        ));
    }
    Ok(())
}

fn bits_from_rng<R: RngCore>(rng: &mut R, num_bits: usize) -> Result<BitString, SourceError> {
    let mut buf = vec![0u8; num_bits.div_ceil(8)];
    rng.try_fill_bytes(&mut buf)
        .map_err(|e| SourceError::Unavailable(e.to_string()))?;
    Ok(BitString::from_packed_bytes(&buf, num_bits))
}

/// Real sampling backend drawing from the operating system's CSPRNG.
#[derive(Debug, Default)]
pub struct OsBitSource {
    total_bits: u64,
}

impl OsBitSource {
    /// Creates an OS-backed source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bits produced so far.
    pub fn total_bits(&self) -> u64 {
        self.total_bits
    }
}

impl BitSource for OsBitSource {
    fn name(&self) -> &str {
        "os"
    }

    fn sample(&mut self, num_bits: usize, shots: usize) -> Result<BitSample, SourceError> {
        check_request(num_bits)?;
        let bits = bits_from_rng(&mut OsRng, num_bits)?;
        self.total_bits += num_bits as u64;
        Ok(BitSample::new(bits, shots, self.name()))
    }
}

/// Deterministic ChaCha20-backed source for reproducible runs and tests.
pub struct SeededBitSource {
    rng: ChaCha20Rng,
    seed: u64,
}

impl SeededBitSource {
    /// Creates a source seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// The seed this source was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl std::fmt::Debug for SeededBitSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeededBitSource")
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

impl BitSource for SeededBitSource {
    fn name(&self) -> &str {
        "seeded"
    }

    fn sample(&mut self, num_bits: usize, shots: usize) -> Result<BitSample, SourceError> {
        check_request(num_bits)?;
        let bits = bits_from_rng(&mut self.rng, num_bits)?;
        Ok(BitSample::new(bits, shots, self.name()))
    }
}

/// Replays a fixed bit pattern cyclically.
///
/// Models stuck or biased hardware in tests. NOT a source of entropy.
#[derive(Debug, Clone)]
pub struct PatternBitSource {
    pattern: BitString,
    position: usize,
}

impl PatternBitSource {
    /// Creates a source replaying `pattern`; fails if it is empty.
    pub fn new(pattern: BitString) -> Result<Self, SourceError> {
        if pattern.is_empty() {
            return Err(SourceError::InvalidRequest(
                "pattern must not be empty".to_string(),
            ));
        }
        Ok(Self {
            pattern,
            position: 0,
        })
    }

    /// A source that only ever emits `bit`.
    pub fn stuck(bit: bool) -> Self {
        Self {
            pattern: BitString::from_bools([bit]),
            position: 0,
        }
    }
}

impl BitSource for PatternBitSource {
    fn name(&self) -> &str {
        "pattern"
    }

    fn sample(&mut self, num_bits: usize, shots: usize) -> Result<BitSample, SourceError> {
        check_request(num_bits)?;
        let len = self.pattern.len();
        let start = self.position;
        let bits = BitString::from_bools(
            (0..num_bits).map(|i| self.pattern.get((start + i) % len).unwrap_or(false)),
        );
        self.position = (start + num_bits) % len;
        Ok(BitSample::new(bits, shots, self.name()))
    }
}

/// Builds the source selected by configuration.
pub fn build_source(config: &SourceConfig) -> Result<Box<dyn BitSource + Send>, SourceError> {
    let source: Box<dyn BitSource + Send> = match config.kind {
        SourceKind::Os => Box::new(OsBitSource::new()),
        SourceKind::Seeded => Box::new(SeededBitSource::new(config.seed.unwrap_or(0))),
        SourceKind::Pattern => {
            let text = config.pattern.as_deref().unwrap_or_default();
            let pattern = text
                .parse::<BitString>()
                .map_err(|e| SourceError::InvalidRequest(e.to_string()))?;
            Box::new(PatternBitSource::new(pattern)?)
        }
    };
    tracing::info!(source = source.name(), "Bit source selected");
    Ok(source)
}
