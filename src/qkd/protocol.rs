//! QKD protocol interface and placeholder simulators.
//!
//! The simulators stand in for a real quantum backend: they produce
//! results with the right shape and plausible ranges, drawn from an
//! injected RNG. Their statistics are NOT derived from any physics.

use super::sifting::{sift, Basis, Measurement, SiftedKey};
use crate::bits::BitString;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Local-realistic bound on the CHSH S parameter.
pub const CLASSICAL_LIMIT: f64 = 2.0;

/// Tsirelson bound (2√2) on the CHSH S parameter.
pub const QUANTUM_LIMIT: f64 = 2.828;

/// Which key-exchange protocol produced a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProtocolKind {
    /// Entanglement-based (Ekert 1991).
    E91,
    /// Prepare-and-measure (Bennett-Brassard 1984).
    Bb84,
}

/// Outcome of one protocol run.
#[derive(Debug, Clone, Serialize)]
pub struct QkdRoundResult {
    /// Protocol that produced the round.
    pub protocol: ProtocolKind,
    /// Key bits kept after sifting.
    pub sifted_key: BitString,
    /// Length of `sifted_key`.
    pub sifted_key_length: usize,
    /// Quantum bit error rate in `[0, 1]`.
    pub qber: f64,
    /// Sifted bits per round, in `[0, 1]`.
    pub efficiency: f64,
    /// Wall time of the run.
    pub elapsed: Duration,
    /// Exchanges attempted.
    pub total_rounds: usize,
}

impl QkdRoundResult {
    /// Builds a round result from a sifted key.
    pub fn from_sifted(protocol: ProtocolKind, sifted: SiftedKey, elapsed: Duration) -> Self {
        Self {
            protocol,
            sifted_key_length: sifted.key.len(),
            efficiency: sifted.efficiency(),
            qber: sifted.qber,
            sifted_key: sifted.key,
            elapsed,
            total_rounds: sifted.total_rounds,
        }
    }
}

/// CHSH correlators for the four basis pairs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correlations {
    /// Correlator for bases a, b.
    #[serde(rename = "E(a,b)")]
    pub ab: f64,
    /// Correlator for bases a, b'.
    #[serde(rename = "E(a,b')")]
    pub ab_prime: f64,
    /// Correlator for bases a', b.
    #[serde(rename = "E(a',b)")]
    pub a_prime_b: f64,
    /// Correlator for bases a', b'.
    #[serde(rename = "E(a',b')")]
    pub a_prime_b_prime: f64,
}

impl Correlations {
    /// `S = E(a,b) - E(a,b') + E(a',b) + E(a',b')`.
    pub fn chsh(&self) -> f64 {
        self.ab - self.ab_prime + self.a_prime_b + self.a_prime_b_prime
    }
}

/// Result of a CHSH Bell test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BellTestResult {
    /// CHSH S value.
    #[serde(rename = "S")]
    pub s: f64,
    /// Local-realistic bound.
    pub classical_limit: f64,
    /// Tsirelson bound.
    pub quantum_limit: f64,
    /// The four correlators.
    pub correlations: Correlations,
    /// Measurement budget.
    pub shots: usize,
}

impl BellTestResult {
    /// Builds a result with S computed from the correlators.
    pub fn from_correlations(correlations: Correlations, shots: usize) -> Self {
        Self {
            s: correlations.chsh(),
            classical_limit: CLASSICAL_LIMIT,
            quantum_limit: QUANTUM_LIMIT,
            correlations,
            shots,
        }
    }
}

/// A key-exchange protocol producing round results.
pub trait QkdProtocol {
    /// Which protocol this runs.
    fn kind(&self) -> ProtocolKind;

    /// Runs the protocol for `rounds` exchanges.
    fn run(&mut self, rounds: usize) -> QkdRoundResult;
}

fn random_key<R: Rng>(rng: &mut R, len: usize) -> BitString {
    BitString::from_bools((0..len).map(|_| rng.gen_bool(0.5)))
}

/// Placeholder E91 (entanglement-based) simulator.
#[derive(Debug)]
pub struct E91Simulator<R> {
    rng: R,
}

impl<R: Rng> E91Simulator<R> {
    /// Creates a simulator drawing from `rng`.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Placeholder CHSH test with S drawn from `[2.3, 2.7)`.
    ///
    /// Correlators are set to `±S/4` so that they reproduce S exactly.
    pub fn bell_test_chsh(&mut self, shots: usize) -> BellTestResult {
        let s = self.rng.gen_range(2.3..2.7);
        let e = s / 4.0;
        BellTestResult::from_correlations(
            Correlations {
                ab: e,
                ab_prime: -e,
                a_prime_b: e,
                a_prime_b_prime: e,
            },
            shots,
        )
    }

    /// Ideal entangled measurements with random basis choices.
    ///
    /// Matching bases give identical bits; mismatched bases give
    /// independent bits.
    pub fn measure(&mut self, rounds: usize) -> (Vec<Measurement>, Vec<Measurement>) {
        (0..rounds)
            .map(|_| {
                let a_basis = Basis::ALL[self.rng.gen_range(0..Basis::ALL.len())];
                let b_basis = Basis::ALL[self.rng.gen_range(0..Basis::ALL.len())];
                let a_bit = self.rng.gen_bool(0.5);
                let b_bit = if a_basis == b_basis {
                    a_bit
                } else {
                    self.rng.gen_bool(0.5)
                };
                (
                    Measurement {
                        basis: a_basis,
                        bit: a_bit,
                    },
                    Measurement {
                        basis: b_basis,
                        bit: b_bit,
                    },
                )
            })
            .unzip()
    }

    /// Runs the basis-choice path and sifts the result.
    pub fn run_sifted(&mut self, rounds: usize) -> QkdRoundResult {
        let start = Instant::now();
        let (alice, bob) = self.measure(rounds);
        QkdRoundResult::from_sifted(ProtocolKind::E91, sift(&alice, &bob), start.elapsed())
    }
}

impl<R: Rng> QkdProtocol for E91Simulator<R> {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::E91
    }

    fn run(&mut self, rounds: usize) -> QkdRoundResult {
        let start = Instant::now();
        let sifted_len = ((rounds as f64 * 0.6) as usize).max(1);
        let sifted_key = random_key(&mut self.rng, sifted_len);
        let qber = self.rng.gen_range(0.02..0.06);

        QkdRoundResult {
            protocol: ProtocolKind::E91,
            sifted_key,
            sifted_key_length: sifted_len,
            qber,
            efficiency: sifted_len as f64 / rounds.max(1) as f64,
            elapsed: start.elapsed(),
            total_rounds: rounds,
        }
    }
}

/// Placeholder BB84 (prepare-and-measure) simulator.
#[derive(Debug)]
pub struct Bb84Simulator<R> {
    rng: R,
}

impl<R: Rng> Bb84Simulator<R> {
    /// Creates a simulator drawing from `rng`.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> QkdProtocol for Bb84Simulator<R> {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Bb84
    }

    fn run(&mut self, rounds: usize) -> QkdRoundResult {
        let start = Instant::now();
        let sifted_len = (rounds / 2).max(1);
        let sifted_key = random_key(&mut self.rng, sifted_len);
        let qber = self.rng.gen_range(0.03..0.09);

        QkdRoundResult {
            protocol: ProtocolKind::Bb84,
            sifted_key,
            sifted_key_length: sifted_len,
            qber,
            efficiency: sifted_len as f64 / rounds.max(1) as f64,
            elapsed: start.elapsed(),
            total_rounds: rounds,
        }
    }
}
