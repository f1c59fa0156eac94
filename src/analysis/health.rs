//! Entropy health gate.
//!
//! Owns the last health verdict and is the single place where a
//! bitstream is declared fit or unfit for key material.

use super::{
    statistics::{adaptive_proportion_test, repetition_count_test},
    threshold::{HealthCutoffs, HealthViolation},
};
use crate::bits::BitString;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Last health verdict produced by the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthState {
    /// Whether the last evaluated bitstream passed both tests.
    pub ok: bool,
    /// Empty iff `ok`; otherwise names the cutoffs used.
    pub reason: String,
    /// Cutoffs used for the last evaluation.
    #[serde(flatten)]
    pub cutoffs: HealthCutoffs,
    /// Tests that failed on the last evaluation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<HealthViolation>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            ok: true,
            reason: String::new(),
            cutoffs: HealthCutoffs::unset(),
            violations: Vec::new(),
        }
    }
}

/// A bitstring that passed the health gate.
///
/// Only [`HealthGate::admit`] constructs this, so holding one proves the
/// bits were vetted under the gate's latest verdict.
#[derive(Debug, Clone, Copy)]
pub struct VettedBits<'a> {
    bits: &'a BitString,
    cutoffs: HealthCutoffs,
}

impl<'a> VettedBits<'a> {
    /// The vetted bits.
    pub fn bits(&self) -> &'a BitString {
        self.bits
    }

    /// Cutoffs the bits were vetted against.
    pub fn cutoffs(&self) -> HealthCutoffs {
        self.cutoffs
    }
}

/// Gates bitstreams through the repetition count and adaptive
/// proportion tests.
#[derive(Debug, Default)]
pub struct HealthGate {
    state: HealthState,
    evaluations: u64,
    failures: u64,
}

impl HealthGate {
    /// Creates a gate in the initial (`ok`, no reason) state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates a bitstream and overwrites the health state.
    ///
    /// Fails only if `min_entropy_per_bit` is not in `(0, 1]`; an unfit
    /// bitstream is reported through the returned state, not as an error.
    pub fn evaluate(&mut self, bits: &BitString, min_entropy_per_bit: f64) -> Result<HealthState> {
        if !min_entropy_per_bit.is_finite()
            || min_entropy_per_bit <= 0.0
            || min_entropy_per_bit > 1.0
        {
            return Err(Error::invalid(format!(
                "min_entropy_per_bit must be in (0, 1], got {min_entropy_per_bit}"
            )));
        }

        let cutoffs = HealthCutoffs::from_min_entropy(min_entropy_per_bit);
        let rct_ok = repetition_count_test(bits, cutoffs.rct_cutoff);
        let ap_ok = adaptive_proportion_test(bits, cutoffs.ap_window, cutoffs.ap_cutoff);

        let mut violations = Vec::new();
        if !rct_ok {
            violations.push(HealthViolation::RepetitionCount {
                cutoff: cutoffs.rct_cutoff,
            });
        }
        if !ap_ok {
            violations.push(HealthViolation::AdaptiveProportion {
                window: cutoffs.ap_window,
                cutoff: cutoffs.ap_cutoff,
            });
        }

        let ok = violations.is_empty();
        let reason = if ok {
            String::new()
        } else {
            format!(
                "RCT/AP violation (rct_cutoff={}, ap_cutoff={})",
                cutoffs.rct_cutoff, cutoffs.ap_cutoff
            )
        };

        self.evaluations += 1;
        if ok {
            if !self.state.ok {
                tracing::info!(bits = bits.len(), "Entropy source recovered");
            }
            tracing::trace!(
                bits = bits.len(),
                rct_cutoff = cutoffs.rct_cutoff,
                ap_cutoff = cutoffs.ap_cutoff,
                "Health check passed"
            );
        } else {
            self.failures += 1;
            if self.state.ok {
                tracing::warn!(
                    bits = bits.len(),
                    rct_ok,
                    ap_ok,
                    reason = %reason,
                    "Entropy source health alarm"
                );
            }
        }

        self.state = HealthState {
            ok,
            reason,
            cutoffs,
            violations,
        };
        Ok(self.state.clone())
    }

    /// Evaluates a bitstream and returns it as vetted only if it passed.
    pub fn admit<'a>(
        &mut self,
        bits: &'a BitString,
        min_entropy_per_bit: f64,
    ) -> Result<VettedBits<'a>> {
        let state = self.evaluate(bits, min_entropy_per_bit)?;
        if !state.ok {
            return Err(Error::HealthAlarm {
                reason: state.reason,
                cutoffs: state.cutoffs,
            });
        }
        Ok(VettedBits {
            bits,
            cutoffs: state.cutoffs,
        })
    }

    /// Returns the last health verdict.
    pub fn state(&self) -> &HealthState {
        &self.state
    }

    /// Total evaluations performed.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Total evaluations that failed.
    pub fn failures(&self) -> u64 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alternating(n: usize) -> BitString {
        BitString::from_bools((0..n).map(|i| i % 2 == 0))
    }

    #[test]
    fn test_initial_state_ok() {
        let gate = HealthGate::new();
        assert!(gate.state().ok);
        assert!(gate.state().reason.is_empty());
    }

    #[test]
    fn test_all_zeros_fails_ap() {
        let mut gate = HealthGate::new();
        let zeros = BitString::from_bools(vec![false; 2048]);
        let state = gate.evaluate(&zeros, 0.8).unwrap();

        assert!(!state.ok);
        assert!(state
            .violations
            .contains(&HealthViolation::AdaptiveProportion {
                window: 1024,
                cutoff: 614
            }));
        assert_eq!(state.reason, "RCT/AP violation (rct_cutoff=38, ap_cutoff=614)");
    }

    #[test]
    fn test_balanced_stream_passes() {
        let mut gate = HealthGate::new();
        let state = gate.evaluate(&alternating(4096), 0.8).unwrap();
        assert!(state.ok);
        assert!(state.reason.is_empty());
        assert_eq!(state.cutoffs.rct_cutoff, 38);
    }

    #[test]
    fn test_state_is_overwritten() {
        let mut gate = HealthGate::new();
        gate.evaluate(&BitString::new(), 0.8).unwrap();
        assert!(!gate.state().ok);

        gate.evaluate(&alternating(64), 0.8).unwrap();
        assert!(gate.state().ok);
        assert_eq!(gate.evaluations(), 2);
        assert_eq!(gate.failures(), 1);
    }

    #[test]
    fn test_admit_rejects_unhealthy_bits() {
        let mut gate = HealthGate::new();
        let stuck = BitString::from_bools(vec![true; 100]);
        let err = gate.admit(&stuck, 0.8).unwrap_err();
        assert!(err.is_health_alarm());
        assert!(!gate.state().ok);
    }

    #[test]
    fn test_admit_passes_healthy_bits() {
        let mut gate = HealthGate::new();
        let bits = alternating(256);
        let vetted = gate.admit(&bits, 0.8).unwrap();
        assert_eq!(vetted.bits().len(), 256);
        assert_eq!(vetted.cutoffs(), HealthCutoffs::from_min_entropy(0.8));
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let mut gate = HealthGate::new();
        let bits = alternating(16);
        for bad in [0.0, -0.5, 1.5, f64::NAN] {
            assert!(matches!(
                gate.evaluate(&bits, bad),
                Err(Error::InvalidInput(_))
            ));
        }
        assert_eq!(gate.evaluations(), 0);
    }
}
