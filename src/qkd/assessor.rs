//! Security verdicts for QKD rounds and Bell tests.

use super::protocol::{BellTestResult, QkdRoundResult, CLASSICAL_LIMIT};
use rand::Rng;
use serde::Serialize;
use thiserror::Error;

/// Default QBER abort threshold, typical for BB84-class analyses.
pub const QBER_THRESHOLD: f64 = 0.11;

/// Operational CHSH alarm threshold.
///
/// Stricter than [`CLASSICAL_LIMIT`]: an S between 2.0 and 2.1 still
/// violates the inequality but raises the alarm.
pub const BELL_ALARM_THRESHOLD: f64 = 2.1;

/// Half-width of the placeholder S confidence interval.
pub const S_CI_HALF_WIDTH: f64 = 0.05;

/// Errors from QKD assessment utilities.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QkdError {
    /// Noise probability outside `[0, 1]`.
    #[error("noise must be in [0, 1], got {0}")]
    InvalidNoise(f64),
}

/// Usability of a sifted key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyAssessment {
    /// QBER below the threshold.
    MilitaryGrade,
    /// QBER at or above the threshold.
    Compromised,
}

/// Verdict for one QKD round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundVerdict {
    /// `qber < qber_threshold`.
    pub secure: bool,
    /// QBER of the round.
    pub qber: f64,
    /// Threshold applied.
    pub qber_threshold: f64,
    /// Usability of the sifted key.
    pub assessment: KeyAssessment,
    /// Suggested use for the key.
    pub recommended_use: &'static str,
}

/// Coarse Bell-test security level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecurityLevel {
    /// Bell inequality violated.
    High,
    /// No violation.
    Low,
}

/// Whether entanglement was demonstrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BellStatus {
    /// S exceeds the classical limit.
    QuantumSecurityValidated,
    /// S within the classical limit.
    ClassicalOnly,
}

/// Verdict for a CHSH Bell test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BellVerdict {
    /// CHSH S value.
    #[serde(rename = "S")]
    pub s: f64,
    /// `[S - 0.05, S + 0.05]`; a placeholder, not a propagated interval.
    pub s_ci95: [f64; 2],
    /// `S > 2.0`.
    pub bell_violation: bool,
    /// High when the inequality is violated.
    pub security_level: SecurityLevel,
    /// `max(0, S - 2.0)`.
    pub security_margin: f64,
    /// `S < 2.1`.
    pub alarm: bool,
    /// Whether entanglement was demonstrated.
    pub status: BellStatus,
}

/// Classifies QKD sessions against fixed thresholds.
#[derive(Debug, Clone)]
pub struct SecurityAssessor {
    qber_threshold: f64,
}

impl Default for SecurityAssessor {
    fn default() -> Self {
        Self::new(QBER_THRESHOLD)
    }
}

impl SecurityAssessor {
    /// Creates an assessor with the given QBER threshold.
    pub fn new(qber_threshold: f64) -> Self {
        Self { qber_threshold }
    }

    /// QBER threshold in force.
    pub fn qber_threshold(&self) -> f64 {
        self.qber_threshold
    }

    /// `qber < threshold`, strictly.
    pub fn is_secure(&self, qber: f64) -> bool {
        qber < self.qber_threshold
    }

    /// Classifies a round by its QBER.
    pub fn assess_round(&self, round: &QkdRoundResult) -> RoundVerdict {
        let secure = self.is_secure(round.qber);
        if !secure {
            tracing::warn!(
                protocol = ?round.protocol,
                qber = round.qber,
                threshold = self.qber_threshold,
                "QKD round above QBER threshold"
            );
        }

        RoundVerdict {
            secure,
            qber: round.qber,
            qber_threshold: self.qber_threshold,
            assessment: if secure {
                KeyAssessment::MilitaryGrade
            } else {
                KeyAssessment::Compromised
            },
            recommended_use: if secure {
                "Classified Communications"
            } else {
                "Training Only"
            },
        }
    }

    /// Classifies a CHSH Bell test.
    pub fn assess_bell(&self, result: &BellTestResult) -> BellVerdict {
        let s = result.s;
        let bell_violation = s > CLASSICAL_LIMIT;
        let alarm = s < BELL_ALARM_THRESHOLD;
        if alarm {
            tracing::warn!(s, "CHSH value below operational threshold");
        }

        BellVerdict {
            s,
            s_ci95: [s - S_CI_HALF_WIDTH, s + S_CI_HALF_WIDTH],
            bell_violation,
            security_level: if bell_violation {
                SecurityLevel::High
            } else {
                SecurityLevel::Low
            },
            security_margin: (s - CLASSICAL_LIMIT).max(0.0),
            alarm,
            status: if bell_violation {
                BellStatus::QuantumSecurityValidated
            } else {
                BellStatus::ClassicalOnly
            },
        }
    }
}

/// Simulates channel noise on a round's sifted key.
///
/// Each bit flips independently with probability `noise`, and the QBER
/// becomes `min(qber + noise, 1)`. Returns the number of flipped bits.
pub fn inject_noise<R>(round: &mut QkdRoundResult, noise: f64, rng: &mut R) -> Result<usize, QkdError>
where
    R: Rng,
{
    if !(0.0..=1.0).contains(&noise) {
        return Err(QkdError::InvalidNoise(noise));
    }
    if noise == 0.0 {
        return Ok(0);
    }

    let mut flipped = 0;
    for i in 0..round.sifted_key.len() {
        if rng.gen_bool(noise) {
            round.sifted_key.flip(i);
            flipped += 1;
        }
    }
    round.qber = (round.qber + noise).min(1.0);

    tracing::debug!(noise, flipped, qber = round.qber, "Injected channel noise");
    Ok(flipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitString;
    use crate::qkd::protocol::{Correlations, ProtocolKind};
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;
    use std::time::Duration;

    fn round(qber: f64) -> QkdRoundResult {
        QkdRoundResult {
            protocol: ProtocolKind::E91,
            sifted_key: "1010110010".parse().unwrap(),
            sifted_key_length: 10,
            qber,
            efficiency: 0.6,
            elapsed: Duration::from_millis(1),
            total_rounds: 17,
        }
    }

    fn bell(s: f64) -> BellTestResult {
        let e = s / 4.0;
        BellTestResult::from_correlations(
            Correlations {
                ab: e,
                ab_prime: -e,
                a_prime_b: e,
                a_prime_b_prime: e,
            },
            4096,
        )
    }

    #[test]
    fn test_qber_gate() {
        let assessor = SecurityAssessor::default();
        assert!(assessor.assess_round(&round(0.05)).secure);
        assert!(!assessor.assess_round(&round(0.15)).secure);
        // Strict comparison at the boundary.
        let boundary = assessor.assess_round(&round(0.11));
        assert!(!boundary.secure);
        assert_eq!(boundary.assessment, KeyAssessment::Compromised);
    }

    #[test]
    fn test_bell_violation() {
        let verdict = SecurityAssessor::default().assess_bell(&bell(2.5));
        assert!(verdict.bell_violation);
        assert_eq!(verdict.security_level, SecurityLevel::High);
        assert!((verdict.security_margin - 0.5).abs() < 1e-12);
        assert!(!verdict.alarm);
        assert_eq!(verdict.status, BellStatus::QuantumSecurityValidated);
    }

    #[test]
    fn test_classical_bell_result() {
        let verdict = SecurityAssessor::default().assess_bell(&bell(1.9));
        assert!(!verdict.bell_violation);
        assert_eq!(verdict.security_level, SecurityLevel::Low);
        assert_eq!(verdict.security_margin, 0.0);
        assert!(verdict.alarm);
    }

    #[test]
    fn test_alarm_distinct_from_violation() {
        let verdict = SecurityAssessor::default().assess_bell(&bell(2.05));
        assert!(verdict.bell_violation);
        assert!(verdict.alarm);
    }

    #[test]
    fn test_full_noise_flips_every_bit() {
        let mut r = round(0.03);
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let flipped = inject_noise(&mut r, 1.0, &mut rng).unwrap();
        assert_eq!(flipped, 10);
        assert_eq!(r.sifted_key.to_string(), "0101001101");
        assert_eq!(r.qber, 1.0);
    }

    #[test]
    fn test_zero_noise_is_identity() {
        let mut r = round(0.03);
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        assert_eq!(inject_noise(&mut r, 0.0, &mut rng).unwrap(), 0);
        assert_eq!(r.sifted_key.to_string(), "1010110010");
        assert_eq!(r.qber, 0.03);
    }

    #[test]
    fn test_noise_is_reproducible_with_seed() {
        let mut a = round(0.03);
        let mut b = round(0.03);
        inject_noise(&mut a, 0.3, &mut ChaCha20Rng::seed_from_u64(9)).unwrap();
        inject_noise(&mut b, 0.3, &mut ChaCha20Rng::seed_from_u64(9)).unwrap();
        assert_eq!(a.sifted_key, b.sifted_key);
        assert!((a.qber - 0.33).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_range_noise_rejected() {
        let mut r = round(0.03);
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        assert_eq!(
            inject_noise(&mut r, 1.5, &mut rng),
            Err(QkdError::InvalidNoise(1.5))
        );
        assert_eq!(r.sifted_key, "1010110010".parse::<BitString>().unwrap());
    }
}
