//! Basis sifting for entanglement-based key exchange.

use crate::bits::BitString;
use serde::{Deserialize, Serialize};

/// Measurement basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Basis {
    /// X basis.
    X,
    /// Y basis.
    Y,
    /// Z basis.
    Z,
}

impl Basis {
    /// Every basis.
    pub const ALL: [Basis; 3] = [Basis::X, Basis::Y, Basis::Z];
}

/// One party's outcome for a single round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    /// Basis the bit was measured in.
    pub basis: Basis,
    /// Measured bit.
    pub bit: bool,
}

/// Key material left after discarding mismatched-basis rounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiftedKey {
    /// Alice's bits from rounds where both bases matched.
    pub key: BitString,
    /// Fraction of kept rounds where Bob's bit disagreed.
    pub qber: f64,
    /// Rounds compared.
    pub total_rounds: usize,
}

impl SiftedKey {
    /// Kept rounds as a fraction of all rounds.
    pub fn efficiency(&self) -> f64 {
        self.key.len() as f64 / self.total_rounds.max(1) as f64
    }
}

/// Keeps rounds where the bases match and measures their error rate.
///
/// Rounds are paired positionally; extra rounds on the longer side are
/// ignored. QBER is `0.0` when no round survives.
pub fn sift(alice: &[Measurement], bob: &[Measurement]) -> SiftedKey {
    let mut kept = Vec::new();
    let mut errors = 0usize;

    for (a, b) in alice.iter().zip(bob) {
        if a.basis == b.basis {
            kept.push(a.bit);
            if a.bit != b.bit {
                errors += 1;
            }
        }
    }

    let qber = if kept.is_empty() {
        0.0
    } else {
        errors as f64 / kept.len() as f64
    };

    SiftedKey {
        key: BitString::from_bools(kept),
        qber,
        total_rounds: alice.len().min(bob.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(basis: Basis, bit: bool) -> Measurement {
        Measurement { basis, bit }
    }

    #[test]
    fn test_only_matching_bases_kept() {
        let alice = [m(Basis::X, true), m(Basis::Y, false), m(Basis::Z, true)];
        let bob = [m(Basis::X, true), m(Basis::Z, true), m(Basis::Z, true)];

        let sifted = sift(&alice, &bob);
        assert_eq!(sifted.key.to_string(), "11");
        assert_eq!(sifted.qber, 0.0);
        assert!((sifted.efficiency() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_qber_counts_disagreements() {
        let alice = [m(Basis::X, true), m(Basis::X, false), m(Basis::Y, true), m(Basis::Z, false)];
        let bob = [m(Basis::X, false), m(Basis::X, false), m(Basis::Y, true), m(Basis::Z, false)];

        let sifted = sift(&alice, &bob);
        assert_eq!(sifted.key.len(), 4);
        assert_eq!(sifted.qber, 0.25);
    }

    #[test]
    fn test_nothing_kept() {
        let sifted = sift(&[m(Basis::X, true)], &[m(Basis::Y, true)]);
        assert!(sifted.key.is_empty());
        assert_eq!(sifted.qber, 0.0);
    }
}
