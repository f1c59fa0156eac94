//! Online health tests for random bit sources.
//!
//! The repetition count and adaptive proportion tests follow the shape of
//! the SP 800-90B continuous health tests. They detect stuck or heavily
//! biased sources; passing them is necessary but not sufficient for good
//! entropy.

use crate::bits::{BitCounts, BitString};
use serde::{Deserialize, Serialize};

/// Reference symbol counted by the adaptive proportion test.
///
/// Fixed to `0`. A source biased toward `1` is not caught by this check
/// on its heavy side; that asymmetry is kept as-is.
pub const AP_REFERENCE_BIT: u8 = 0;

/// Repetition Count Test.
///
/// Returns `false` as soon as a run of identical consecutive bits reaches
/// `cutoff`. An empty bitstring also returns `false`: no data is treated
/// as a failure, not a pass.
pub fn repetition_count_test(bits: &BitString, cutoff: usize) -> bool {
    let data = bits.as_slice();
    if data.is_empty() {
        return false;
    }

    let mut run = 0usize;
    let mut prev = None;
    for &bit in data {
        run = if prev == Some(bit) { run + 1 } else { 1 };
        if run >= cutoff {
            return false;
        }
        prev = Some(bit);
    }
    true
}

/// Adaptive Proportion Test.
///
/// Scans disjoint windows of `window` bits and fails if any window holds
/// `cutoff` or more occurrences of [`AP_REFERENCE_BIT`]. A trailing partial
/// window is not tested, and input shorter than one window passes.
pub fn adaptive_proportion_test(bits: &BitString, window: usize, cutoff: usize) -> bool {
    if window == 0 || bits.len() < window {
        return true;
    }

    bits.as_slice()
        .chunks_exact(window)
        .all(|block| block.iter().filter(|&&b| b == AP_REFERENCE_BIT).count() < cutoff)
}

/// Binary Shannon entropy of measurement counts, in bits per symbol.
///
/// Returns `0.0` when there are no outcomes.
pub fn shannon_entropy(counts: &BitCounts) -> f64 {
    let total = counts.total();
    if total == 0 {
        return 0.0;
    }

    let p0 = counts.zeros as f64 / total as f64;
    let p1 = 1.0 - p0;
    let h = |p: f64| if p <= 0.0 { 0.0 } else { -p * p.log2() };
    h(p0) + h(p1)
}

/// Coarse randomness summary reported alongside sampled bits.
///
/// Informational only; gating decisions come from the health tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomnessSummary {
    /// `1 - |zeros - ones| / n`; 1.0 is perfectly balanced.
    pub frequency_balance: f64,
    /// Longest run of identical bits.
    pub max_run_length: usize,
    /// Balance above 0.8 and no run of `max(8, n / 6)` or longer.
    pub defense_grade: bool,
}

impl RandomnessSummary {
    /// Summarizes a bitstring.
    pub fn analyze(bits: &BitString) -> Self {
        let n = bits.len();
        let zeros = bits.count_zeros();
        let ones = n - zeros;
        let frequency_balance = 1.0 - zeros.abs_diff(ones) as f64 / n.max(1) as f64;
        let max_run_length = bits.longest_run();
        let defense_grade = frequency_balance > 0.8 && max_run_length < (n / 6).max(8);

        Self {
            frequency_balance,
            max_run_length,
            defense_grade,
        }
    }
}
