//! Health-test cutoffs derived from the min-entropy policy.
//!
//! The mapping from `min_entropy_per_bit` to cutoffs is an illustrative
//! engineering heuristic, not a statistically derived bound. Deployments
//! should retune it from an entropy estimate measured on the real source.

use serde::{Deserialize, Serialize};

/// Lower clamp on the min-entropy value used for the RCT cutoff.
pub const MIN_ENTROPY_FLOOR: f64 = 0.05;

/// Window size for the adaptive proportion test.
pub const AP_WINDOW: usize = 1024;

/// Smallest RCT cutoff ever produced.
pub const RCT_CUTOFF_MIN: usize = 6;

/// Smallest AP cutoff ever produced.
pub const AP_CUTOFF_MIN: usize = 40;

/// Numeric cutoffs for the online health tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCutoffs {
    /// Run length at which the repetition count test fails.
    pub rct_cutoff: usize,
    /// Adaptive proportion window size in bits.
    pub ap_window: usize,
    /// Reference-symbol count at which a window fails.
    pub ap_cutoff: usize,
}

impl HealthCutoffs {
    /// Derives cutoffs from the minimum entropy per bit.
    ///
    /// - `rct_cutoff = max(6, floor(1 + 30 / max(h, 0.05)))`
    /// - `ap_window = 1024`
    /// - `ap_cutoff = max(40, floor(1024 * (0.5 + (0.5 - h / 2))))`
    ///
    /// `h` is clamped to `[0, 1]` for the AP term so the cutoff stays
    /// within the window.
    pub fn from_min_entropy(min_entropy_per_bit: f64) -> Self {
        let rct_h = min_entropy_per_bit.max(MIN_ENTROPY_FLOOR);
        let rct_cutoff = ((1.0 + 30.0 / rct_h).floor() as usize).max(RCT_CUTOFF_MIN);

        let ap_h = min_entropy_per_bit.clamp(0.0, 1.0);
        let ap_fraction = 0.5 + (0.5 - ap_h / 2.0);
        let ap_cutoff = ((AP_WINDOW as f64 * ap_fraction).floor() as usize)
            .max(AP_CUTOFF_MIN)
            .min(AP_WINDOW);

        Self {
            rct_cutoff,
            ap_window: AP_WINDOW,
            ap_cutoff,
        }
    }

    /// Cutoffs reported before any bitstream has been evaluated.
    pub(crate) fn unset() -> Self {
        Self {
            rct_cutoff: 0,
            ap_window: AP_WINDOW,
            ap_cutoff: 0,
        }
    }
}

/// Which health test rejected a bitstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "test", rename_all = "snake_case")]
pub enum HealthViolation {
    /// A run of identical bits reached the RCT cutoff.
    #[error("run of identical bits reached rct_cutoff={cutoff}")]
    RepetitionCount {
        /// Cutoff the run reached.
        cutoff: usize,
    },

    /// Too many reference bits in one AP window.
    #[error("reference-bit count in a {window}-bit window reached ap_cutoff={cutoff}")]
    AdaptiveProportion {
        /// Window size in bits.
        window: usize,
        /// Cutoff the reference-bit count reached.
        cutoff: usize,
    },
}
