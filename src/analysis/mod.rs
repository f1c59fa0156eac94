//! Entropy health testing and gating.
//!
//! This module provides the online health tests and the gate that
//! decides whether a bitstream may be used as key material. The tests
//! are sanity checks for stuck or biased sources, not proofs of entropy.

mod health;
mod statistics;
mod threshold;

pub use health::{HealthGate, HealthState, VettedBits};
pub use statistics::{
    adaptive_proportion_test, repetition_count_test, shannon_entropy, RandomnessSummary,
    AP_REFERENCE_BIT,
};
pub use threshold::{HealthCutoffs, HealthViolation, AP_WINDOW, MIN_ENTROPY_FLOOR};
