//! Quantum key distribution security assessment.
//!
//! Classifies QKD rounds by QBER and Bell tests by their CHSH value,
//! and defines the interface of the (placeholder) protocol simulators.

mod assessor;
mod protocol;
mod sifting;

pub use assessor::{
    inject_noise, BellStatus, BellVerdict, KeyAssessment, QkdError, RoundVerdict,
    SecurityAssessor, SecurityLevel, BELL_ALARM_THRESHOLD, QBER_THRESHOLD,
};
pub use protocol::{
    Bb84Simulator, BellTestResult, Correlations, E91Simulator, ProtocolKind, QkdProtocol,
    QkdRoundResult, CLASSICAL_LIMIT, QUANTUM_LIMIT,
};
pub use sifting::{sift, Basis, Measurement, SiftedKey};
