//! QRNG Gate Library
//!
//! Health-gating and key derivation for quantum (or untrusted physical)
//! random bit sources, with QKD session assessment and anomaly monitoring.
//!
//! # Architecture
//!
//! ```text
//! capture → analysis (RCT/AP gate) → conditioning (HKDF) → cipher
//!                ↓                                      ↑
//!             monitor ← qkd (QBER / CHSH verdicts)   session key
//! ```
//!
//! # Design Principles
//!
//! - **Fail-closed**: No key material is derived from bits that failed the
//!   repetition count or adaptive proportion test
//! - **Explicit state**: The health verdict lives in a [`HealthGate`] owned by
//!   the caller, never in a global
//! - **Injected randomness**: Salts, nonces and noise draw from a caller-supplied
//!   generator so runs can be replayed
//! - **No cryptographic claims**: Health tests are sanity checks, and the QKD
//!   simulators are placeholders
//!
//! # Example
//!
//! ```no_run
//! use qrng_gate::{FileConfig, QrngService};
//!
//! let mut service = QrngService::from_config(&FileConfig::default()).unwrap();
//!
//! match service.random_bytes(32) {
//!     Ok(bytes) => println!("{} bytes", bytes.len()),
//!     Err(e) if e.is_health_alarm() => eprintln!("source unhealthy: {}", e),
//!     Err(e) => eprintln!("error: {}", e),
//! }
//!
//! service.generate_session_key().unwrap();
//! let sealed = service.encrypt(b"hello").unwrap();
//! assert_eq!(service.decrypt(&sealed).unwrap(), b"hello");
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod analysis;
pub mod bits;
pub mod capture;
pub mod cipher;
pub mod conditioning;
pub mod config;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod qkd;
pub mod service;
pub mod wire;

// Re-export commonly used types at crate root
pub use analysis::{HealthCutoffs, HealthGate, HealthState, VettedBits};
pub use bits::{BitCounts, BitString};
pub use capture::{BitSample, BitSource, DatasetKind};
pub use conditioning::{derive_key, hkdf_extract_expand, DerivedKey};
pub use config::FileConfig;
pub use error::{Error, Result};
pub use monitor::{AnomalyDetector, AnomalyReport, RollingHistory};
pub use qkd::{SecurityAssessor, QBER_THRESHOLD};
pub use service::{QrngService, SharedService};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
