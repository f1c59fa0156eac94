//! Crate-level error taxonomy.
//!
//! Module errors convert into [`Error`] so callers see four outcomes:
//! bad input, a health-gate rejection, an authentication failure, or an
//! unavailable collaborator. None of them is fatal to the host process.

use crate::analysis::HealthCutoffs;
use crate::bits::BitParseError;
use crate::capture::{DatasetError, SourceError};
use crate::cipher::CipherError;
use crate::conditioning::KdfError;
use crate::config::ConfigError;
use crate::qkd::QkdError;
use thiserror::Error;

/// Result alias for pipeline operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the gating and key-derivation pipeline.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Empty or malformed input where data is required.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The bitstream failed RCT or AP; key derivation is blocked.
    #[error("entropy source health alarm: {reason}")]
    HealthAlarm {
        /// Why the gate failed.
        reason: String,
        /// Cutoffs in force at the failure.
        cutoffs: HealthCutoffs,
    },

    /// Authenticated decryption rejected the ciphertext.
    #[error("decryption failed: authentication tag mismatch")]
    DecryptionFailed,

    /// The bit source or another collaborator did not respond.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl Error {
    /// Returns true for health-gate rejections.
    pub fn is_health_alarm(&self) -> bool {
        matches!(self, Error::HealthAlarm { .. })
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}

impl From<KdfError> for Error {
    fn from(e: KdfError) -> Self {
        Error::InvalidInput(e.to_string())
    }
}

impl From<BitParseError> for Error {
    fn from(e: BitParseError) -> Self {
        Error::InvalidInput(e.to_string())
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::InvalidInput(e.to_string())
    }
}

impl From<QkdError> for Error {
    fn from(e: QkdError) -> Self {
        Error::InvalidInput(e.to_string())
    }
}

impl From<CipherError> for Error {
    fn from(e: CipherError) -> Self {
        match e {
            CipherError::DecryptionFailed => Error::DecryptionFailed,
            other => Error::InvalidInput(other.to_string()),
        }
    }
}

impl From<SourceError> for Error {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::InvalidRequest(msg) => Error::InvalidInput(msg),
            other => Error::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl From<DatasetError> for Error {
    fn from(e: DatasetError) -> Self {
        match e {
            DatasetError::Source(inner) => inner.into(),
            DatasetError::Io(msg) => Error::UpstreamUnavailable(msg),
            other => Error::InvalidInput(other.to_string()),
        }
    }
}
