//! JSON payloads for transport layers.
//!
//! Byte blobs travel as standard base64. Errors map to HTTP-style status
//! codes so a front end can relay them without inspecting the variant.

use crate::analysis::HealthState;
use crate::cipher::{SealedMessage, NONCE_LEN};
use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Error text carried by every health-alarm response.
pub const HEALTH_ALARM_ERROR: &str = "Entropy source health alarm";

/// Maps an error to its response status code.
pub fn status_code(err: &Error) -> u16 {
    match err {
        Error::InvalidInput(_) | Error::DecryptionFailed => 400,
        Error::HealthAlarm { .. } => 503,
        Error::UpstreamUnavailable(_) => 502,
    }
}

/// Body returned when the health gate refuses a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAlarmPayload {
    /// Always [`HEALTH_ALARM_ERROR`].
    pub error: String,
    /// Gate failure reason.
    pub reason: String,
    /// RCT cutoff in force.
    pub rct_cutoff: usize,
    /// AP window in force.
    pub ap_window: usize,
    /// AP cutoff in force.
    pub ap_cutoff: usize,
}

/// Body for every other error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error text.
    pub error: String,
}

/// Error body, shaped by variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ErrorBody {
    /// Health-gate rejection.
    HealthAlarm(HealthAlarmPayload),
    /// Any other error.
    Error(ErrorPayload),
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        match err {
            Error::HealthAlarm { reason, cutoffs } => ErrorBody::HealthAlarm(HealthAlarmPayload {
                error: HEALTH_ALARM_ERROR.to_string(),
                reason: reason.clone(),
                rct_cutoff: cutoffs.rct_cutoff,
                ap_window: cutoffs.ap_window,
                ap_cutoff: cutoffs.ap_cutoff,
            }),
            other => ErrorBody::Error(ErrorPayload {
                error: other.to_string(),
            }),
        }
    }
}

/// Status code and body for an error.
pub fn error_response(err: &Error) -> (u16, ErrorBody) {
    (status_code(err), ErrorBody::from(err))
}

/// Random bytes response.
#[derive(Debug, Clone, Serialize)]
pub struct BytesPayload {
    /// Always `"SUCCESS"`.
    pub status: &'static str,
    /// Number of bytes produced.
    pub nbytes: usize,
    /// The bytes, base64-encoded.
    pub bytes_b64: String,
    /// Health verdict for the bits behind the bytes.
    pub online_health: HealthState,
}

impl BytesPayload {
    /// Wraps `bytes` with the health record.
    pub fn new(bytes: &[u8], online_health: HealthState) -> Self {
        Self {
            status: "SUCCESS",
            nbytes: bytes.len(),
            bytes_b64: STANDARD.encode(bytes),
            online_health,
        }
    }
}

/// Encrypted message with base64 fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedPayload {
    /// Base64 nonce.
    pub nonce: String,
    /// Base64 ciphertext with tag.
    pub ciphertext: String,
}

impl From<&SealedMessage> for SealedPayload {
    fn from(sealed: &SealedMessage) -> Self {
        Self {
            nonce: STANDARD.encode(sealed.nonce),
            ciphertext: STANDARD.encode(&sealed.ciphertext),
        }
    }
}

impl SealedPayload {
    /// Decodes the base64 fields back into a sealed message.
    pub fn to_sealed(&self) -> Result<SealedMessage> {
        let nonce_bytes = decode_b64("nonce", &self.nonce)?;
        let nonce: [u8; NONCE_LEN] = nonce_bytes.as_slice().try_into().map_err(|_| {
            Error::invalid(format!(
                "nonce must be {} bytes, got {}",
                NONCE_LEN,
                nonce_bytes.len()
            ))
        })?;
        let ciphertext = decode_b64("ciphertext", &self.ciphertext)?;
        Ok(SealedMessage { nonce, ciphertext })
    }
}

/// Decodes a base64 field, naming it in the error.
pub fn decode_b64(field: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| Error::invalid(format!("{} is not valid base64: {}", field, e)))
}
