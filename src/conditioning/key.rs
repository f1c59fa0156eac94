//! Derived key material.

use super::hkdf::{hkdf_extract_expand, KdfError};
use crate::analysis::VettedBits;
use rand_core::{CryptoRng, RngCore};

/// Fixed-length key produced by the KDF from vetted bits.
///
/// The bytes are never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedKey {
    bytes: Vec<u8>,
    info: Vec<u8>,
}

impl DerivedKey {
    /// Returns the key bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the key length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the key is empty (never the case for derived keys).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Context tag the key was derived under.
    pub fn info(&self) -> &[u8] {
        &self.info
    }

    /// Wraps raw bytes as a key, bypassing the health gate.
    ///
    /// Test fixtures only.
    #[cfg(test)]
    pub(crate) fn new_for_testing(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            info: b"TEST".to_vec(),
        }
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("len", &self.bytes.len())
            .field("info", &String::from_utf8_lossy(&self.info))
            .finish_non_exhaustive()
    }
}

/// Derives a key from bits that passed the health gate.
pub fn derive_key<R>(
    vetted: VettedBits<'_>,
    out_len: usize,
    salt: Option<&[u8]>,
    info: &[u8],
    rng: &mut R,
) -> Result<DerivedKey, KdfError>
where
    R: RngCore + CryptoRng,
{
    let cutoffs = vetted.cutoffs();
    tracing::debug!(
        bits = vetted.bits().len(),
        out_len,
        rct_cutoff = cutoffs.rct_cutoff,
        ap_cutoff = cutoffs.ap_cutoff,
        "Deriving key from vetted bits"
    );
    let bytes = hkdf_extract_expand(vetted.bits(), out_len, salt, info, rng)?;
    Ok(DerivedKey {
        bytes,
        info: info.to_vec(),
    })
}
