//! HKDF-SHA256 extract-and-expand (RFC 5869) over bitstring input.

use crate::bits::BitString;
use hmac::{Hmac, Mac};
use rand_core::{CryptoRng, RngCore};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Output size of the underlying MAC in bytes.
pub const HASH_LEN: usize = 32;

/// Largest output the single-byte block counter allows.
pub const MAX_OUTPUT_LEN: usize = 255 * HASH_LEN;

/// Length of the salt generated when none is supplied.
pub const DEFAULT_SALT_LEN: usize = 16;

/// Default context tag.
pub const INFO_DEFAULT: &[u8] = b"QRNG-KEY";

/// Context tag for session encryption keys.
pub const INFO_SESSION_KEY: &[u8] = b"QRNG-SESSION-KEY";

/// Context tag for raw random-byte output.
pub const INFO_RNG_BYTES: &[u8] = b"QRNG-RNG-BYTES";

/// Errors from key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KdfError {
    /// Output length outside `1..=8160`.
    #[error("invalid output length {requested} (must be 1..=8160)")]
    InvalidLength {
        /// Requested output length in bytes.
        requested: usize,
    },

    /// No input bits.
    #[error("input keying material is empty")]
    EmptyInput,

    /// HMAC refused the key (never happens for HMAC-SHA256).
    #[error("MAC rejected a {0}-byte key")]
    MacKey(usize),
}

/// HKDF-Extract: `PRK = HMAC(salt, IKM)`.
pub fn extract(salt: &[u8], ikm: &[u8]) -> Result<[u8; HASH_LEN], KdfError> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(salt).map_err(|_| KdfError::MacKey(salt.len()))?;
    mac.update(ikm);
    let mut prk = [0u8; HASH_LEN];
    prk.copy_from_slice(&mac.finalize().into_bytes());
    Ok(prk)
}

/// HKDF-Expand: `T(i) = HMAC(PRK, T(i-1) || info || i)`, truncated to `out_len`.
pub fn expand(prk: &[u8], info: &[u8], out_len: usize) -> Result<Vec<u8>, KdfError> {
    if out_len == 0 || out_len > MAX_OUTPUT_LEN {
        return Err(KdfError::InvalidLength { requested: out_len });
    }

    let mut okm = Vec::with_capacity(out_len + HASH_LEN);
    let mut block: Vec<u8> = Vec::new();
    let mut counter: u8 = 1;

    while okm.len() < out_len {
        let mut mac =
            <HmacSha256 as Mac>::new_from_slice(prk).map_err(|_| KdfError::MacKey(prk.len()))?;
        mac.update(&block);
        mac.update(info);
        mac.update(&[counter]);
        block = mac.finalize().into_bytes().to_vec();
        okm.extend_from_slice(&block);
        counter = counter.wrapping_add(1);
    }

    okm.truncate(out_len);
    Ok(okm)
}

/// Derives `out_len` bytes from a bitstring.
///
/// The bits are packed big-endian after right zero-padding to a byte
/// boundary. When `salt` is `None` a fresh 16-byte salt is drawn from
/// `rng`, so the output is only reproducible with an explicit salt.
///
/// This does not judge entropy quality. Callers must gate `ikm_bits`
/// through the health tests first.
pub fn hkdf_extract_expand<R>(
    ikm_bits: &BitString,
    out_len: usize,
    salt: Option<&[u8]>,
    info: &[u8],
    rng: &mut R,
) -> Result<Vec<u8>, KdfError>
where
    R: RngCore + CryptoRng,
{
    if out_len == 0 || out_len > MAX_OUTPUT_LEN {
        return Err(KdfError::InvalidLength { requested: out_len });
    }
    if ikm_bits.is_empty() {
        return Err(KdfError::EmptyInput);
    }

    let generated;
    let salt = match salt {
        Some(s) => s,
        None => {
            let mut fresh = [0u8; DEFAULT_SALT_LEN];
            rng.fill_bytes(&mut fresh);
            generated = fresh;
            &generated[..]
        }
    };

    let ikm = ikm_bits.to_packed_bytes();
    let prk = extract(salt, &ikm)?;
    let okm = expand(&prk, info, out_len)?;

    tracing::debug!(
        ikm_bits = ikm_bits.len(),
        out_len,
        salted = salt.len(),
        info = %String::from_utf8_lossy(info),
        "Derived key material"
    );

    Ok(okm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(7)
    }

    #[test]
    fn test_rfc5869_case_1() {
        let ikm = BitString::from_packed_bytes(&[0x0b; 22], 22 * 8);
        let salt: Vec<u8> = (0x00..=0x0c).collect();
        let info: Vec<u8> = (0xf0..=0xf9).collect();

        let prk = extract(&salt, &ikm.to_packed_bytes()).unwrap();
        assert_eq!(
            hex::encode(prk),
            "077709362c2e32df0ddc3f0dc47bba6390b6c73bb50f9c3122ec844ad7c2b3e5"
        );

        let okm = hkdf_extract_expand(&ikm, 42, Some(&salt[..]), &info, &mut rng()).unwrap();
        assert_eq!(
            hex::encode(&okm),
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865"
        );
    }

    #[test]
    fn test_explicit_salt_is_deterministic() {
        let bits: BitString = "1011001110001111".parse().unwrap();
        let salt = [0x5a; 16];
        let a = hkdf_extract_expand(&bits, 32, Some(&salt[..]), INFO_SESSION_KEY, &mut rng()).unwrap();
        let b = hkdf_extract_expand(&bits, 32, Some(&salt[..]), INFO_SESSION_KEY, &mut rng()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_info_separates_outputs() {
        let bits: BitString = "1011001110001111".parse().unwrap();
        let salt = [0x5a; 16];
        let a = hkdf_extract_expand(&bits, 32, Some(&salt[..]), INFO_SESSION_KEY, &mut rng()).unwrap();
        let b = hkdf_extract_expand(&bits, 32, Some(&salt[..]), INFO_RNG_BYTES, &mut rng()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_missing_salt_draws_from_rng() {
        let bits: BitString = "1011001110001111".parse().unwrap();
        let mut shared = rng();
        let first = hkdf_extract_expand(&bits, 32, None, INFO_DEFAULT, &mut shared).unwrap();
        let second = hkdf_extract_expand(&bits, 32, None, INFO_DEFAULT, &mut shared).unwrap();
        assert_ne!(first, second);

        // Same seed, same generated salt.
        let replay = hkdf_extract_expand(&bits, 32, None, INFO_DEFAULT, &mut rng()).unwrap();
        assert_eq!(first, replay);
    }

    #[test]
    fn test_output_length_exact() {
        let bits: BitString = "110".parse().unwrap();
        for n in [1, 16, 31, 32, 33, 64, 100, MAX_OUTPUT_LEN] {
            let okm = hkdf_extract_expand(&bits, n, Some(&b"salt"[..]), INFO_DEFAULT, &mut rng()).unwrap();
            assert_eq!(okm.len(), n);
        }
    }

    #[test]
    fn test_invalid_lengths_rejected() {
        let bits: BitString = "110".parse().unwrap();
        assert_eq!(
            hkdf_extract_expand(&bits, 0, None, INFO_DEFAULT, &mut rng()),
            Err(KdfError::InvalidLength { requested: 0 })
        );
        assert!(hkdf_extract_expand(&bits, MAX_OUTPUT_LEN + 1, None, INFO_DEFAULT, &mut rng())
            .is_err());
    }

    #[test]
    fn test_empty_ikm_rejected() {
        assert_eq!(
            hkdf_extract_expand(&BitString::new(), 32, None, INFO_DEFAULT, &mut rng()),
            Err(KdfError::EmptyInput)
        );
    }

    #[test]
    fn test_degenerate_ikm_still_derives() {
        let zeros = BitString::from_bools(vec![false; 256]);
        let okm = hkdf_extract_expand(&zeros, 32, Some(&[1u8; 16][..]), INFO_DEFAULT, &mut rng()).unwrap();
        assert_eq!(okm.len(), 32);
    }
}
