//! AES-256-GCM encryption with derived session keys.
//!
//! A thin adapter over the `aes-gcm` primitive. Authentication failures
//! are reported as [`CipherError::DecryptionFailed`], never as garbage
//! plaintext.

use crate::conditioning::DerivedKey;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand_core::{CryptoRng, RngCore};
use thiserror::Error;

/// Nonce length for AES-GCM.
pub const NONCE_LEN: usize = 12;

/// Key length for AES-256.
pub const KEY_LEN: usize = 32;

/// Errors from the cipher adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// Key is not 32 bytes.
    #[error("key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    /// Nonce is not 12 bytes.
    #[error("nonce must be 12 bytes, got {0}")]
    InvalidNonceLength(usize),
    /// The AEAD refused to encrypt.
    #[error("encryption failed")]
    EncryptionFailed,
    /// Authentication tag did not verify.
    #[error("decryption failed: authentication tag mismatch")]
    DecryptionFailed,
}

/// Nonce and ciphertext (with appended tag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedMessage {
    /// Random 96-bit nonce.
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext followed by the 16-byte tag.
    pub ciphertext: Vec<u8>,
}

fn cipher_for(key: &DerivedKey) -> Result<Aes256Gcm, CipherError> {
    Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CipherError::InvalidKeyLength(key.len()))
}

/// Encrypts `plaintext` under `key` with a fresh random nonce.
pub fn seal<R>(key: &DerivedKey, plaintext: &[u8], rng: &mut R) -> Result<SealedMessage, CipherError>
where
    R: RngCore + CryptoRng,
{
    let cipher = cipher_for(key)?;
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CipherError::EncryptionFailed)?;

    Ok(SealedMessage { nonce, ciphertext })
}

/// Decrypts and authenticates a sealed message.
pub fn open(key: &DerivedKey, sealed: &SealedMessage) -> Result<Vec<u8>, CipherError> {
    open_parts(key, &sealed.nonce, &sealed.ciphertext)
}

/// Decrypts from a raw nonce and ciphertext, checking the nonce length.
pub fn open_parts(key: &DerivedKey, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
    if nonce.len() != NONCE_LEN {
        return Err(CipherError::InvalidNonceLength(nonce.len()));
    }
    let cipher = cipher_for(key)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CipherError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    fn key() -> DerivedKey {
        DerivedKey::new_for_testing(vec![0x11; KEY_LEN])
    }

    #[test]
    fn test_seal_then_open() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let sealed = seal(&key(), b"launch window 0400", &mut rng).unwrap();
        assert_eq!(open(&key(), &sealed).unwrap(), b"launch window 0400");
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let mut sealed = seal(&key(), b"hello", &mut rng).unwrap();
        sealed.ciphertext[0] ^= 0x01;
        assert_eq!(open(&key(), &sealed), Err(CipherError::DecryptionFailed));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let sealed = seal(&key(), b"hello", &mut rng).unwrap();
        let other = DerivedKey::new_for_testing(vec![0x22; KEY_LEN]);
        assert_eq!(open(&other, &sealed), Err(CipherError::DecryptionFailed));
    }

    #[test]
    fn test_short_key_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let short = DerivedKey::new_for_testing(vec![0x11; 16]);
        assert_eq!(
            seal(&short, b"hello", &mut rng),
            Err(CipherError::InvalidKeyLength(16))
        );
    }

    #[test]
    fn test_bad_nonce_length_rejected() {
        assert_eq!(
            open_parts(&key(), &[0u8; 8], b"whatever"),
            Err(CipherError::InvalidNonceLength(8))
        );
    }
}
