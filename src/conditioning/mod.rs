//! Key derivation from vetted entropy.
//!
//! This module turns gated bitstrings into uniformly distributed key
//! material with an HMAC-SHA256 extract-and-expand construction
//! (RFC 5869). It does not judge entropy quality; that is the health
//! gate's job and must happen first.

mod hkdf;
mod key;

pub use hkdf::{
    expand, extract, hkdf_extract_expand, KdfError, DEFAULT_SALT_LEN, HASH_LEN, INFO_DEFAULT,
    INFO_RNG_BYTES, INFO_SESSION_KEY, MAX_OUTPUT_LEN,
};
pub use key::{derive_key, DerivedKey};
