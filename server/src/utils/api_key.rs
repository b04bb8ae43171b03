//! API key generation and hashing
//!
//! Keys are opaque: `mo11y_` followed by 32 lowercase hex characters.
//! Only `SHA-256(key || pepper)` is ever persisted; the pepper is a
//! process-wide secret so a leaked key table alone is useless.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::core::constants::{API_KEY_PREFIX, API_KEY_PREFIX_DISPLAY_LEN, API_KEY_RANDOM_BYTES};
use crate::utils::crypto::sha256_hex;

/// Generate a new API key: `mo11y_` + 32 random hex chars (CSPRNG)
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_RANDOM_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("{}{}", API_KEY_PREFIX, hex::encode(bytes))
}

/// Hash a key with the server pepper: hex of SHA-256(key || pepper)
pub fn hash_api_key(key: &str, pepper: &str) -> String {
    sha256_hex(&format!("{}{}", key, pepper))
}

/// Display prefix stored alongside the hash (e.g. `mo11y_a1b2c3`)
pub fn key_prefix(key: &str) -> String {
    key.chars().take(API_KEY_PREFIX_DISPLAY_LEN).collect()
}
