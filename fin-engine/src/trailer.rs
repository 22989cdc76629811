//! Block-5 trailer codec: checksum and MAC computation/validation.
//!
//! `SHA256(m || key)` truncated to 16 hex chars is a deliberate mock of
//! SWIFT's LAU authentication — it is not a secure HMAC and must never be
//! mistaken for one. It is reproduced bit-exact here so that clients built
//! against the reference Python implementation keep validating against this
//! server.

use crate::error::TrailerError;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Default MAC key, matching every variant of the reference implementation.
pub const DEFAULT_MAC_KEY: &str = "MOCK_SECRET_KEY";

static TRAILING_BLOCK5: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{5:.*?\}\}$").expect("valid regex"));

static BLOCK5_TRAILER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{5:\{MAC:([A-F0-9]+)\}\{CHK:([A-F0-9]+)\}\}").expect("valid regex"));

/// Compute the block-5 checksum: SHA-256 of the message with any trailing
/// `{5:...}}` stripped, first 12 hex chars, uppercased.
pub fn checksum(message: &str) -> String {
    let stripped = TRAILING_BLOCK5.replace(message, "");
    let digest = Sha256::digest(stripped.as_bytes());
    hex::encode(digest)[..12].to_uppercase()
}

/// Compute the block-5 MAC: SHA-256 of `message || key`, first 16 hex chars,
/// uppercased. `key` defaults to [`DEFAULT_MAC_KEY`].
pub fn mac(message: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.as_bytes());
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..16].to_uppercase()
}

/// Validate a message's block-5 trailer against freshly computed CHK and
/// MAC values. Checks CHK first, then MAC, per the spec's stated order.
pub fn validate_trailer(message: &str, key: &str) -> Result<(), TrailerError> {
    let caps = BLOCK5_TRAILER
        .captures(message)
        .ok_or(TrailerError::MissingTrailer)?;
    let provided_mac = &caps[1];
    let provided_chk = &caps[2];

    let expected_chk = checksum(message);
    if provided_chk != expected_chk {
        return Err(TrailerError::ChecksumMismatch {
            expected: expected_chk,
            actual: provided_chk.to_string(),
        });
    }

    let expected_mac = mac(message, key);
    if provided_mac != expected_mac {
        return Err(TrailerError::MacMismatch {
            expected: expected_mac,
            actual: provided_mac.to_string(),
        });
    }

    Ok(())
}
