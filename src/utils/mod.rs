//! Utility functions and helpers.

pub mod http;

use sha2::{Digest, Sha256};

/// Short, stable hex digest of a string, for log lines.
pub fn fingerprint(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..6])
}
