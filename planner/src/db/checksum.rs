//! Checksum calculation for candidate identity.

use sha2::{Digest, Sha256};

/// Calculate SHA-256 checksum of arbitrary content.
pub fn calculate_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Identity hash of a candidate: `sha256(name|type|author)` as lowercase hex.
///
/// The separator keeps `("ab", "c")` and `("a", "bc")` from colliding.
pub fn candidate_checksum(name: &str, candidate_type: &str, author: &str) -> String {
    calculate_checksum(&format!("{}|{}|{}", name, candidate_type, author))
}
