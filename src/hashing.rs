//! Content fingerprints and change detection.
//!
//! A document is re-embedded only when the SHA-256 of its raw bytes differs
//! from the fingerprint recorded at its last successful index. Modification
//! times and sizes are ignored.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `bytes` (64 lowercase hex characters).
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Decide whether a document must be (re)indexed.
///
/// Returns true when `force_full` is set, when nothing is stored for the
/// path, or when the stored and current fingerprints differ.
pub fn needs_reindex(stored: Option<&str>, current: &str, force_full: bool) -> bool {
    if force_full {
        return true;
    }
    match stored {
        Some(prev) => prev != current,
        None => true,
    }
}
