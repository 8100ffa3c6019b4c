// hasher.rs — SHA-256 hashing utilities.
//
// Audit hashes are SHA-256, rendered as 64 lowercase hex characters. Payloads
// are hashed (never stored) so an entry can reference exactly what was judged
// without carrying it.

use sha2::{Digest, Sha256};

/// Hash arbitrary bytes to lowercase hex SHA-256.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a UTF-8 string.
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// First 12 hex characters, for display.
pub fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
