use sha2::{Digest, Sha256};

/// Hex encoded SHA-256 of an in-memory upload.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
