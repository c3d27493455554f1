//! SHA-256 helpers
//!
//! All hashes on the wire are lowercase hex SHA-256.

use sha2::{Digest, Sha256};

/// Hash data with SHA-256, returning lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash data with SHA-256, returning the raw 32-byte digest
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&result);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_known_vector() {
        // SHA-256 of the empty string
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256_hex_is_lowercase() {
        let h = sha256_hex(b"daan");
        assert_eq!(h, h.to_lowercase());
        assert_eq!(h.len(), 64);
    }
}
