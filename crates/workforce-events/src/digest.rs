//! Canonical SHA-256 digests.
//!
//! Values are serialized to compact JSON before hashing. Every map in the
//! hashed types is a `BTreeMap`, so field and key order is stable across
//! runs and platforms.

use core::fmt::Write as _;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Lowercase hex SHA-256 of the compact JSON serialization of `value`.
pub fn canonical_digest<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(sha256_hex(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_known_digest() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn canonical_digest_is_stable() {
        let a = canonical_digest(&vec![1, 2, 3]).ok();
        let b = canonical_digest(&vec![1, 2, 3]).ok();
        let c = canonical_digest(&vec![3, 2, 1]).ok();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.map(|d| d.len()), Some(64));
    }
}
