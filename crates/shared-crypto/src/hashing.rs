//! # SHA-256 Hashing
//!
//! One-shot, double and tagged SHA-256. Tagged hashing prefixes the input with
//! a length-delimited context string so that ids derived for different purposes
//! cannot collide even when the payloads do.

use sha2::{Digest, Sha256};

/// SHA-256 output (256-bit).
pub type Hash = [u8; 32];

/// Stateful SHA-256 hasher.
#[derive(Clone, Default)]
pub struct Sha256Hasher {
    inner: Sha256,
}

impl Sha256Hasher {
    /// Create new hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hasher already primed with a domain tag.
    pub fn new_tagged(tag: &str) -> Self {
        let mut hasher = Self::new();
        hasher.update(&(tag.len() as u32).to_le_bytes());
        hasher.update(tag.as_bytes());
        hasher
    }

    /// Update with data.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    /// Finalize and return hash.
    pub fn finalize(self) -> Hash {
        self.inner.finalize().into()
    }
}

/// Hash data with SHA-256 (one-shot).
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// Double SHA-256, as used by the platform for document ids.
pub fn sha256d(data: &[u8]) -> Hash {
    sha256(&sha256(data))
}

/// Domain-separated SHA-256.
pub fn tagged_hash(tag: &str, data: &[u8]) -> Hash {
    let mut hasher = Sha256Hasher::new_tagged(tag);
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let hash = sha256(b"abc");
        assert_eq!(
            hex::encode(hash),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(sha256(b"test"), sha256(b"test"));
        assert_ne!(sha256(b"input1"), sha256(b"input2"));
    }

    #[test]
    fn test_double_hash_differs_from_single() {
        assert_ne!(sha256(b"doc"), sha256d(b"doc"));
        assert_eq!(sha256d(b"doc"), sha256(&sha256(b"doc")));
    }

    #[test]
    fn test_streaming_matches_oneshot() {
        let mut hasher = Sha256Hasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), sha256(b"hello world"));
    }

    #[test]
    fn test_tag_separates_domains() {
        let a = tagged_hash("pw/operation/v1", b"payload");
        let b = tagged_hash("pw/identity/v1", b"payload");
        assert_ne!(a, b);
        assert_ne!(a, sha256(b"payload"));
    }

    #[test]
    fn test_tag_is_length_delimited() {
        // "ab" + "c" must not collide with "a" + "bc"
        assert_ne!(tagged_hash("ab", b"c"), tagged_hash("a", b"bc"));
    }
}
