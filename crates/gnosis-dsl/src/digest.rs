//! Content and stability hashing.
//!
//! Two distinct hashes are used on purpose:
//!
//! - [`content_hash`] is a cryptographic SHA-256 over a `Source`'s raw bytes,
//!   used for duplicate-source detection within an ontology. Collisions here
//!   would silently merge unrelated documents, so this one needs real
//!   collision resistance.
//! - [`fnv1a64_hex`] is a fast, non-cryptographic digest used to build short,
//!   stable suffixes for human-readable deterministic ids (concept ids,
//!   relationship ids). It does not need to resist adversarial collisions,
//!   only to be deterministic and cheap.

use sha2::{Digest, Sha256};

/// SHA-256 of `bytes`, returned as lowercase hex. Used as `Source.content_hash`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001b3;

/// FNV-1a 64-bit digest of `bytes`, as 16 lowercase hex digits (no prefix).
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// FNV-1a 64-bit digest of `s`, hex-encoded.
pub fn fnv1a64_hex(s: &str) -> String {
    format!("{:016x}", fnv1a64(s.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic_and_sensitive() {
        let a = content_hash(b"hello world");
        let b = content_hash(b"hello world");
        let c = content_hash(b"hello world.");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fnv1a64_hex_is_deterministic_and_fixed_width() {
        let a = fnv1a64_hex("concept:Engine");
        let b = fnv1a64_hex("concept:Engine");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn fnv1a64_hex_changes_with_input() {
        let a = fnv1a64_hex("concept:Engine");
        let b = fnv1a64_hex("concept:Engines");
        assert_ne!(a, b);
    }
}
