//! Incremental SHA-256 over the bytes actually sent to the object store.

use sha2::{Digest, Sha256};
use std::fmt;

/// Running content hash for one upload.
///
/// Bytes must be fed in the order they are written to the store. Skipping or
/// reordering a range silently produces a different digest.
#[derive(Clone, Default)]
pub struct IncrementalHasher {
    state: Sha256,
}

impl IncrementalHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` to the running digest.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.state.update(bytes);
    }

    /// Consume the hasher and return the digest.
    pub fn finalize(self) -> ContentDigest {
        ContentDigest(self.state.finalize().into())
    }
}

/// Finalized SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Uppercase hex bytes separated by hyphens, e.g. `E3-B0-C4-...`.
    pub fn to_hyphenated_hex(&self) -> String {
        self.as_bytes()
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hyphenated_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hyphenated_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_known_digest() {
        let digest = IncrementalHasher::new().finalize();
        assert!(
            digest
                .to_hyphenated_hex()
                .starts_with("E3-B0-C4-42-98-FC-1C-14")
        );
    }

    #[test]
    fn split_feeding_matches_one_shot() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let mut hasher = IncrementalHasher::new();
        for piece in data.chunks(7) {
            hasher.feed(piece);
        }

        let expected: [u8; 32] = Sha256::digest(data).into();
        assert_eq!(hasher.finalize().as_bytes(), &expected);
    }

    #[test]
    fn order_changes_the_digest() {
        let mut forward = IncrementalHasher::new();
        forward.feed(b"ab");
        forward.feed(b"cd");

        let mut swapped = IncrementalHasher::new();
        swapped.feed(b"cd");
        swapped.feed(b"ab");

        assert_ne!(forward.finalize(), swapped.finalize());
    }

    #[test]
    fn hex_rendering_is_hyphenated_uppercase() {
        let mut hasher = IncrementalHasher::new();
        hasher.feed(b"abc");
        let hex = hasher.finalize().to_hyphenated_hex();

        assert_eq!(hex.len(), 32 * 3 - 1);
        assert!(hex.starts_with("BA-78-16-BF"));
        assert!(
            hex.chars()
                .all(|c| c == '-' || c.is_ascii_digit() || c.is_ascii_uppercase())
        );
    }
}
