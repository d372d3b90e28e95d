//! Content hashing for exact-duplicate detection.
//!
//! Content is normalized before hashing so that trivial formatting
//! differences (case, surrounding or repeated whitespace) still produce
//! the same fingerprint.

use sha2::{Digest, Sha256};

/// Content hasher for deduplication.
///
/// # Example
///
/// ```rust
/// use engram::services::deduplication::ContentHasher;
///
/// let hash = ContentHasher::hash("Use PostgreSQL for primary storage");
/// assert_eq!(hash.len(), 64);
///
/// // Normalized content produces the same hash
/// assert_eq!(hash, ContentHasher::hash("  use  POSTGRESQL  for primary storage "));
/// ```
pub struct ContentHasher;

impl ContentHasher {
    /// Computes the SHA-256 hash of normalized content, hex-encoded.
    #[must_use]
    pub fn hash(content: &str) -> String {
        let normalized = Self::normalize(content);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Normalizes content for hashing: trim, lowercase, collapse
    /// whitespace runs to single spaces.
    #[must_use]
    pub fn normalize(content: &str) -> String {
        content
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_64_hex_chars() {
        let hash = ContentHasher::hash("test content");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_whitespace_and_case_do_not_matter() {
        assert_eq!(
            ContentHasher::hash("Use PostgreSQL"),
            ContentHasher::hash("  use   postgresql  ")
        );
        assert_eq!(
            ContentHasher::hash("line one\nline two"),
            ContentHasher::hash("line one line two")
        );
    }

    #[test]
    fn test_different_content_different_hash() {
        assert_ne!(
            ContentHasher::hash("Use PostgreSQL"),
            ContentHasher::hash("Use MySQL")
        );
    }

    #[test]
    fn test_normalize() {
        assert_eq!(ContentHasher::normalize("  Hello   WORLD  "), "hello world");
        assert_eq!(ContentHasher::normalize(""), "");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Hash output is always 64 hex characters.
            #[test]
            fn prop_hash_length(content in any::<String>()) {
                prop_assert_eq!(ContentHasher::hash(&content).len(), 64);
            }

            /// Normalization is idempotent.
            #[test]
            fn prop_normalize_idempotent(content in any::<String>()) {
                let once = ContentHasher::normalize(&content);
                let twice = ContentHasher::normalize(&once);
                prop_assert_eq!(once, twice);
            }

            /// Case and padding never change the hash.
            #[test]
            fn prop_hash_normalization_invariant(content in "[a-z ]{1,50}") {
                let padded = format!("  {content}  ");
                let upper = content.to_uppercase();
                prop_assert_eq!(ContentHasher::hash(&content), ContentHasher::hash(&padded));
                prop_assert_eq!(ContentHasher::hash(&content), ContentHasher::hash(&upper));
            }
        }
    }
}
