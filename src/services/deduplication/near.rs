//! Near-duplicate detection via trigram shingles.
//!
//! Tokenization is Unicode word segmentation (`\w+` word runs) with
//! lowercasing. Texts are shingled into word trigrams and compared with
//! Jaccard similarity; texts shorter than three tokens fall back to
//! comparing their token sets directly.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Compiles a pattern known to be valid at build time.
#[allow(clippy::unwrap_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

static WORD: Lazy<Regex> = Lazy::new(|| compile(r"\w+"));

/// Splits text into lowercase word tokens.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Builds word-trigram shingles from a token list.
fn shingles(tokens: &[String]) -> HashSet<String> {
    if tokens.len() < 3 {
        return tokens.iter().cloned().collect();
    }
    tokens.windows(3).map(|w| w.join(" ")).collect()
}

/// Jaccard similarity of two sets.
fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    #[allow(clippy::cast_precision_loss)]
    let score = intersection as f64 / union as f64;
    score
}

/// Computes the near-similarity of two texts in `[0.0, 1.0]`.
#[must_use]
pub fn near_similarity(a: &str, b: &str) -> f64 {
    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);
    jaccard(&shingles(&tokens_a), &shingles(&tokens_b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("Use PostgreSQL, always!"),
            vec!["use", "postgresql", "always"]
        );
    }

    #[test]
    fn test_identical_text_scores_one() {
        let text = "we decided to use PostgreSQL as the primary database";
        assert!((near_similarity(text, text) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unrelated_text_scores_low() {
        let score = near_similarity(
            "we decided to use PostgreSQL as the primary database",
            "the quick brown fox jumps over a lazy dog today",
        );
        assert!(score < 0.1, "expected near-zero, got {score}");
    }

    #[test]
    fn test_small_edit_scores_high() {
        let score = near_similarity(
            "we decided to use PostgreSQL as the primary database for the project",
            "we decided to use PostgreSQL as the main database for the project",
        );
        assert!(score > 0.5, "expected high similarity, got {score}");
    }

    #[test_case("", "", 1.0; "both empty")]
    #[test_case("word", "", 0.0; "one empty")]
    #[test_case("a b", "a b", 1.0; "short identical")]
    fn test_edge_cases(a: &str, b: &str, expected: f64) {
        assert!((near_similarity(a, b) - expected).abs() < f64::EPSILON);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Similarity is symmetric.
            #[test]
            fn prop_symmetric(a in "[a-z ]{0,80}", b in "[a-z ]{0,80}") {
                let ab = near_similarity(&a, &b);
                let ba = near_similarity(&b, &a);
                prop_assert!((ab - ba).abs() < f64::EPSILON);
            }

            /// Similarity stays within the unit interval and self-similarity is 1.
            #[test]
            fn prop_bounded_and_reflexive(a in "[a-z ]{1,80}") {
                let score = near_similarity(&a, &a);
                prop_assert!((score - 1.0).abs() < f64::EPSILON);
            }
        }
    }
}
