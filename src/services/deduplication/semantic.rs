//! Semantic similarity via token-set and positional comparison.
//!
//! A lightweight similarity for catching paraphrases that the trigram layer
//! misses: token-set overlap captures shared vocabulary regardless of order,
//! and a positional component rewards tokens appearing at similar relative
//! positions in both texts.

use super::near::tokenize;
use std::collections::{HashMap, HashSet};

/// Weight of the token-set component; the rest is positional.
const TOKEN_SET_WEIGHT: f64 = 0.6;

/// Relative positions of each token (first occurrence wins).
fn relative_positions(tokens: &[String]) -> HashMap<&str, f64> {
    let mut positions = HashMap::new();
    let len = tokens.len();
    if len == 0 {
        return positions;
    }
    #[allow(clippy::cast_precision_loss)]
    for (i, token) in tokens.iter().enumerate() {
        positions
            .entry(token.as_str())
            .or_insert(i as f64 / len as f64);
    }
    positions
}

/// Computes the semantic similarity of two texts in `[0.0, 1.0]`.
#[must_use]
pub fn semantic_similarity(a: &str, b: &str) -> f64 {
    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);

    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let set_a: HashSet<&str> = tokens_a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = tokens_b.iter().map(String::as_str).collect();
    let shared: Vec<&str> = set_a.intersection(&set_b).copied().collect();

    let union = set_a.len() + set_b.len() - shared.len();
    #[allow(clippy::cast_precision_loss)]
    let token_set_score = shared.len() as f64 / union as f64;

    // Positional component: average closeness of shared tokens' relative
    // positions. No shared tokens means nothing to compare.
    let positional_score = if shared.is_empty() {
        0.0
    } else {
        let pos_a = relative_positions(&tokens_a);
        let pos_b = relative_positions(&tokens_b);
        #[allow(clippy::cast_precision_loss)]
        let sum: f64 = shared
            .iter()
            .map(|token| {
                let da = pos_a.get(token).copied().unwrap_or(0.0);
                let db = pos_b.get(token).copied().unwrap_or(0.0);
                1.0 - (da - db).abs()
            })
            .sum();
        sum / shared.len() as f64
    };

    TOKEN_SET_WEIGHT * token_set_score + (1.0 - TOKEN_SET_WEIGHT) * positional_score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text_scores_one() {
        let text = "the fix was to restart the indexer after every deploy";
        assert!((semantic_similarity(text, text) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_reordered_text_scores_below_identical() {
        let a = "restart the indexer after every deploy";
        let b = "after every deploy restart the indexer";
        let reordered = semantic_similarity(a, b);
        assert!(reordered < 1.0);
        assert!(reordered > 0.6, "shared vocabulary should dominate: {reordered}");
    }

    #[test]
    fn test_disjoint_text_scores_zero() {
        let score = semantic_similarity("alpha beta gamma", "delta epsilon zeta");
        assert!((score - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_inputs() {
        assert!((semantic_similarity("", "") - 1.0).abs() < f64::EPSILON);
        assert!((semantic_similarity("word", "") - 0.0).abs() < f64::EPSILON);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Scores stay within the unit interval.
            #[test]
            fn prop_bounded(a in "[a-z ]{0,60}", b in "[a-z ]{0,60}") {
                let score = semantic_similarity(&a, &b);
                prop_assert!((0.0..=1.0).contains(&score));
            }

            /// Similarity is symmetric.
            #[test]
            fn prop_symmetric(a in "[a-z ]{0,60}", b in "[a-z ]{0,60}") {
                let ab = semantic_similarity(&a, &b);
                let ba = semantic_similarity(&b, &a);
                prop_assert!((ab - ba).abs() < 1e-9);
            }
        }
    }
}
