//! Deduplication result types.

use crate::models::Memory;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which similarity layer produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Identical content hash (or near-similarity above the exact threshold).
    Exact,
    /// Trigram-shingle similarity above the near threshold.
    Near,
    /// Token-set similarity above the semantic threshold.
    Semantic,
}

impl MatchType {
    /// Returns the match type as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Near => "near",
            Self::Semantic => "semantic",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A duplicate candidate with its similarity score.
#[derive(Debug, Clone)]
pub struct DuplicateMatch {
    /// The existing memory that matched.
    pub memory: Memory,
    /// Similarity score in `[0.0, 1.0]`.
    pub score: f64,
    /// The layer that produced the match.
    pub match_type: MatchType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_type_display() {
        assert_eq!(MatchType::Exact.to_string(), "exact");
        assert_eq!(MatchType::Near.to_string(), "near");
        assert_eq!(MatchType::Semantic.to_string(), "semantic");
    }
}
