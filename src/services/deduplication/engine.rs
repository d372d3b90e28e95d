//! Deduplication engine orchestrator.
//!
//! Runs the three similarity layers over a candidate set with short-circuit
//! per candidate: a hash match skips the similarity computations entirely.

use super::hasher::ContentHasher;
use super::near::near_similarity;
use super::semantic::semantic_similarity;
use super::types::{DuplicateMatch, MatchType};
use crate::config::DedupConfig;
use crate::models::Memory;
use tracing::instrument;

/// Engine for multi-layer duplicate detection.
///
/// The engine is pure and stateless: it holds only thresholds and operates
/// on the candidate slice a caller gives it. Callers are responsible for
/// restricting candidates to the deduplication boundary (live memories of
/// one memory type).
///
/// # Example
///
/// ```rust,ignore
/// use engram::services::deduplication::DeduplicationEngine;
///
/// let engine = DeduplicationEngine::new(config.dedup.clone());
/// let matches = engine.find_duplicates("Use PostgreSQL", &candidates);
/// if let Some(best) = matches.first() {
///     println!("{} duplicate (score {:.2})", best.match_type, best.score);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DeduplicationEngine {
    config: DedupConfig,
}

impl DeduplicationEngine {
    /// Creates an engine with the given thresholds.
    #[must_use]
    pub const fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    /// Creates an engine with default thresholds.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DedupConfig::default())
    }

    /// Returns the configured thresholds.
    #[must_use]
    pub const fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Scores one candidate against content, returning the strongest layer
    /// that clears its threshold.
    fn score_candidate(
        &self,
        content_hash: &str,
        content: &str,
        candidate: &Memory,
    ) -> Option<(f64, MatchType)> {
        if candidate.content_hash == content_hash {
            return Some((1.0, MatchType::Exact));
        }

        let near = near_similarity(content, &candidate.content);
        if near >= self.config.exact_threshold {
            return Some((near, MatchType::Exact));
        }
        if near >= self.config.near_threshold {
            return Some((near, MatchType::Near));
        }

        let semantic = semantic_similarity(content, &candidate.content);
        if semantic >= self.config.semantic_threshold {
            return Some((semantic, MatchType::Semantic));
        }

        None
    }

    /// Finds duplicates of `content` among `candidates`, sorted by score
    /// descending.
    #[instrument(skip(self, content, candidates), fields(candidates = candidates.len()))]
    #[must_use]
    pub fn find_duplicates(&self, content: &str, candidates: &[Memory]) -> Vec<DuplicateMatch> {
        let content_hash = ContentHasher::hash(content);

        let mut matches: Vec<DuplicateMatch> = candidates
            .iter()
            .filter_map(|candidate| {
                self.score_candidate(&content_hash, content, candidate)
                    .map(|(score, match_type)| DuplicateMatch {
                        memory: candidate.clone(),
                        score,
                        match_type,
                    })
            })
            .collect();

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        if !matches.is_empty() {
            metrics::counter!("dedup_matches_total").increment(matches.len() as u64);
            tracing::debug!(
                matches = matches.len(),
                best_score = matches.first().map_or(0.0, |m| m.score),
                "Duplicates found"
            );
        }

        matches
    }

    /// Finds the strongest duplicate of `content` at or above
    /// `min_score`, if any.
    #[must_use]
    pub fn best_match(
        &self,
        content: &str,
        candidates: &[Memory],
        min_score: f64,
    ) -> Option<DuplicateMatch> {
        self.find_duplicates(content, candidates)
            .into_iter()
            .find(|m| m.score >= min_score)
    }
}

impl Default for DeduplicationEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MemoryType;
    use chrono::Utc;

    fn memory(content: &str) -> Memory {
        Memory::new(content, MemoryType::Episodic, Utc::now())
    }

    #[test]
    fn test_exact_match_by_hash() {
        let engine = DeduplicationEngine::with_defaults();
        let candidates = vec![memory("We decided to use PostgreSQL.")];

        // Normalization means case differences still hash-match
        let matches = engine.find_duplicates("we decided to use postgresql.", &candidates);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].match_type, MatchType::Exact);
        assert!((matches[0].score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_near_match() {
        let engine = DeduplicationEngine::with_defaults();
        let candidates = vec![memory(
            "yesterday we migrated the staging cluster to the new storage backend without downtime",
        )];

        let matches = engine.find_duplicates(
            "yesterday we migrated the staging cluster to the new storage backend with no downtime",
            &candidates,
        );
        assert_eq!(matches.len(), 1);
        assert!(matches[0].score < 1.0);
    }

    #[test]
    fn test_no_match_for_unrelated_content() {
        let engine = DeduplicationEngine::with_defaults();
        let candidates = vec![memory("We decided to use PostgreSQL.")];

        let matches = engine.find_duplicates("The weather turned cold overnight.", &candidates);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_results_sorted_by_score() {
        let engine = DeduplicationEngine::new(DedupConfig {
            semantic_threshold: 0.2,
            ..DedupConfig::default()
        });
        let candidates = vec![
            memory("we fixed the flaky integration test by pinning the port"),
            memory("we fixed the flaky integration test by pinning the port number yesterday"),
        ];

        let matches = engine.find_duplicates(
            "we fixed the flaky integration test by pinning the port",
            &candidates,
        );
        assert!(matches.len() >= 2);
        assert!(matches[0].score >= matches[1].score);
    }

    #[test]
    fn test_best_match_respects_min_score() {
        let engine = DeduplicationEngine::with_defaults();
        let candidates = vec![memory("We decided to use PostgreSQL.")];

        let best = engine.best_match("We decided to use PostgreSQL.", &candidates, 0.99);
        assert!(best.is_some());

        let none = engine.best_match("Entirely different topic.", &candidates, 0.5);
        assert!(none.is_none());
    }
}
