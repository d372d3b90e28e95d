//! Memory extraction and classification.
//!
//! Pattern-matches candidate statements out of free-form text, assigns each
//! a memory type, computes importance and confidence, and harvests entities
//! and keywords. All of it is regex-level; no model inference.

mod entities;
mod patterns;

pub use entities::{extract_entities, extract_keywords};
pub use patterns::{classify, has_explicit_instruction, split_sentences};

use crate::models::{EntityMention, MemoryType};
use crate::{Error, Result};
use tracing::instrument;

/// Maximum accepted input length in bytes (100 KB).
pub const MAX_CONTENT_LENGTH: usize = 100_000;

/// Maximum keywords harvested per candidate.
const MAX_KEYWORDS: usize = 12;

// Importance weights; they sum to 1.0.
const WEIGHT_EXPLICIT: f64 = 0.30;
const WEIGHT_ENTITY_DENSITY: f64 = 0.20;
const WEIGHT_EMPHASIS: f64 = 0.10;
const WEIGHT_LENGTH: f64 = 0.15;
const WEIGHT_TYPE_PRIOR: f64 = 0.25;

/// A memory candidate extracted from text, ready to be deduplicated and
/// persisted.
#[derive(Debug, Clone)]
pub struct MemoryCandidate {
    /// The candidate statement.
    pub text: String,
    /// Classified memory type.
    pub memory_type: MemoryType,
    /// Importance in `[0.0, 1.0]`.
    pub importance: f64,
    /// Extractor confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Harvested keywords.
    pub keywords: Vec<String>,
    /// Harvested entity mentions.
    pub entities: Vec<EntityMention>,
}

/// Pattern-driven extractor and classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryExtractor;

impl MemoryExtractor {
    /// Creates an extractor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Extracts memory candidates from free-form text.
    ///
    /// Content without any memory signal yields an empty list, which is a
    /// valid result, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the input exceeds
    /// [`MAX_CONTENT_LENGTH`].
    #[instrument(skip(self, content), fields(content_length = content.len()))]
    pub fn extract(&self, content: &str) -> Result<Vec<MemoryCandidate>> {
        if content.len() > MAX_CONTENT_LENGTH {
            return Err(Error::Validation {
                field: "content".to_string(),
                reason: format!(
                    "exceeds maximum length of {MAX_CONTENT_LENGTH} bytes ({})",
                    content.len()
                ),
            });
        }

        let candidates: Vec<MemoryCandidate> = split_sentences(content)
            .into_iter()
            .filter_map(|sentence| {
                classify(sentence).map(|memory_type| self.build_candidate(sentence, memory_type))
            })
            .collect();

        tracing::debug!(candidates = candidates.len(), "Extraction complete");
        metrics::counter!("extraction_candidates_total").increment(candidates.len() as u64);

        Ok(candidates)
    }

    /// Builds a fully scored candidate from a classified sentence.
    fn build_candidate(&self, sentence: &str, memory_type: MemoryType) -> MemoryCandidate {
        let entities = extract_entities(sentence);
        let keywords = extract_keywords(sentence, MAX_KEYWORDS);
        let explicit = has_explicit_instruction(sentence);
        let importance = Self::score_importance(sentence, memory_type, entities.len(), explicit);
        let confidence = Self::score_confidence(entities.len(), explicit);

        MemoryCandidate {
            text: sentence.to_string(),
            memory_type,
            importance,
            confidence,
            keywords,
            entities,
        }
    }

    /// Importance is a weighted sum of content signals and the type prior.
    fn score_importance(
        sentence: &str,
        memory_type: MemoryType,
        entity_count: usize,
        explicit: bool,
    ) -> f64 {
        let explicit_score = if explicit { 1.0 } else { 0.0 };

        let token_count = crate::services::deduplication::tokenize(sentence).len().max(1);
        #[allow(clippy::cast_precision_loss)]
        let entity_density = ((entity_count * 4) as f64 / token_count as f64).min(1.0);

        let emphasis = if sentence
            .split_whitespace()
            .any(|w| w.len() >= 2 && w.chars().all(|c| c.is_ascii_uppercase()))
        {
            1.0
        } else {
            0.0
        };

        let length_score = length_band_score(sentence.len());

        let score = WEIGHT_EXPLICIT * explicit_score
            + WEIGHT_ENTITY_DENSITY * entity_density
            + WEIGHT_EMPHASIS * emphasis
            + WEIGHT_LENGTH * length_score
            + WEIGHT_TYPE_PRIOR * memory_type.importance_prior();
        score.clamp(0.0, 1.0)
    }

    /// Confidence grows with corroborating signals.
    #[allow(clippy::cast_precision_loss)]
    fn score_confidence(entity_count: usize, explicit: bool) -> f64 {
        let base: f64 = 0.6;
        let explicit_bonus = if explicit { 0.2 } else { 0.0 };
        let entity_bonus = (entity_count as f64 * 0.1).min(0.2);
        (base + explicit_bonus + entity_bonus).clamp(0.0, 1.0)
    }
}

/// Scores sentence length: full marks inside the 20–200 char band, linear
/// falloff outside it.
fn length_band_score(len: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let len = len as f64;
    if (20.0..=200.0).contains(&len) {
        1.0
    } else if len < 20.0 {
        len / 20.0
    } else {
        (400.0 - len).max(0.0) / 200.0
    }
}
