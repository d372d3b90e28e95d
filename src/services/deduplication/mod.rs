//! Deduplication engine.
//!
//! Detects duplicate memory content in three layers, cheap to expensive:
//! 1. **Exact**: SHA-256 hash comparison of normalized content
//! 2. **Near**: Jaccard similarity over word-trigram shingles
//! 3. **Semantic**: token-set overlap mixed with positional similarity
//!
//! The engine is pure and stateless; thresholds come from configuration.

mod engine;
mod hasher;
mod near;
mod semantic;
mod types;

pub use engine::DeduplicationEngine;
pub use hasher::ContentHasher;
pub use near::{near_similarity, tokenize};
pub use semantic::semantic_similarity;
pub use types::{DuplicateMatch, MatchType};
