//! Service layer.
//!
//! Extraction, recall, deduplication, and access tracking. Services work
//! with typed models and the graph adapter's typed operations; none of
//! them touch SQL.

pub mod deduplication;
pub mod extraction;
pub mod recall;
pub mod tracking;

pub use deduplication::{DeduplicationEngine, DuplicateMatch, MatchType};
pub use extraction::{MemoryCandidate, MemoryExtractor};
pub use recall::{RecallCoordinator, RecallRequest, TemporalDecayEngine};
pub use tracking::{AccessTracker, TrackerStats};
