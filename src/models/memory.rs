//! Memory types and identifiers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(String);

impl MemoryId {
    /// Creates a new memory ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random memory ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MemoryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MemoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The six memory categories.
///
/// The type drives retention policy and temporal decay: each variant
/// carries a decay half-life and a minimum decay score, and the short-lived
/// types default to a soft expiry at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryType {
    /// Facts and identity ("My name is…", "This project uses…").
    Semantic,
    /// User preferences ("I prefer…", "We always…").
    Preference,
    /// How-to knowledge and patterns ("To fix X, …").
    Procedural,
    /// Events and decisions ("We decided…", "Yesterday…").
    Episodic,
    /// Observations ("I noticed…").
    Sensory,
    /// Scratch context that only matters briefly.
    Working,
}

impl MemoryType {
    /// All memory types, ordered from longest-lived to shortest.
    #[must_use]
    pub const fn all() -> [Self; 6] {
        [
            Self::Semantic,
            Self::Preference,
            Self::Procedural,
            Self::Episodic,
            Self::Sensory,
            Self::Working,
        ]
    }

    /// Returns the canonical uppercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "SEMANTIC",
            Self::Preference => "PREFERENCE",
            Self::Procedural => "PROCEDURAL",
            Self::Episodic => "EPISODIC",
            Self::Sensory => "SENSORY",
            Self::Working => "WORKING",
        }
    }

    /// Parses a memory type from a string (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SEMANTIC" => Some(Self::Semantic),
            "PREFERENCE" => Some(Self::Preference),
            "PROCEDURAL" => Some(Self::Procedural),
            "EPISODIC" => Some(Self::Episodic),
            "SENSORY" => Some(Self::Sensory),
            "WORKING" => Some(Self::Working),
            _ => None,
        }
    }

    /// Decay half-life in days.
    #[must_use]
    pub const fn half_life_days(self) -> f64 {
        match self {
            Self::Semantic => 365.0,
            Self::Preference => 180.0,
            Self::Procedural => 90.0,
            Self::Episodic => 30.0,
            Self::Sensory => 7.0,
            Self::Working => 1.0,
        }
    }

    /// Floor on the temporal decay score: a memory of this type never
    /// scores below this no matter how old it is.
    #[must_use]
    pub const fn min_score(self) -> f64 {
        match self {
            Self::Semantic => 0.80,
            Self::Preference => 0.70,
            Self::Procedural => 0.50,
            Self::Episodic => 0.30,
            Self::Sensory => 0.10,
            Self::Working => 0.05,
        }
    }

    /// Importance prior used by the extractor's scoring.
    #[must_use]
    pub const fn importance_prior(self) -> f64 {
        match self {
            Self::Semantic => 0.75,
            Self::Preference => 0.80,
            Self::Procedural => 0.60,
            Self::Episodic => 0.50,
            Self::Sensory => 0.30,
            Self::Working => 0.20,
        }
    }

    /// Default soft expiry applied at extraction time.
    ///
    /// Scratch and observational memories expire on their own; everything
    /// else lives until pruned.
    #[must_use]
    pub fn default_retention(self) -> Option<Duration> {
        match self {
            Self::Working => Some(Duration::days(1)),
            Self::Sensory => Some(Duration::days(7)),
            _ => None,
        }
    }

    /// Whether consolidation may cluster memories of this type.
    ///
    /// SEMANTIC, PREFERENCE, and PROCEDURAL memories are high-value and
    /// never consolidated.
    #[must_use]
    pub const fn consolidation_eligible(self) -> bool {
        matches!(self, Self::Episodic | Self::Sensory | Self::Working)
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored memory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier.
    pub id: MemoryId,
    /// The memory content.
    pub content: String,
    /// SHA-256 fingerprint of the normalized content.
    pub content_hash: String,
    /// Category governing decay and retention.
    pub memory_type: MemoryType,
    /// Importance in `[0.0, 1.0]`, derived at extraction, user-settable.
    pub importance: f64,
    /// Extractor's certainty in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Provenance tag (e.g. `cli`, `ai-conversation`, `consolidation`).
    pub source_type: String,
    /// Creation timestamp (UTC).
    pub created_at: DateTime<Utc>,
    /// Start of validity (UTC).
    pub valid_from: DateTime<Utc>,
    /// Soft expiry; `None` means indefinite.
    pub valid_to: Option<DateTime<Utc>>,
    /// Last-read timestamp, maintained by the access tracker.
    pub accessed_at: Option<DateTime<Utc>>,
    /// Cumulative read count, maintained by the access tracker.
    pub access_count: u32,
    /// Agent scoping tag.
    pub agent_id: String,
    /// Optional user scoping tag.
    pub user_id: Option<String>,
    /// Optional session scoping tag.
    pub session_id: Option<String>,
    /// Opaque key/value bag, JSON-encoded on disk.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Memory {
    /// Creates a memory with a fresh id and hashed content.
    ///
    /// Timestamps are set to `now`; the type's default retention (if any)
    /// determines `valid_to`.
    #[must_use]
    pub fn new(content: impl Into<String>, memory_type: MemoryType, now: DateTime<Utc>) -> Self {
        let content = content.into();
        let content_hash = crate::services::deduplication::ContentHasher::hash(&content);
        Self {
            id: MemoryId::generate(),
            content,
            content_hash,
            memory_type,
            importance: 0.5,
            confidence: 1.0,
            source_type: "api".to_string(),
            created_at: now,
            valid_from: now,
            valid_to: memory_type.default_retention().map(|d| now + d),
            accessed_at: None,
            access_count: 0,
            agent_id: "default".to_string(),
            user_id: None,
            session_id: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Sets the importance.
    #[must_use]
    pub const fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    /// Sets the extractor confidence.
    #[must_use]
    pub const fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Sets the provenance tag.
    #[must_use]
    pub fn with_source(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = source_type.into();
        self
    }

    /// Sets the agent scoping tag.
    #[must_use]
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    /// Sets the session scoping tag.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets the user scoping tag.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the soft expiry.
    #[must_use]
    pub const fn with_valid_to(mut self, valid_to: Option<DateTime<Utc>>) -> Self {
        self.valid_to = valid_to;
        self
    }

    /// Replaces the metadata bag.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns `true` if the memory is live at `now`
    /// (`valid_to` is unset or in the future).
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.valid_to.is_none_or(|t| t > now)
    }

    /// Age in fractional days at `now`. Clamps to zero for clock skew.
    #[must_use]
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        let seconds = (now - self.created_at).num_seconds();
        if seconds <= 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let days = seconds as f64 / 86_400.0;
        days
    }
}

/// Scoping filters applied to store and recall queries.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    /// Restrict to one agent.
    pub agent_id: Option<String>,
    /// Restrict to one user.
    pub user_id: Option<String>,
    /// Restrict to one session.
    pub session_id: Option<String>,
    /// Restrict to one memory type.
    pub memory_type: Option<MemoryType>,
}

impl MemoryFilter {
    /// Creates an empty filter (matches everything).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one agent.
    #[must_use]
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Restricts to one user.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Restricts to one session.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Restricts to one memory type.
    #[must_use]
    pub const fn with_memory_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    /// Returns `true` if no restriction is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.agent_id.is_none()
            && self.user_id.is_none()
            && self.session_id.is_none()
            && self.memory_type.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_type_parse_roundtrip() {
        for mt in MemoryType::all() {
            assert_eq!(MemoryType::parse(mt.as_str()), Some(mt));
            assert_eq!(MemoryType::parse(&mt.as_str().to_lowercase()), Some(mt));
        }
        assert_eq!(MemoryType::parse("UNKNOWN"), None);
    }

    #[test]
    fn test_retention_table() {
        assert!((MemoryType::Semantic.half_life_days() - 365.0).abs() < f64::EPSILON);
        assert!((MemoryType::Working.half_life_days() - 1.0).abs() < f64::EPSILON);
        assert!((MemoryType::Semantic.min_score() - 0.80).abs() < f64::EPSILON);
        assert!((MemoryType::Working.min_score() - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_retention_only_for_short_lived_types() {
        assert!(MemoryType::Working.default_retention().is_some());
        assert!(MemoryType::Sensory.default_retention().is_some());
        assert!(MemoryType::Semantic.default_retention().is_none());
        assert!(MemoryType::Preference.default_retention().is_none());
    }

    #[test]
    fn test_memory_liveness() {
        let now = Utc::now();
        let mut memory = Memory::new("test content", MemoryType::Semantic, now);
        assert!(memory.is_live(now));

        memory.valid_to = Some(now - Duration::seconds(1));
        assert!(!memory.is_live(now));

        memory.valid_to = Some(now + Duration::hours(1));
        assert!(memory.is_live(now));
    }

    #[test]
    fn test_working_memory_expires_by_default() {
        let now = Utc::now();
        let memory = Memory::new("scratch", MemoryType::Working, now);
        assert_eq!(memory.valid_to, Some(now + Duration::days(1)));
    }

    #[test]
    fn test_age_days() {
        let now = Utc::now();
        let memory = Memory::new("aged", MemoryType::Episodic, now - Duration::days(30));
        assert!((memory.age_days(now) - 30.0).abs() < 0.01);

        // Creation in the future clamps to zero
        let future = Memory::new("future", MemoryType::Episodic, now + Duration::days(1));
        assert!((future.age_days(now) - 0.0).abs() < f64::EPSILON);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// `MemoryId` preserves the input string exactly.
            #[test]
            fn prop_memory_id_preserves_string(s in "[a-zA-Z0-9_-]{1,100}") {
                let id = MemoryId::new(&s);
                prop_assert_eq!(id.as_str(), s.as_str());
            }

            /// Identical content always produces an identical hash.
            #[test]
            fn prop_same_content_same_hash(content in ".{1,200}") {
                let now = Utc::now();
                let a = Memory::new(content.clone(), MemoryType::Semantic, now);
                let b = Memory::new(content, MemoryType::Semantic, now);
                prop_assert_eq!(a.content_hash, b.content_hash);
                prop_assert_ne!(a.id, b.id);
            }
        }
    }
}
