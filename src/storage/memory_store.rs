//! Memory store: CRUD, dedup-on-write, expiry sweep.
//!
//! The store sits between the extractor and the graph adapter. Every write
//! goes through the deduplication ladder first: exact hash lookup against
//! live memories of the same type, then the near/semantic layers over a
//! bounded candidate set. What happens on a near hit is the caller's
//! choice via [`DedupPolicy`].

use crate::config::EngramConfig;
use crate::models::{
    ConsolidationEdge, Memory, MemoryFilter, MemoryId, MemoryType,
};
use crate::services::deduplication::{ContentHasher, DeduplicationEngine};
use crate::services::extraction::{self, MemoryExtractor};
use crate::storage::graph::GraphAdapter;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Upper bound on candidates fetched for the near/semantic dedup layers.
/// Keeps the write path bounded on large stores.
const DEDUP_CANDIDATE_LIMIT: usize = 200;

/// What to do when a near or semantic duplicate already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    /// Return the existing memory's id; store nothing.
    #[default]
    Skip,
    /// Refresh the existing memory's metadata with the incoming bag, then
    /// return its id.
    Update,
    /// Store the new memory too and link it to the existing one with a
    /// CONSOLIDATED_INTO edge.
    Merge,
}

/// A single-memory store request.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    /// The content to remember.
    pub content: String,
    /// Memory type; classified from content when `None`.
    pub memory_type: Option<MemoryType>,
    /// Provenance tag.
    pub source: String,
    /// Agent scope.
    pub agent_id: String,
    /// Optional session scope.
    pub session_id: Option<String>,
    /// Optional user scope.
    pub user_id: Option<String>,
    /// Optional importance override.
    pub importance: Option<f64>,
    /// Metadata bag.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Near-duplicate policy.
    pub policy: DedupPolicy,
}

impl StoreRequest {
    /// Creates a request with defaults for everything but the content.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            memory_type: None,
            source: "api".to_string(),
            agent_id: "default".to_string(),
            session_id: None,
            user_id: None,
            importance: None,
            metadata: serde_json::Map::new(),
            policy: DedupPolicy::Skip,
        }
    }

    /// Sets the provenance tag.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Sets the memory type explicitly.
    #[must_use]
    pub const fn with_memory_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    /// Sets the agent scope.
    #[must_use]
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    /// Sets the near-duplicate policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: DedupPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Storage statistics for the facade's aggregate view.
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Total memory rows, live or not.
    pub total_memories: u64,
    /// Live memory counts keyed by type name.
    pub live_by_type: HashMap<String, u64>,
}

/// The memory store.
pub struct MemoryStore {
    adapter: Arc<GraphAdapter>,
    extractor: MemoryExtractor,
    dedup: DeduplicationEngine,
    near_threshold: f64,
}

impl MemoryStore {
    /// Creates a store over the given adapter.
    #[must_use]
    pub fn new(adapter: Arc<GraphAdapter>, config: &EngramConfig) -> Self {
        Self {
            adapter,
            extractor: MemoryExtractor::new(),
            dedup: DeduplicationEngine::new(config.dedup.clone()),
            near_threshold: config.dedup.near_threshold,
        }
    }

    /// Returns the underlying adapter.
    #[must_use]
    pub fn adapter(&self) -> &Arc<GraphAdapter> {
        &self.adapter
    }

    /// Stores a single memory synchronously, returning its id — or the id
    /// of an existing duplicate, per the request's [`DedupPolicy`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for empty or oversized content and
    /// `Database` errors from the adapter.
    #[instrument(skip(self, request), fields(source = %request.source, content_length = request.content.len()))]
    pub fn remember(&self, request: &StoreRequest) -> Result<MemoryId> {
        let content = request.content.trim();
        if content.is_empty() {
            return Err(Error::Validation {
                field: "content".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }
        if content.len() > extraction::MAX_CONTENT_LENGTH {
            return Err(Error::Validation {
                field: "content".to_string(),
                reason: format!(
                    "exceeds maximum length of {} bytes",
                    extraction::MAX_CONTENT_LENGTH
                ),
            });
        }

        let now = Utc::now();
        let memory_type = request
            .memory_type
            .or_else(|| extraction::classify(content))
            .unwrap_or(MemoryType::Semantic);

        if let Some(existing) = self.deduplicate(content, memory_type, request, now)? {
            return Ok(existing);
        }

        let memory = self.build_memory(content, memory_type, request, now);
        let mentions = extraction::extract_entities(content);
        self.adapter.insert_memory(&memory, &mentions)?;

        tracing::debug!(memory_id = %memory.id, memory_type = %memory_type, "memory stored");
        Ok(memory.id)
    }

    /// Extracts candidates from free text, dedups each against live
    /// memories of its type, and persists the survivors.
    ///
    /// Returns the ids the content now lives under: freshly created ids for
    /// survivors, existing ids for deduplicated candidates. Content with no
    /// memory signal yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for oversized content and `Database`
    /// errors from the adapter. Extraction failures inside the pattern
    /// machinery are logged and yield an empty list.
    #[instrument(skip(self, content, request), fields(content_length = content.len()))]
    pub fn generate_memories(
        &self,
        content: &str,
        request: &StoreRequest,
    ) -> Result<Vec<MemoryId>> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let candidates = match self.extractor.extract(content) {
            Ok(candidates) => candidates,
            Err(err @ Error::Validation { .. }) => return Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "extraction failed, producing no memories");
                metrics::counter!("extraction_failures_total").increment(1);
                return Ok(Vec::new());
            },
        };

        let now = Utc::now();
        let mut ids = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            if let Some(existing) =
                self.deduplicate(&candidate.text, candidate.memory_type, request, now)?
            {
                ids.push(existing);
                continue;
            }

            let memory = self
                .build_memory(&candidate.text, candidate.memory_type, request, now)
                .with_importance(request.importance.unwrap_or(candidate.importance))
                .with_confidence(candidate.confidence);
            self.adapter.insert_memory(&memory, &candidate.entities)?;
            ids.push(memory.id);
        }

        metrics::counter!("memories_generated_total").increment(ids.len() as u64);
        Ok(ids)
    }

    /// Returns the most recently created live memories.
    pub fn get_recent_memories(
        &self,
        limit: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<Memory>> {
        self.adapter.recent_memories(limit, filter, Utc::now())
    }

    /// Fetches a memory by id.
    pub fn get_memory_by_id(&self, id: &MemoryId) -> Result<Option<Memory>> {
        self.adapter.get_memory(id)
    }

    /// Deletes memories whose `valid_to` has passed. Returns the count.
    pub fn cleanup_expired_memories(&self) -> Result<usize> {
        self.adapter.delete_expired(Utc::now())
    }

    /// Adds an associative RELATED_TO link between two memories.
    pub fn link_memories(&self, from: &MemoryId, to: &MemoryId) -> Result<()> {
        self.adapter.add_related(from, to)
    }

    /// Returns storage statistics.
    pub fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_memories: self.adapter.count_memories()?,
            live_by_type: self.adapter.counts_by_type(Utc::now())?,
        })
    }

    /// Runs the dedup ladder. Returns the id the caller should use if the
    /// content already lives somewhere, `None` if it should be stored.
    fn deduplicate(
        &self,
        content: &str,
        memory_type: MemoryType,
        request: &StoreRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<MemoryId>> {
        // Exact layer: hash lookup against live memories of the same type
        let content_hash = ContentHasher::hash(content);
        if let Some(existing) = self
            .adapter
            .find_live_by_hash(&content_hash, memory_type, now)?
        {
            metrics::counter!("dedup_hits_total", "layer" => "exact").increment(1);
            tracing::debug!(existing = %existing.id, "exact duplicate, skipping write");
            return Ok(Some(existing.id));
        }

        // Near/semantic layers over a bounded candidate set
        let candidates =
            self.adapter
                .live_memories_of_type(memory_type, now, DEDUP_CANDIDATE_LIMIT)?;
        let Some(hit) = self
            .dedup
            .best_match(content, &candidates, self.near_threshold)
        else {
            return Ok(None);
        };

        metrics::counter!("dedup_hits_total", "layer" => hit.match_type.as_str()).increment(1);
        tracing::debug!(
            existing = %hit.memory.id,
            score = hit.score,
            policy = ?request.policy,
            "near duplicate found"
        );

        match request.policy {
            DedupPolicy::Skip => Ok(Some(hit.memory.id)),
            DedupPolicy::Update => {
                let mut metadata = hit.memory.metadata.clone();
                for (key, value) in &request.metadata {
                    metadata.insert(key.clone(), value.clone());
                }
                self.adapter.update_metadata(&hit.memory.id, &metadata)?;
                Ok(Some(hit.memory.id))
            },
            DedupPolicy::Merge => {
                let memory = self.build_memory(content, memory_type, request, now);
                let mentions = extraction::extract_entities(content);
                self.adapter.insert_memory(&memory, &mentions)?;
                self.adapter.add_consolidated_edge(&ConsolidationEdge {
                    original_id: memory.id.clone(),
                    summary_id: hit.memory.id.clone(),
                    consolidation_date: now,
                    cluster_id: format!("dedup-merge-{}", hit.memory.id),
                    similarity_score: hit.score,
                })?;
                Ok(Some(memory.id))
            },
        }
    }

    fn build_memory(
        &self,
        content: &str,
        memory_type: MemoryType,
        request: &StoreRequest,
        now: DateTime<Utc>,
    ) -> Memory {
        let mut memory = Memory::new(content, memory_type, now)
            .with_source(request.source.clone())
            .with_agent(request.agent_id.clone())
            .with_metadata(request.metadata.clone());
        if let Some(session_id) = &request.session_id {
            memory = memory.with_session(session_id.clone());
        }
        if let Some(user_id) = &request.user_id {
            memory = memory.with_user(user_id.clone());
        }
        if let Some(importance) = request.importance {
            memory = memory.with_importance(importance.clamp(0.0, 1.0));
        }
        memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        let adapter = Arc::new(GraphAdapter::in_memory().unwrap());
        MemoryStore::new(adapter, &EngramConfig::default())
    }

    #[test]
    fn test_remember_and_fetch() {
        let store = store();
        let id = store
            .remember(&StoreRequest::new("This project uses Rust.").with_source("cli"))
            .unwrap();

        let memory = store.get_memory_by_id(&id).unwrap().unwrap();
        assert_eq!(memory.content, "This project uses Rust.");
        assert_eq!(memory.memory_type, MemoryType::Semantic);
        assert_eq!(memory.source_type, "cli");
    }

    #[test]
    fn test_remember_is_idempotent() {
        let store = store();
        let request = StoreRequest::new("This project uses Rust.");
        let first = store.remember(&request).unwrap();
        let second = store.remember(&request).unwrap();
        let third = store.remember(&request).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, third);
        assert_eq!(store.stats().unwrap().total_memories, 1);
    }

    #[test]
    fn test_same_content_different_type_coexists() {
        let store = store();
        let semantic = store
            .remember(
                &StoreRequest::new("deploys happen on fridays")
                    .with_memory_type(MemoryType::Semantic),
            )
            .unwrap();
        let episodic = store
            .remember(
                &StoreRequest::new("deploys happen on fridays")
                    .with_memory_type(MemoryType::Episodic),
            )
            .unwrap();

        assert_ne!(semantic, episodic);
        assert_eq!(store.stats().unwrap().total_memories, 2);
    }

    #[test]
    fn test_empty_content_rejected() {
        let store = store();
        let err = store.remember(&StoreRequest::new("   ")).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_generate_memories_extracts_and_persists() {
        let store = store();
        let ids = store
            .generate_memories(
                "My name is Sarah Chen; I use Python and PostgreSQL. I prefer small diffs.",
                &StoreRequest::new("").with_source("ai-conversation"),
            )
            .unwrap();

        assert_eq!(ids.len(), 2);
        let first = store.get_memory_by_id(&ids[0]).unwrap().unwrap();
        assert!(first.content.contains("Sarah Chen"));
        assert_eq!(first.source_type, "ai-conversation");
    }

    #[test]
    fn test_generate_memories_no_signal_is_empty() {
        let store = store();
        let ids = store
            .generate_memories("The sky was clear over the bay.", &StoreRequest::new(""))
            .unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_generate_memories_dedups_repeat_content() {
        let store = store();
        let request = StoreRequest::new("").with_source("cli");
        let first = store
            .generate_memories("This project uses Python and PostgreSQL.", &request)
            .unwrap();
        let second = store
            .generate_memories("This project uses Python and PostgreSQL.", &request)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.stats().unwrap().total_memories, 1);
    }

    #[test]
    fn test_update_policy_refreshes_metadata() {
        let store = store();
        let original = store
            .remember(
                &StoreRequest::new("we always squash merge feature branches before release time")
                    .with_memory_type(MemoryType::Preference),
            )
            .unwrap();

        let mut request = StoreRequest::new(
            "we always squash merge feature branches before the release time",
        )
        .with_memory_type(MemoryType::Preference)
        .with_policy(DedupPolicy::Update);
        request
            .metadata
            .insert("revisit".to_string(), serde_json::json!(true));

        let id = store.remember(&request).unwrap();
        assert_eq!(id, original);

        let memory = store.get_memory_by_id(&id).unwrap().unwrap();
        assert_eq!(memory.metadata.get("revisit"), Some(&serde_json::json!(true)));
        assert_eq!(store.stats().unwrap().total_memories, 1);
    }

    #[test]
    fn test_merge_policy_stores_both_and_links() {
        let store = store();
        let base = "yesterday we migrated the billing service to the new queue system";
        let near = "yesterday we migrated the billing service to the newer queue system";

        let original = store
            .remember(&StoreRequest::new(base).with_memory_type(MemoryType::Episodic))
            .unwrap();
        let merged = store
            .remember(
                &StoreRequest::new(near)
                    .with_memory_type(MemoryType::Episodic)
                    .with_policy(DedupPolicy::Merge),
            )
            .unwrap();

        assert_ne!(original, merged);
        assert_eq!(store.stats().unwrap().total_memories, 2);

        let edges = store.adapter().edges_into_summary(&original).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].original_id, merged);
    }

    #[test]
    fn test_cleanup_expired() {
        let store = store();
        // WORKING memories default to a one-day expiry; backdate by storing
        // directly through the adapter
        let now = Utc::now();
        let expired = Memory::new("stale scratch", MemoryType::Working, now)
            .with_valid_to(Some(now - chrono::Duration::hours(1)));
        store.adapter().insert_memory(&expired, &[]).unwrap();

        let removed = store.cleanup_expired_memories().unwrap();
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_recent_memories_filtering() {
        let store = store();
        store
            .remember(&StoreRequest::new("I prefer trunk based development").with_agent("alpha"))
            .unwrap();
        store
            .remember(&StoreRequest::new("We always pin dependencies").with_agent("beta"))
            .unwrap();

        let all = store.get_recent_memories(10, &MemoryFilter::new()).unwrap();
        assert_eq!(all.len(), 2);

        let alpha_only = store
            .get_recent_memories(10, &MemoryFilter::new().with_agent("alpha"))
            .unwrap();
        assert_eq!(alpha_only.len(), 1);
        assert_eq!(alpha_only[0].agent_id, "alpha");
    }
}
