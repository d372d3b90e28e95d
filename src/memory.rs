//! The public facade.
//!
//! [`Engram`] wires the storage, recall, tracking, and retention components
//! together and enforces the latency budgets on the two primary operations:
//! `attach_memories` (read, ≤10 ms) and `generate_memories` (write,
//! ≤20 ms). In non-strict mode a blown budget logs a warning; with
//! `performance.strict_monitoring` it becomes a typed failure.

use crate::config::EngramConfig;
use crate::gc::{
    ArchiveManager, ConsolidationEngine, ConsolidationResult, PruneResult, PruneStrategy,
    SmartPruner, StopFlag,
};
use crate::models::{
    ArchivedMemory, Memory, MemoryContext, MemoryFilter, MemoryId, MemoryType, RecallStrategy,
};
use crate::services::recall::{DecayExplanation, RecallCoordinator, RecallRequest};
use crate::services::tracking::{AccessTracker, TrackerStats};
use crate::storage::graph::GraphAdapter;
use crate::storage::memory_store::{DedupPolicy, MemoryStore, StorageStats, StoreRequest};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Directory under the project root that owns the database.
const DB_DIR_NAME: &str = "kuzu-memories";

/// Options for [`Engram::attach_memories`].
#[derive(Debug, Clone)]
pub struct RecallOptions {
    /// Result limit; the configured default when `None`.
    pub max_memories: Option<usize>,
    /// Recall strategy.
    pub strategy: RecallStrategy,
    /// Agent scope.
    pub agent_id: Option<String>,
    /// Session scope.
    pub session_id: Option<String>,
    /// User scope.
    pub user_id: Option<String>,
    /// Activity-aware recency anchor.
    pub project_last_activity: Option<DateTime<Utc>>,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            max_memories: None,
            strategy: RecallStrategy::Auto,
            agent_id: None,
            session_id: None,
            user_id: None,
            project_last_activity: None,
        }
    }
}

/// Options for [`Engram::generate_memories`].
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Provenance tag.
    pub source: String,
    /// Agent scope.
    pub agent_id: String,
    /// Session scope.
    pub session_id: Option<String>,
    /// User scope.
    pub user_id: Option<String>,
    /// Metadata attached to every stored candidate.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Near-duplicate policy.
    pub policy: DedupPolicy,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            source: "ai-conversation".to_string(),
            agent_id: "default".to_string(),
            session_id: None,
            user_id: None,
            metadata: serde_json::Map::new(),
            policy: DedupPolicy::Skip,
        }
    }
}

/// Options for [`Engram::remember`].
#[derive(Debug, Clone)]
pub struct RememberOptions {
    /// Provenance tag.
    pub source: String,
    /// Agent scope.
    pub agent_id: String,
    /// Session scope.
    pub session_id: Option<String>,
    /// User scope.
    pub user_id: Option<String>,
    /// Explicit memory type; classified from content when `None`.
    pub memory_type: Option<MemoryType>,
    /// Importance override.
    pub importance: Option<f64>,
    /// Metadata bag.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Near-duplicate policy.
    pub policy: DedupPolicy,
}

impl Default for RememberOptions {
    fn default() -> Self {
        Self {
            source: "cli".to_string(),
            agent_id: "default".to_string(),
            session_id: None,
            user_id: None,
            memory_type: None,
            importance: None,
            metadata: serde_json::Map::new(),
            policy: DedupPolicy::Skip,
        }
    }
}

/// Aggregate statistics across components.
#[derive(Debug, Clone)]
pub struct EngramStats {
    /// Storage counts.
    pub storage: StorageStats,
    /// Access tracker counters.
    pub tracker: TrackerStats,
}

/// An embedded, graph-backed memory store for one project.
///
/// One instance owns the database and the access-tracker worker thread;
/// dropping the instance drains and stops the worker. Cross-instance
/// writes to the same database are unsupported.
pub struct Engram {
    config: EngramConfig,
    adapter: Arc<GraphAdapter>,
    store: MemoryStore,
    recall: RecallCoordinator,
    archive: ArchiveManager,
    tracker: AccessTracker,
}

impl Engram {
    /// Opens (creating if needed) the memory store under
    /// `<project_root>/kuzu-memories/`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for invalid configuration and
    /// `Database` errors if the store cannot be opened.
    pub fn open(project_root: impl AsRef<Path>, config: Option<EngramConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();
        config.validate()?;

        let db_dir = project_root.as_ref().join(DB_DIR_NAME);
        let adapter = Arc::new(GraphAdapter::open(
            &db_dir,
            config.storage.pool_size,
            Duration::from_millis(config.storage.acquire_timeout_ms),
        )?);

        Ok(Self::assemble(adapter, config))
    }

    /// Opens an in-memory instance (used by tests and benchmarks).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for invalid configuration.
    pub fn in_memory(config: Option<EngramConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();
        config.validate()?;
        let adapter = Arc::new(GraphAdapter::in_memory()?);
        Ok(Self::assemble(adapter, config))
    }

    fn assemble(adapter: Arc<GraphAdapter>, config: EngramConfig) -> Self {
        let store = MemoryStore::new(Arc::clone(&adapter), &config);
        let recall = RecallCoordinator::new(Arc::clone(&adapter), &config);
        let archive = ArchiveManager::new(Arc::clone(&adapter));
        let tracker = AccessTracker::start(
            Arc::clone(&adapter),
            &config.analytics,
            config.storage.queue_capacity,
        );

        tracing::info!(
            db = ?adapter.db_path(),
            tracker = tracker.is_running(),
            "engram instance ready"
        );

        Self {
            config,
            adapter,
            store,
            recall,
            archive,
            tracker,
        }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngramConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Retrieves the most relevant memories for a prompt and returns them
    /// inside an enhanced prompt (the read entry point).
    ///
    /// Returned memory ids are reported to the access tracker without
    /// blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for bad inputs, [`Error::RecallFailed`]
    /// when every strategy fails, and [`Error::PerformanceExceeded`] when
    /// the recall budget is blown under strict monitoring.
    #[instrument(skip(self, prompt, options), fields(strategy = %options.strategy))]
    pub fn attach_memories(&self, prompt: &str, options: &RecallOptions) -> Result<MemoryContext> {
        let start = Instant::now();

        let mut filter = MemoryFilter::new();
        if let Some(agent_id) = &options.agent_id {
            filter = filter.with_agent(agent_id.clone());
        }
        if let Some(session_id) = &options.session_id {
            filter = filter.with_session(session_id.clone());
        }
        if let Some(user_id) = &options.user_id {
            filter = filter.with_user(user_id.clone());
        }

        let mut request = RecallRequest::new(prompt)
            .with_strategy(options.strategy)
            .with_max_memories(
                options
                    .max_memories
                    .unwrap_or(self.config.recall.max_memories),
            )
            .with_filter(filter);
        if let Some(activity) = options.project_last_activity {
            request = request.with_project_last_activity(activity);
        }

        let context = self.recall.attach_memories(&request)?;

        let ids: Vec<MemoryId> = context.memories.iter().map(|m| m.id.clone()).collect();
        self.tracker.track_batch(&ids, "recall");

        self.enforce_budget(
            "attach_memories",
            start,
            self.config.performance.max_recall_time_ms,
        )?;
        Ok(context)
    }

    /// Explains the temporal decay computation for one stored memory.
    ///
    /// # Errors
    ///
    /// Returns `Database` errors from the lookup.
    pub fn explain_decay(
        &self,
        id: &MemoryId,
        project_last_activity: Option<DateTime<Utc>>,
    ) -> Result<Option<DecayExplanation>> {
        let memory = self.adapter.get_memory(id)?;
        Ok(memory.map(|memory| {
            self.recall
                .decay_engine()
                .explain(&memory, Utc::now(), project_last_activity)
        }))
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Extracts memory candidates from content and stores the survivors
    /// (the write entry point). Content without memory signal yields an
    /// empty list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for oversized content and
    /// [`Error::PerformanceExceeded`] when the generation budget is blown
    /// under strict monitoring.
    #[instrument(skip(self, content, options), fields(source = %options.source, content_length = content.len()))]
    pub fn generate_memories(
        &self,
        content: &str,
        options: &GenerateOptions,
    ) -> Result<Vec<MemoryId>> {
        let start = Instant::now();

        let mut request = StoreRequest::new("")
            .with_source(options.source.clone())
            .with_agent(options.agent_id.clone())
            .with_policy(options.policy);
        request.session_id = options.session_id.clone();
        request.user_id = options.user_id.clone();
        request.metadata = options.metadata.clone();

        let ids = self.store.generate_memories(content, &request)?;
        if !ids.is_empty() {
            self.recall.invalidate_cache();
        }

        self.enforce_budget(
            "generate_memories",
            start,
            self.config.performance.max_generation_time_ms,
        )?;
        Ok(ids)
    }

    /// Stores a single memory synchronously, returning its id (or the id
    /// of an existing duplicate).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for empty or oversized content.
    pub fn remember(&self, content: &str, options: &RememberOptions) -> Result<MemoryId> {
        let mut request = StoreRequest::new(content)
            .with_source(options.source.clone())
            .with_agent(options.agent_id.clone())
            .with_policy(options.policy);
        request.memory_type = options.memory_type;
        request.session_id = options.session_id.clone();
        request.user_id = options.user_id.clone();
        request.importance = options.importance;
        request.metadata = options.metadata.clone();

        let id = self.store.remember(&request)?;
        self.recall.invalidate_cache();
        Ok(id)
    }

    /// Returns the most recently created live memories.
    ///
    /// # Errors
    ///
    /// Returns `Database` errors from the adapter.
    pub fn get_recent_memories(
        &self,
        limit: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<Memory>> {
        self.store.get_recent_memories(limit, filter)
    }

    /// Fetches a memory by id.
    ///
    /// # Errors
    ///
    /// Returns `Database` errors from the adapter.
    pub fn get_memory_by_id(&self, id: &MemoryId) -> Result<Option<Memory>> {
        self.store.get_memory_by_id(id)
    }

    /// Records an associative RELATED_TO link between two memories.
    ///
    /// # Errors
    ///
    /// Returns `Database` errors from the adapter.
    pub fn link_memories(&self, from: &MemoryId, to: &MemoryId) -> Result<()> {
        self.store.link_memories(from, to)
    }

    /// Deletes memories whose `valid_to` has passed. Returns the count.
    ///
    /// # Errors
    ///
    /// Returns `Database` errors from the adapter.
    pub fn cleanup_expired_memories(&self) -> Result<usize> {
        let removed = self.store.cleanup_expired_memories()?;
        if removed > 0 {
            self.recall.invalidate_cache();
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Runs smart pruning.
    ///
    /// # Errors
    ///
    /// Returns `Database` errors from the adapter.
    pub fn smart_prune(
        &self,
        strategy: PruneStrategy,
        threshold: Option<f64>,
        dry_run: bool,
        create_backup: bool,
        stop: Option<StopFlag>,
    ) -> Result<PruneResult> {
        let mut pruner = SmartPruner::new(Arc::clone(&self.adapter), &self.config.retention);
        if let Some(threshold) = threshold {
            pruner = pruner.with_threshold(threshold);
        }
        if let Some(stop) = stop {
            pruner = pruner.with_stop_flag(stop);
        }

        let result = pruner.execute(strategy, dry_run, create_backup)?;
        if !dry_run && result.pruned > 0 {
            self.recall.invalidate_cache();
        }
        Ok(result)
    }

    /// Runs consolidation.
    ///
    /// # Errors
    ///
    /// Returns `Database` errors from the adapter.
    pub fn consolidate(
        &self,
        threshold: Option<f64>,
        dry_run: bool,
        stop: Option<StopFlag>,
    ) -> Result<ConsolidationResult> {
        // "Stale" is defined once: a memory untouched for the analytics
        // stale window is old enough to consolidate
        let mut engine =
            ConsolidationEngine::new(Arc::clone(&self.adapter), &self.config.retention)
                .with_min_age_days(i64::from(self.config.analytics.stale_threshold_days));
        if let Some(threshold) = threshold {
            engine = engine.with_similarity_threshold(threshold);
        }
        if let Some(stop) = stop {
            engine = engine.with_stop_flag(stop);
        }

        let result = engine.execute(dry_run)?;
        if !dry_run && result.summaries_created > 0 {
            self.recall.invalidate_cache();
        }
        Ok(result)
    }

    /// Restores an archived memory within its recovery window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArchiveNotFound`] when the entry does not exist.
    pub fn restore_archive(&self, archive_id: &str) -> Result<MemoryId> {
        let id = self.archive.restore(archive_id)?;
        self.recall.invalidate_cache();
        Ok(id)
    }

    /// Permanently deletes archives past their recovery window.
    ///
    /// # Errors
    ///
    /// Returns `Database` errors from the adapter.
    pub fn purge_expired_archives(&self) -> Result<usize> {
        self.archive.purge_expired()
    }

    /// Lists archive entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Database` errors from the adapter.
    pub fn list_archives(&self, limit: usize) -> Result<Vec<ArchivedMemory>> {
        self.archive.list(limit)
    }

    /// Returns aggregate statistics.
    ///
    /// # Errors
    ///
    /// Returns `Database` errors from the adapter.
    pub fn statistics(&self) -> Result<EngramStats> {
        Ok(EngramStats {
            storage: self.store.stats()?,
            tracker: self.tracker.stats(),
        })
    }

    /// Checks an operation against its budget: warn in normal mode, typed
    /// failure in strict mode.
    fn enforce_budget(&self, operation: &str, start: Instant, budget_ms: u64) -> Result<()> {
        let actual_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        if actual_ms <= budget_ms {
            return Ok(());
        }

        metrics::counter!("budget_exceeded_total", "operation" => operation.to_string())
            .increment(1);
        if self.config.performance.strict_monitoring {
            return Err(Error::PerformanceExceeded {
                operation: operation.to_string(),
                actual_ms,
                budget_ms,
            });
        }
        tracing::warn!(operation, actual_ms, budget_ms, "operation exceeded its budget");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engram() -> Engram {
        Engram::in_memory(None).unwrap()
    }

    #[test]
    fn test_generate_then_attach_round_trip() {
        let engram = engram();
        let ids = engram
            .generate_memories(
                "My name is Sarah Chen; I use Python and PostgreSQL.",
                &GenerateOptions::default(),
            )
            .unwrap();
        assert!(!ids.is_empty());

        let context = engram
            .attach_memories("What do I use?", &RecallOptions::default())
            .unwrap();
        assert!(!context.is_empty());
        assert!(context.memories[0].content.contains("Python"));
        assert!(context.memories[0].content.contains("PostgreSQL"));
    }

    #[test]
    fn test_remember_roundtrip_and_idempotence() {
        let engram = engram();
        let options = RememberOptions::default();
        let first = engram.remember("This project uses Rust.", &options).unwrap();
        let second = engram.remember("This project uses Rust.", &options).unwrap();
        assert_eq!(first, second);

        let stats = engram.statistics().unwrap();
        assert_eq!(stats.storage.total_memories, 1);
    }

    #[test]
    fn test_strict_mode_surfaces_performance_error() {
        let mut config = EngramConfig::default().with_strict_monitoring(true);
        // An impossible budget forces the typed failure deterministically
        config.performance.max_recall_time_ms = 1;
        config.recall.cache_enabled = false;
        let engram = Engram::in_memory(Some(config)).unwrap();

        for i in 0..300 {
            engram
                .remember(
                    &format!("I prefer descriptive commit messages, variant {i}"),
                    &RememberOptions::default(),
                )
                .unwrap();
        }

        let outcome = engram.attach_memories(
            "what commit messages do I prefer, descriptive or terse?",
            &RecallOptions::default(),
        );
        // Either the machine is fast enough to fit 1ms, or the typed error
        // surfaces; both are correct behavior, no panic either way
        if let Err(err) = outcome {
            assert!(matches!(err, Error::PerformanceExceeded { .. }));
        }
    }

    #[test]
    fn test_explain_decay_for_stored_memory() {
        let engram = engram();
        let id = engram
            .remember("We always review schema changes.", &RememberOptions::default())
            .unwrap();

        let explanation = engram.explain_decay(&id, None).unwrap().unwrap();
        assert!(!explanation.activity_aware_mode);
        assert!(explanation.age_days < 1.0);

        let missing = engram
            .explain_decay(&MemoryId::new("no-such-id"), None)
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_maintenance_entry_points() {
        let engram = engram();
        let prune = engram
            .smart_prune(PruneStrategy::Smart, None, true, false, None)
            .unwrap();
        assert!(prune.dry_run);

        let consolidation = engram.consolidate(None, true, None).unwrap();
        assert!(consolidation.dry_run);

        assert_eq!(engram.purge_expired_archives().unwrap(), 0);
        assert!(engram.list_archives(10).unwrap().is_empty());

        let err = engram.restore_archive("archive-missing").unwrap_err();
        assert!(matches!(err, Error::ArchiveNotFound(_)));
    }

    #[test]
    fn test_recall_scoped_by_agent() {
        let engram = engram();
        engram
            .remember(
                "I prefer rebasing over merging.",
                &RememberOptions {
                    agent_id: "alpha".to_string(),
                    ..RememberOptions::default()
                },
            )
            .unwrap();

        let scoped = engram
            .attach_memories(
                "rebasing or merging preference?",
                &RecallOptions {
                    agent_id: Some("beta".to_string()),
                    ..RecallOptions::default()
                },
            )
            .unwrap();
        assert!(scoped.is_empty());

        let matching = engram
            .attach_memories(
                "rebasing or merging preference?",
                &RecallOptions {
                    agent_id: Some("alpha".to_string()),
                    ..RecallOptions::default()
                },
            )
            .unwrap();
        assert!(!matching.is_empty());
    }
}
