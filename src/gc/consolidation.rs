//! Consolidation: cluster old low-value memories and summarize each cluster.
//!
//! Candidates are live EPISODIC/SENSORY/WORKING memories older than 90 days
//! with at most 3 accesses. The best-accessed candidates seed clusters as
//! centroids; similarity comes from the deduplication engine. Each cluster
//! becomes one summary memory, CONSOLIDATED_INTO edges record the lineage,
//! and the originals are archived then deleted. Summaries themselves are
//! never re-consolidated: freshly created ones are excluded within a pass,
//! and `source_type = "consolidation"` keeps them out of later candidate
//! selection.

use crate::config::{DedupConfig, RetentionConfig};
use crate::models::{ArchivedMemory, ConsolidationEdge, Memory, MemoryId};
use crate::services::deduplication::DeduplicationEngine;
use crate::storage::graph::GraphAdapter;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

use super::StopFlag;

/// Minimum candidate age in days.
const MIN_AGE_DAYS: i64 = 90;

/// Maximum access count for a candidate.
const MAX_ACCESS_COUNT: u32 = 3;

/// Minimum similarity for cluster membership.
const SIMILARITY_THRESHOLD: f64 = 0.70;

/// Minimum memories per cluster (centroid included).
const MIN_CLUSTER_SIZE: usize = 2;

/// A member contributes a "Related:" fragment when more than this share of
/// its tokens is absent from the centroid.
const UNIQUENESS_RATIO: f64 = 0.3;

/// A cluster of similar memories scheduled for consolidation.
#[derive(Debug, Clone)]
pub struct MemoryCluster {
    /// Cluster identifier (stable within a pass).
    pub cluster_id: String,
    /// The representative memory (highest access count).
    pub centroid: Memory,
    /// All members, centroid first.
    pub members: Vec<Memory>,
    /// Similarity of each member to the centroid.
    pub similarity: HashMap<MemoryId, f64>,
    /// Mean of the similarity values.
    pub avg_similarity: f64,
}

/// Result of a consolidation run.
#[derive(Debug, Clone)]
pub struct ConsolidationResult {
    /// Candidates examined.
    pub memories_analyzed: usize,
    /// Clusters identified.
    pub clusters_found: usize,
    /// Originals archived and deleted.
    pub memories_consolidated: usize,
    /// Archive entries written.
    pub memories_archived: usize,
    /// Summary memories created.
    pub summaries_created: usize,
    /// Wall time of the run in milliseconds.
    pub execution_time_ms: u64,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// The cluster plan (always populated; the basis of dry-run review).
    pub clusters: Vec<MemoryCluster>,
}

/// The consolidation engine.
pub struct ConsolidationEngine {
    adapter: Arc<GraphAdapter>,
    dedup: DeduplicationEngine,
    similarity_threshold: f64,
    min_age_days: i64,
    max_access_count: u32,
    recovery_days: i64,
    stop: StopFlag,
}

impl ConsolidationEngine {
    /// Creates an engine with the default eligibility rules.
    #[must_use]
    pub fn new(adapter: Arc<GraphAdapter>, config: &RetentionConfig) -> Self {
        // The similarity ladder is recalibrated for clustering: anything at
        // or above the cluster threshold should surface with its score.
        let dedup = DeduplicationEngine::new(DedupConfig {
            exact_threshold: 0.95,
            near_threshold: SIMILARITY_THRESHOLD,
            semantic_threshold: SIMILARITY_THRESHOLD * 0.7,
        });
        Self {
            adapter,
            dedup,
            similarity_threshold: SIMILARITY_THRESHOLD,
            min_age_days: MIN_AGE_DAYS,
            max_access_count: MAX_ACCESS_COUNT,
            recovery_days: config.archive_recovery_days,
            stop: StopFlag::new(),
        }
    }

    /// Overrides the similarity threshold.
    #[must_use]
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self.dedup = DeduplicationEngine::new(DedupConfig {
            exact_threshold: 0.95,
            near_threshold: threshold,
            semantic_threshold: threshold * 0.7,
        });
        self
    }

    /// Overrides the eligibility age.
    #[must_use]
    pub const fn with_min_age_days(mut self, days: i64) -> Self {
        self.min_age_days = days;
        self
    }

    /// Attaches a cooperative stop flag.
    #[must_use]
    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    /// Finds memories eligible for consolidation, oldest first.
    pub fn find_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Memory>> {
        let cutoff = now - Duration::days(self.min_age_days);
        self.adapter
            .consolidation_candidates(cutoff, self.max_access_count, now)
    }

    /// Groups candidates into clusters around high-access centroids.
    #[must_use]
    pub fn cluster(&self, candidates: &[Memory], now: DateTime<Utc>) -> Vec<MemoryCluster> {
        let mut sorted: Vec<&Memory> = candidates.iter().collect();
        sorted.sort_by(|a, b| b.access_count.cmp(&a.access_count));

        let mut clustered: HashSet<MemoryId> = HashSet::new();
        let mut clusters = Vec::new();

        for (index, centroid) in sorted.iter().enumerate() {
            if clustered.contains(&centroid.id) {
                continue;
            }

            let remaining: Vec<Memory> = sorted[index + 1..]
                .iter()
                .filter(|m| !clustered.contains(&m.id))
                .map(|m| (*m).clone())
                .collect();
            if remaining.is_empty() {
                break;
            }

            let matches = self.dedup.find_duplicates(&centroid.content, &remaining);
            let similar: Vec<_> = matches
                .into_iter()
                .filter(|m| m.score >= self.similarity_threshold)
                .collect();

            if similar.len() < MIN_CLUSTER_SIZE - 1 {
                continue;
            }

            let mut similarity: HashMap<MemoryId, f64> = HashMap::new();
            similarity.insert(centroid.id.clone(), 1.0);
            let mut members = vec![(*centroid).clone()];
            for m in similar {
                similarity.insert(m.memory.id.clone(), m.score);
                members.push(m.memory);
            }

            #[allow(clippy::cast_precision_loss)]
            let avg_similarity =
                similarity.values().sum::<f64>() / similarity.len() as f64;

            for member in &members {
                clustered.insert(member.id.clone());
            }

            clusters.push(MemoryCluster {
                cluster_id: format!(
                    "cluster-{}-{}",
                    &centroid.id.as_str()[..8.min(centroid.id.as_str().len())],
                    now.timestamp()
                ),
                centroid: (*centroid).clone(),
                members,
                similarity,
                avg_similarity,
            });
        }

        tracing::info!(
            clusters = clusters.len(),
            candidates = candidates.len(),
            clustered = clustered.len(),
            "clustering complete"
        );
        clusters
    }

    /// Synthesizes the summary text for a cluster.
    ///
    /// Starts from the centroid's content; each other member contributes a
    /// "Related:" fragment iff enough of its tokens are absent from the
    /// centroid (the uniqueness test).
    #[must_use]
    pub fn synthesize_summary(cluster: &MemoryCluster) -> String {
        let centroid_tokens: HashSet<String> =
            crate::services::deduplication::tokenize(&cluster.centroid.content)
                .into_iter()
                .collect();

        let mut parts = vec![cluster.centroid.content.clone()];

        for member in &cluster.members {
            if member.id == cluster.centroid.id {
                continue;
            }
            let member_tokens = crate::services::deduplication::tokenize(&member.content);
            if member_tokens.is_empty() {
                continue;
            }
            let unique = member_tokens
                .iter()
                .filter(|t| !centroid_tokens.contains(*t))
                .count();
            #[allow(clippy::cast_precision_loss)]
            let uniqueness = unique as f64 / member_tokens.len() as f64;
            if uniqueness > UNIQUENESS_RATIO {
                parts.push(format!("Related: {}", preview(&member.content)));
            }
        }

        parts.join("\n\n")
    }

    /// Executes a consolidation run.
    ///
    /// With `dry_run` the cluster plan is returned and nothing mutates.
    ///
    /// # Errors
    ///
    /// Returns `Database` errors from the adapter; a cluster that fails
    /// mid-way is logged and skipped, leaving its members live.
    #[instrument(skip(self), fields(dry_run))]
    pub fn execute(&self, dry_run: bool) -> Result<ConsolidationResult> {
        let start = Instant::now();
        let now = Utc::now();

        let candidates = self.find_candidates(now)?;
        let clusters = self.cluster(&candidates, now);

        let mut result = ConsolidationResult {
            memories_analyzed: candidates.len(),
            clusters_found: clusters.len(),
            memories_consolidated: 0,
            memories_archived: 0,
            summaries_created: 0,
            execution_time_ms: 0,
            dry_run,
            clusters: clusters.clone(),
        };

        if dry_run {
            result.execution_time_ms = elapsed_ms(start);
            return Ok(result);
        }

        for cluster in &clusters {
            if self.stop.should_stop() {
                tracing::info!("consolidation stopped cooperatively");
                break;
            }
            match self.consolidate_cluster(cluster, now) {
                Ok((archived, deleted)) => {
                    result.summaries_created += 1;
                    result.memories_archived += archived;
                    result.memories_consolidated += deleted;
                },
                Err(err) => {
                    tracing::warn!(
                        cluster_id = %cluster.cluster_id,
                        error = %err,
                        "cluster consolidation failed, members remain live"
                    );
                },
            }
        }

        result.execution_time_ms = elapsed_ms(start);
        metrics::counter!("consolidation_runs_total").increment(1);
        metrics::counter!("memories_consolidated_total")
            .increment(result.memories_consolidated as u64);

        tracing::info!(
            summaries = result.summaries_created,
            consolidated = result.memories_consolidated,
            duration_ms = result.execution_time_ms,
            "consolidation complete"
        );
        Ok(result)
    }

    /// Consolidates one cluster: summary, edges, archive, delete.
    fn consolidate_cluster(
        &self,
        cluster: &MemoryCluster,
        now: DateTime<Utc>,
    ) -> Result<(usize, usize)> {
        let summary_text = Self::synthesize_summary(cluster);
        let max_importance = cluster
            .members
            .iter()
            .map(|m| m.importance)
            .fold(0.0_f64, f64::max);

        let mut metadata = serde_json::Map::new();
        metadata.insert("cluster_id".to_string(), serde_json::json!(cluster.cluster_id));
        metadata.insert(
            "consolidated_count".to_string(),
            serde_json::json!(cluster.members.len()),
        );
        metadata.insert(
            "original_ids".to_string(),
            serde_json::json!(
                cluster
                    .members
                    .iter()
                    .map(|m| m.id.as_str())
                    .collect::<Vec<_>>()
            ),
        );

        let summary = Memory::new(summary_text, cluster.centroid.memory_type, now)
            .with_source("consolidation")
            .with_agent(cluster.centroid.agent_id.clone())
            .with_importance(max_importance)
            .with_confidence(cluster.avg_similarity)
            .with_valid_to(cluster.centroid.valid_to)
            .with_metadata(metadata);

        self.adapter.insert_memory(&summary, &[])?;

        for member in &cluster.members {
            self.adapter.add_consolidated_edge(&ConsolidationEdge {
                original_id: member.id.clone(),
                summary_id: summary.id.clone(),
                consolidation_date: now,
                cluster_id: cluster.cluster_id.clone(),
                similarity_score: cluster.similarity.get(&member.id).copied().unwrap_or(0.0),
            })?;
        }

        let mut archived = 0_usize;
        for member in &cluster.members {
            let entry = ArchivedMemory::from_memory(
                member,
                cluster.similarity.get(&member.id).copied().unwrap_or(0.0),
                format!("consolidated into cluster {}", cluster.cluster_id),
                now,
                self.recovery_days,
            );
            match self.adapter.insert_archive(&entry) {
                Ok(true) => archived += 1,
                Ok(false) => {
                    tracing::debug!(memory_id = %member.id, "archive entry already exists");
                },
                Err(err) => {
                    tracing::warn!(memory_id = %member.id, error = %err, "archive failed");
                },
            }
        }

        let member_ids: Vec<MemoryId> = cluster.members.iter().map(|m| m.id.clone()).collect();
        let deleted = self.adapter.delete_memories(&member_ids)?;

        tracing::debug!(
            cluster_id = %cluster.cluster_id,
            summary_id = %summary.id,
            members = cluster.members.len(),
            "cluster consolidated"
        );
        Ok((archived, deleted))
    }
}

/// First sentence of `content`, or the first ~100 characters.
fn preview(content: &str) -> String {
    if content.len() <= 100 {
        return content.to_string();
    }
    if let Some(end) = content[..100].find(". ") {
        return content[..=end].to_string();
    }
    let mut cut = 97;
    while cut > 0 && !content.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &content[..cut])
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MemoryType;

    fn engine(adapter: Arc<GraphAdapter>) -> ConsolidationEngine {
        ConsolidationEngine::new(adapter, &RetentionConfig::default())
    }

    /// Ten near-identical EPISODIC memories, 120 days old, one access each.
    fn seed_overlapping_cluster(adapter: &GraphAdapter) -> Vec<Memory> {
        let now = Utc::now();
        (0..10)
            .map(|i| {
                let mut memory = Memory::new(
                    format!(
                        "sprint review went well and the deployment pipeline held up fine, run {i}"
                    ),
                    MemoryType::Episodic,
                    now - Duration::days(120),
                );
                memory.access_count = 1;
                adapter.insert_memory(&memory, &[]).unwrap();
                memory
            })
            .collect()
    }

    #[test]
    fn test_candidates_respect_eligibility() {
        let adapter = Arc::new(GraphAdapter::in_memory().unwrap());
        let now = Utc::now();

        let eligible = Memory::new("old low access", MemoryType::Episodic, now - Duration::days(120));
        adapter.insert_memory(&eligible, &[]).unwrap();

        let too_young = Memory::new("recent", MemoryType::Episodic, now - Duration::days(10));
        adapter.insert_memory(&too_young, &[]).unwrap();

        let mut too_used =
            Memory::new("popular", MemoryType::Episodic, now - Duration::days(120));
        too_used.access_count = 10;
        adapter.insert_memory(&too_used, &[]).unwrap();

        let high_value =
            Memory::new("a kept fact", MemoryType::Semantic, now - Duration::days(120));
        adapter.insert_memory(&high_value, &[]).unwrap();

        let engine = engine(Arc::clone(&adapter));
        let candidates = engine.find_candidates(now).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, eligible.id);
    }

    #[test]
    fn test_clustering_groups_similar_members() {
        let adapter = Arc::new(GraphAdapter::in_memory().unwrap());
        seed_overlapping_cluster(&adapter);
        let engine = engine(Arc::clone(&adapter));
        let now = Utc::now();

        let candidates = engine.find_candidates(now).unwrap();
        assert_eq!(candidates.len(), 10);

        let clusters = engine.cluster(&candidates, now);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 10);
        assert!(clusters[0].avg_similarity >= 0.70);
    }

    #[test]
    fn test_dissimilar_memories_do_not_cluster() {
        let adapter = Arc::new(GraphAdapter::in_memory().unwrap());
        let now = Utc::now();
        let texts = [
            "the login page needs a new captcha provider soon",
            "we watered the office plants on friday afternoon",
            "metrics dashboards were migrated to the new account",
        ];
        for text in texts {
            let memory = Memory::new(text, MemoryType::Episodic, now - Duration::days(120));
            adapter.insert_memory(&memory, &[]).unwrap();
        }

        let engine = engine(Arc::clone(&adapter));
        let candidates = engine.find_candidates(now).unwrap();
        let clusters = engine.cluster(&candidates, now);
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_dry_run_reports_plan_without_mutation() {
        let adapter = Arc::new(GraphAdapter::in_memory().unwrap());
        seed_overlapping_cluster(&adapter);
        let engine = engine(Arc::clone(&adapter));

        let result = engine.execute(true).unwrap();
        assert!(result.dry_run);
        assert_eq!(result.clusters_found, 1);
        assert_eq!(result.summaries_created, 0);
        assert_eq!(adapter.count_memories().unwrap(), 10);
    }

    #[test]
    fn test_consolidation_round_trip() {
        let adapter = Arc::new(GraphAdapter::in_memory().unwrap());
        let members = seed_overlapping_cluster(&adapter);
        let engine = engine(Arc::clone(&adapter));

        let result = engine.execute(false).unwrap();
        assert_eq!(result.summaries_created, 1);
        assert_eq!(result.memories_consolidated, 10);
        assert_eq!(result.memories_archived, 10);

        // One summary remains live
        assert_eq!(adapter.count_memories().unwrap(), 1);
        let now = Utc::now();
        let survivors = adapter
            .recent_memories(10, &crate::models::MemoryFilter::new(), now)
            .unwrap();
        assert_eq!(survivors.len(), 1);
        let summary = &survivors[0];
        assert_eq!(summary.source_type, "consolidation");
        assert!((summary.confidence - result.clusters[0].avg_similarity).abs() < 1e-9);

        // Every original is reachable through CONSOLIDATED_INTO edges
        let edges = adapter.edges_into_summary(&summary.id).unwrap();
        assert_eq!(edges.len(), 10);
        let edge_ids: HashSet<&str> = edges.iter().map(|e| e.original_id.as_str()).collect();
        for member in &members {
            assert!(edge_ids.contains(member.id.as_str()));
        }

        // And archived for the recovery window
        assert_eq!(adapter.list_archives(20).unwrap().len(), 10);
    }

    #[test]
    fn test_summary_not_reconsolidated_in_later_pass() {
        let adapter = Arc::new(GraphAdapter::in_memory().unwrap());
        seed_overlapping_cluster(&adapter);
        let engine = engine(Arc::clone(&adapter));

        engine.execute(false).unwrap();

        // The summary is new and tagged consolidation: no candidates remain
        let candidates = engine.find_candidates(Utc::now()).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_uniqueness_test_gates_related_fragments() {
        let now = Utc::now();
        let centroid = Memory::new(
            "sprint review covered deployment pipeline stability",
            MemoryType::Episodic,
            now,
        );
        // Near-verbatim member: no fragment
        let duplicate = Memory::new(
            "sprint review covered deployment pipeline stability again",
            MemoryType::Episodic,
            now,
        );
        // Member with real extra information: fragment expected
        let informative = Memory::new(
            "sprint review also uncovered flaky database failover alarms nobody had seen",
            MemoryType::Episodic,
            now,
        );

        let mut similarity = HashMap::new();
        similarity.insert(centroid.id.clone(), 1.0);
        similarity.insert(duplicate.id.clone(), 0.9);
        similarity.insert(informative.id.clone(), 0.75);

        let cluster = MemoryCluster {
            cluster_id: "cluster-test".to_string(),
            centroid: centroid.clone(),
            members: vec![centroid, duplicate, informative],
            similarity,
            avg_similarity: 0.88,
        };

        let summary = ConsolidationEngine::synthesize_summary(&cluster);
        assert!(summary.starts_with("sprint review covered"));
        assert!(summary.contains("Related: sprint review also uncovered"));
        assert!(!summary.contains("Related: sprint review covered deployment pipeline stability again"));
    }

    #[test]
    fn test_stop_flag_halts_between_clusters() {
        let adapter = Arc::new(GraphAdapter::in_memory().unwrap());
        seed_overlapping_cluster(&adapter);
        let stop = StopFlag::new();
        stop.request_stop();
        let engine = engine(Arc::clone(&adapter)).with_stop_flag(stop);

        let result = engine.execute(false).unwrap();
        assert_eq!(result.summaries_created, 0);
        assert_eq!(adapter.count_memories().unwrap(), 10);
    }

    #[test]
    fn test_preview_breaks_at_sentence() {
        let long = format!("A first sentence here. {}", "x".repeat(200));
        assert_eq!(preview(&long), "A first sentence here.");

        let unbroken = "y".repeat(200);
        let p = preview(&unbroken);
        assert!(p.ends_with("..."));
        assert!(p.len() <= 100);
    }
}
