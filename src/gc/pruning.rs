//! Smart pruning with multi-factor retention scoring.
//!
//! Every memory gets a retention score from four weighted factors (age,
//! size, access, importance). Memories below the threshold are archived
//! (when enabled) and deleted, unless a protection rule exempts them.

use crate::config::RetentionConfig;
use crate::models::{ArchivedMemory, Memory, MemoryId, MemoryType};
use crate::storage::graph::GraphAdapter;
use crate::Result;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

use super::StopFlag;

// Scoring weights; they sum to 1.0.
const WEIGHT_AGE: f64 = 0.35;
const WEIGHT_SIZE: f64 = 0.20;
const WEIGHT_ACCESS: f64 = 0.30;
const WEIGHT_IMPORTANCE: f64 = 0.15;

// Normalization constants.
const MAX_AGE_DAYS: f64 = 365.0;
const MAX_CONTENT_SIZE: f64 = 10_000.0;
const MAX_ACCESS_COUNT: f64 = 20.0;
const RECENCY_WINDOW_DAYS: f64 = 90.0;

// Protection thresholds.
const MIN_IMPORTANCE: f64 = 0.8;
const MIN_ACCESS_COUNT: u32 = 10;
const MIN_AGE_DAYS: f64 = 30.0;
const PROTECTED_SOURCES: &[&str] = &["claude-code-hook", "cli", "project-initialization"];

/// Rows deleted per transaction.
const DELETE_BATCH: usize = 100;

/// Named prune strategy variants, adjusting threshold aggressiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneStrategy {
    /// Half the configured threshold; only clear junk goes.
    Safe,
    /// The configured threshold as-is.
    Smart,
    /// The configured threshold with the full protection set (the default
    /// scoring already accounts for access recency).
    Intelligent,
    /// One-and-a-half times the configured threshold, capped at 0.5.
    Aggressive,
}

impl PruneStrategy {
    /// Returns the strategy name used in logs and backup file names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Smart => "smart",
            Self::Intelligent => "intelligent",
            Self::Aggressive => "aggressive",
        }
    }

    /// Derives the effective threshold from the configured one.
    #[must_use]
    pub fn effective_threshold(self, configured: f64) -> f64 {
        match self {
            Self::Safe => configured * 0.5,
            Self::Smart | Self::Intelligent => configured,
            Self::Aggressive => (configured * 1.5).min(0.5),
        }
    }
}

/// Multi-factor retention score for one memory.
#[derive(Debug, Clone)]
pub struct RetentionScore {
    /// The scored memory.
    pub memory_id: MemoryId,
    /// Age factor in `[0, 1]`; lower is older.
    pub age_score: f64,
    /// Size factor in `[0, 1]`; lower is larger.
    pub size_score: f64,
    /// Access factor in `[0, 1]`; higher is more used.
    pub access_score: f64,
    /// The memory's importance field.
    pub importance_score: f64,
    /// Weighted combination of the four factors.
    pub total_score: f64,
    /// Whether a protection rule exempts this memory.
    pub is_protected: bool,
    /// The first protection rule that fired, if any.
    pub protection_reason: Option<String>,
}

/// Factor averages over the scored population.
#[derive(Debug, Clone, Default)]
pub struct ScoreBreakdown {
    /// Memories scored.
    pub total_memories: usize,
    /// Mean age factor.
    pub avg_age_score: f64,
    /// Mean size factor.
    pub avg_size_score: f64,
    /// Mean access factor.
    pub avg_access_score: f64,
    /// Mean importance factor.
    pub avg_importance_score: f64,
    /// Count under the threshold (before protection).
    pub below_threshold: usize,
    /// Count exempted by protection rules.
    pub protected: usize,
}

/// Result of a pruning run.
#[derive(Debug, Clone)]
pub struct PruneResult {
    /// The strategy that ran.
    pub strategy: PruneStrategy,
    /// Unprotected memories under the threshold.
    pub candidates: usize,
    /// Memories actually deleted.
    pub pruned: usize,
    /// Memories archived before deletion.
    pub archived: usize,
    /// Memories exempted by protection rules.
    pub protected: usize,
    /// Wall time of the run in milliseconds.
    pub execution_time_ms: u64,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Snapshot path when a backup was taken.
    pub backup_path: Option<PathBuf>,
    /// Factor averages over the scored population.
    pub breakdown: ScoreBreakdown,
}

impl PruneResult {
    /// Returns a one-line human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let action = if self.dry_run { "would prune" } else { "pruned" };
        format!(
            "{action} {} of {} candidates ({} protected, {} archived) in {}ms",
            self.pruned,
            self.candidates,
            self.protected,
            self.archived,
            self.execution_time_ms
        )
    }
}

/// The smart pruner.
pub struct SmartPruner {
    adapter: Arc<GraphAdapter>,
    threshold: f64,
    archive_enabled: bool,
    recovery_days: i64,
    stop: StopFlag,
}

impl SmartPruner {
    /// Creates a pruner with the retention configuration's defaults.
    #[must_use]
    pub fn new(adapter: Arc<GraphAdapter>, config: &RetentionConfig) -> Self {
        Self {
            adapter,
            threshold: config.smart_threshold,
            archive_enabled: config.archive_enabled,
            recovery_days: config.archive_recovery_days,
            stop: StopFlag::new(),
        }
    }

    /// Overrides the score threshold.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Attaches a cooperative stop flag.
    #[must_use]
    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    fn age_score(memory: &Memory, now: DateTime<Utc>) -> f64 {
        (1.0 - memory.age_days(now) / MAX_AGE_DAYS).max(0.0)
    }

    fn size_score(memory: &Memory) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let len = memory.content.len() as f64;
        (1.0 - len / MAX_CONTENT_SIZE).max(0.0)
    }

    #[allow(clippy::cast_precision_loss)]
    fn access_score(memory: &Memory, now: DateTime<Utc>) -> f64 {
        let frequency = (f64::from(memory.access_count) / MAX_ACCESS_COUNT).min(1.0);
        let recency = memory.accessed_at.map_or(0.0, |accessed| {
            let days = (now - accessed).num_seconds().max(0) as f64 / 86_400.0;
            (1.0 - days / RECENCY_WINDOW_DAYS).max(0.0)
        });
        // Frequency carries slightly more weight than recency
        frequency * 0.6 + recency * 0.4
    }

    /// Returns the first protection rule that applies, if any.
    fn protection_reason(memory: &Memory, now: DateTime<Utc>) -> Option<String> {
        if memory.importance >= MIN_IMPORTANCE {
            return Some(format!("high importance ({:.2})", memory.importance));
        }
        if memory.access_count >= MIN_ACCESS_COUNT {
            return Some(format!("frequently accessed ({} times)", memory.access_count));
        }
        let age = memory.age_days(now);
        if age < MIN_AGE_DAYS {
            return Some(format!("too recent ({age:.0} days)"));
        }
        if PROTECTED_SOURCES.contains(&memory.source_type.as_str()) {
            return Some(format!("protected source ({})", memory.source_type));
        }
        if memory.memory_type == MemoryType::Preference {
            return Some("user preference".to_string());
        }
        None
    }

    /// Scores one memory.
    #[must_use]
    pub fn score_memory(&self, memory: &Memory, now: DateTime<Utc>) -> RetentionScore {
        let age_score = Self::age_score(memory, now);
        let size_score = Self::size_score(memory);
        let access_score = Self::access_score(memory, now);
        let importance_score = memory.importance;

        let total_score = age_score * WEIGHT_AGE
            + size_score * WEIGHT_SIZE
            + access_score * WEIGHT_ACCESS
            + importance_score * WEIGHT_IMPORTANCE;

        let protection_reason = Self::protection_reason(memory, now);

        RetentionScore {
            memory_id: memory.id.clone(),
            age_score,
            size_score,
            access_score,
            importance_score,
            total_score,
            is_protected: protection_reason.is_some(),
            protection_reason,
        }
    }

    /// Scores every memory, lowest total first.
    pub fn calculate_scores(&self, now: DateTime<Utc>) -> Result<Vec<(Memory, RetentionScore)>> {
        let memories = self.adapter.all_memories()?;
        let mut scored: Vec<(Memory, RetentionScore)> = memories
            .into_iter()
            .map(|memory| {
                let score = self.score_memory(&memory, now);
                (memory, score)
            })
            .collect();
        scored.sort_by(|a, b| {
            a.1.total_score
                .partial_cmp(&b.1.total_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(scored)
    }

    /// Executes a pruning run.
    ///
    /// Flow: score all, drop protected, take those under the effective
    /// threshold; archive (when enabled) then delete, in batches, checking
    /// the stop flag between batches. `dry_run` reports without mutating.
    ///
    /// # Errors
    ///
    /// Returns `Database` errors from the adapter; per-memory archive
    /// failures are logged and skip that memory.
    #[instrument(skip(self), fields(strategy = strategy.as_str(), dry_run, create_backup))]
    pub fn execute(
        &self,
        strategy: PruneStrategy,
        dry_run: bool,
        create_backup: bool,
    ) -> Result<PruneResult> {
        let start = Instant::now();
        let now = Utc::now();
        let threshold = strategy.effective_threshold(self.threshold);

        let scored = self.calculate_scores(now)?;
        let breakdown = Self::breakdown(&scored, threshold);
        let protected = breakdown.protected;

        let candidates: Vec<&(Memory, RetentionScore)> = scored
            .iter()
            .filter(|(_, score)| !score.is_protected && score.total_score < threshold)
            .collect();

        tracing::info!(
            total = scored.len(),
            candidates = candidates.len(),
            protected,
            threshold,
            "prune candidates selected"
        );

        if dry_run {
            return Ok(PruneResult {
                strategy,
                candidates: candidates.len(),
                pruned: 0,
                archived: 0,
                protected,
                execution_time_ms: elapsed_ms(start),
                dry_run: true,
                backup_path: None,
                breakdown,
            });
        }

        let backup_path = if create_backup {
            Some(self.adapter.snapshot(strategy.as_str(), now)?)
        } else {
            None
        };

        let mut archived = 0_usize;
        let mut pruned = 0_usize;

        for batch in candidates.chunks(DELETE_BATCH) {
            if self.stop.should_stop() {
                tracing::info!(pruned, "prune stopped cooperatively");
                break;
            }

            let mut batch_ids: Vec<MemoryId> = Vec::with_capacity(batch.len());
            for (memory, score) in batch {
                if self.archive_enabled {
                    let entry = ArchivedMemory::from_memory(
                        memory,
                        score.total_score,
                        format!("smart prune (score={:.3})", score.total_score),
                        now,
                        self.recovery_days,
                    );
                    match self.adapter.insert_archive(&entry) {
                        Ok(true) => archived += 1,
                        Ok(false) => {
                            tracing::debug!(memory_id = %memory.id, "archive entry already exists");
                        },
                        Err(err) => {
                            tracing::warn!(memory_id = %memory.id, error = %err, "archive failed, keeping memory");
                            continue;
                        },
                    }
                }
                batch_ids.push(memory.id.clone());
            }

            pruned += self.adapter.delete_memories(&batch_ids)?;
        }

        metrics::counter!("memories_pruned_total").increment(pruned as u64);
        #[allow(clippy::cast_precision_loss)]
        let duration_f64 = elapsed_ms(start) as f64;
        metrics::histogram!("prune_duration_ms").record(duration_f64);

        Ok(PruneResult {
            strategy,
            candidates: candidates.len(),
            pruned,
            archived,
            protected,
            execution_time_ms: elapsed_ms(start),
            dry_run: false,
            backup_path,
            breakdown,
        })
    }

    fn breakdown(scored: &[(Memory, RetentionScore)], threshold: f64) -> ScoreBreakdown {
        if scored.is_empty() {
            return ScoreBreakdown::default();
        }
        #[allow(clippy::cast_precision_loss)]
        let n = scored.len() as f64;
        ScoreBreakdown {
            total_memories: scored.len(),
            avg_age_score: scored.iter().map(|(_, s)| s.age_score).sum::<f64>() / n,
            avg_size_score: scored.iter().map(|(_, s)| s.size_score).sum::<f64>() / n,
            avg_access_score: scored.iter().map(|(_, s)| s.access_score).sum::<f64>() / n,
            avg_importance_score: scored.iter().map(|(_, s)| s.importance_score).sum::<f64>() / n,
            below_threshold: scored
                .iter()
                .filter(|(_, s)| s.total_score < threshold)
                .count(),
            protected: scored.iter().filter(|(_, s)| s.is_protected).count(),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
