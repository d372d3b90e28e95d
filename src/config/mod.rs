//! Configuration management.
//!
//! Configuration is assembled from defaults, builder methods, and `ENGRAM_*`
//! environment variables, then validated once at construction. Sections map
//! to the subsystems they govern: performance budgets, recall, retention,
//! analytics (access tracking), deduplication thresholds, and storage.

use crate::models::RecallStrategy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Reads an environment variable and parses it, ignoring unset or malformed
/// values.
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Latency budgets for the two primary operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Budget for `attach_memories` in milliseconds.
    pub max_recall_time_ms: u64,
    /// Budget for `generate_memories` in milliseconds.
    pub max_generation_time_ms: u64,
    /// When `true`, a blown budget fails with `PerformanceExceeded`
    /// instead of logging a warning.
    pub strict_monitoring: bool,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_recall_time_ms: 10,
            max_generation_time_ms: 20,
            strict_monitoring: false,
        }
    }
}

/// Recall coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Default number of memories returned by a recall.
    pub max_memories: usize,
    /// Whether recall results are cached per prompt.
    pub cache_enabled: bool,
    /// Strategies the coordinator is allowed to run.
    pub strategies_enabled: Vec<RecallStrategy>,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            max_memories: 10,
            cache_enabled: true,
            strategies_enabled: vec![
                RecallStrategy::Keyword,
                RecallStrategy::Entity,
                RecallStrategy::Temporal,
            ],
        }
    }
}

impl RecallConfig {
    /// Returns `true` if the given strategy may run.
    #[must_use]
    pub fn strategy_enabled(&self, strategy: RecallStrategy) -> bool {
        strategy == RecallStrategy::Auto || self.strategies_enabled.contains(&strategy)
    }
}

/// Retention (pruning and archival) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Retention-score threshold below which memories are prune candidates.
    pub smart_threshold: f64,
    /// Archive memories before deleting them.
    pub archive_enabled: bool,
    /// Days an archive entry survives before purge.
    pub archive_recovery_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            smart_threshold: 0.30,
            archive_enabled: true,
            archive_recovery_days: 30,
        }
    }
}

/// Access-tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Whether the background tracker runs at all.
    pub tracker_enabled: bool,
    /// Seconds between batch flushes.
    pub batch_interval_s: u64,
    /// Pending-event count that forces an early flush.
    pub batch_size: usize,
    /// Days without access after which a memory counts as stale.
    pub stale_threshold_days: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            tracker_enabled: true,
            batch_interval_s: 5,
            batch_size: 100,
            stale_threshold_days: 90,
        }
    }
}

/// Deduplication thresholds, layered cheap to expensive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Near-similarity at or above which a match counts as exact.
    pub exact_threshold: f64,
    /// Trigram-Jaccard threshold for near duplicates.
    pub near_threshold: f64,
    /// Token-set similarity threshold for semantic duplicates.
    pub semantic_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            exact_threshold: 0.95,
            near_threshold: 0.85,
            semantic_threshold: 0.70,
        }
    }
}

/// Storage and pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Number of pooled connections.
    pub pool_size: usize,
    /// Milliseconds to wait for a pooled connection before failing with
    /// `PoolExhausted`.
    pub acquire_timeout_ms: u64,
    /// Access-tracker queue capacity; the oldest event is dropped (and
    /// counted) when full.
    pub queue_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            acquire_timeout_ms: 5000,
            queue_capacity: 10_000,
        }
    }
}

/// Main configuration for engram.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngramConfig {
    /// Latency budgets.
    pub performance: PerformanceConfig,
    /// Recall settings.
    pub recall: RecallConfig,
    /// Retention settings.
    pub retention: RetentionConfig,
    /// Access-tracker settings.
    pub analytics: AnalyticsConfig,
    /// Deduplication thresholds.
    pub dedup: DedupConfig,
    /// Storage and pool settings.
    pub storage: StorageConfig,
}

impl EngramConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration from environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// Recognized variables:
    /// - `ENGRAM_MAX_RECALL_TIME_MS`, `ENGRAM_MAX_GENERATION_TIME_MS`,
    ///   `ENGRAM_STRICT_MONITORING`
    /// - `ENGRAM_RECALL_MAX_MEMORIES`, `ENGRAM_RECALL_CACHE_ENABLED`
    /// - `ENGRAM_SMART_THRESHOLD`, `ENGRAM_ARCHIVE_ENABLED`,
    ///   `ENGRAM_ARCHIVE_RECOVERY_DAYS`
    /// - `ENGRAM_TRACKER_ENABLED`, `ENGRAM_BATCH_INTERVAL_S`,
    ///   `ENGRAM_BATCH_SIZE`, `ENGRAM_STALE_THRESHOLD_DAYS`
    /// - `ENGRAM_DEDUP_EXACT`, `ENGRAM_DEDUP_NEAR`, `ENGRAM_DEDUP_SEMANTIC`
    /// - `ENGRAM_POOL_SIZE`, `ENGRAM_ACQUIRE_TIMEOUT_MS`,
    ///   `ENGRAM_QUEUE_CAPACITY`
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse("ENGRAM_MAX_RECALL_TIME_MS") {
            config.performance.max_recall_time_ms = v;
        }
        if let Some(v) = env_parse("ENGRAM_MAX_GENERATION_TIME_MS") {
            config.performance.max_generation_time_ms = v;
        }
        if let Some(v) = env_parse("ENGRAM_STRICT_MONITORING") {
            config.performance.strict_monitoring = v;
        }

        if let Some(v) = env_parse("ENGRAM_RECALL_MAX_MEMORIES") {
            config.recall.max_memories = v;
        }
        if let Some(v) = env_parse("ENGRAM_RECALL_CACHE_ENABLED") {
            config.recall.cache_enabled = v;
        }

        if let Some(v) = env_parse("ENGRAM_SMART_THRESHOLD") {
            config.retention.smart_threshold = v;
        }
        if let Some(v) = env_parse("ENGRAM_ARCHIVE_ENABLED") {
            config.retention.archive_enabled = v;
        }
        if let Some(v) = env_parse("ENGRAM_ARCHIVE_RECOVERY_DAYS") {
            config.retention.archive_recovery_days = v;
        }

        if let Some(v) = env_parse("ENGRAM_TRACKER_ENABLED") {
            config.analytics.tracker_enabled = v;
        }
        if let Some(v) = env_parse("ENGRAM_BATCH_INTERVAL_S") {
            config.analytics.batch_interval_s = v;
        }
        if let Some(v) = env_parse("ENGRAM_BATCH_SIZE") {
            config.analytics.batch_size = v;
        }
        if let Some(v) = env_parse("ENGRAM_STALE_THRESHOLD_DAYS") {
            config.analytics.stale_threshold_days = v;
        }

        if let Some(v) = env_parse("ENGRAM_DEDUP_EXACT") {
            config.dedup.exact_threshold = v;
        }
        if let Some(v) = env_parse("ENGRAM_DEDUP_NEAR") {
            config.dedup.near_threshold = v;
        }
        if let Some(v) = env_parse("ENGRAM_DEDUP_SEMANTIC") {
            config.dedup.semantic_threshold = v;
        }

        if let Some(v) = env_parse("ENGRAM_POOL_SIZE") {
            config.storage.pool_size = v;
        }
        if let Some(v) = env_parse("ENGRAM_ACQUIRE_TIMEOUT_MS") {
            config.storage.acquire_timeout_ms = v;
        }
        if let Some(v) = env_parse("ENGRAM_QUEUE_CAPACITY") {
            config.storage.queue_capacity = v;
        }

        config
    }

    /// Sets strict performance monitoring.
    #[must_use]
    pub const fn with_strict_monitoring(mut self, strict: bool) -> Self {
        self.performance.strict_monitoring = strict;
        self
    }

    /// Sets the recall-result cache.
    #[must_use]
    pub const fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.recall.cache_enabled = enabled;
        self
    }

    /// Sets the access tracker on or off.
    #[must_use]
    pub const fn with_tracker_enabled(mut self, enabled: bool) -> Self {
        self.analytics.tracker_enabled = enabled;
        self
    }

    /// Sets the smart-prune threshold.
    #[must_use]
    pub const fn with_smart_threshold(mut self, threshold: f64) -> Self {
        self.retention.smart_threshold = threshold;
        self
    }

    /// Sets the tracker flush parameters.
    #[must_use]
    pub const fn with_batching(mut self, interval_s: u64, batch_size: usize) -> Self {
        self.analytics.batch_interval_s = interval_s;
        self.analytics.batch_size = batch_size;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if any value is out of range or the
    /// sections are mutually inconsistent.
    pub fn validate(&self) -> Result<()> {
        fn check_unit(name: &str, value: f64) -> Result<()> {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Configuration(format!(
                    "{name} must be within [0.0, 1.0], got {value}"
                )));
            }
            Ok(())
        }

        if self.performance.max_recall_time_ms == 0 {
            return Err(Error::Configuration(
                "performance.max_recall_time_ms must be positive".to_string(),
            ));
        }
        if self.performance.max_generation_time_ms == 0 {
            return Err(Error::Configuration(
                "performance.max_generation_time_ms must be positive".to_string(),
            ));
        }
        if self.recall.max_memories == 0 {
            return Err(Error::Configuration(
                "recall.max_memories must be positive".to_string(),
            ));
        }

        check_unit("retention.smart_threshold", self.retention.smart_threshold)?;
        check_unit("dedup.exact_threshold", self.dedup.exact_threshold)?;
        check_unit("dedup.near_threshold", self.dedup.near_threshold)?;
        check_unit("dedup.semantic_threshold", self.dedup.semantic_threshold)?;

        if self.dedup.near_threshold > self.dedup.exact_threshold {
            return Err(Error::Configuration(format!(
                "dedup.near_threshold ({}) must not exceed dedup.exact_threshold ({})",
                self.dedup.near_threshold, self.dedup.exact_threshold
            )));
        }
        if self.dedup.semantic_threshold > self.dedup.near_threshold {
            return Err(Error::Configuration(format!(
                "dedup.semantic_threshold ({}) must not exceed dedup.near_threshold ({})",
                self.dedup.semantic_threshold, self.dedup.near_threshold
            )));
        }

        if self.retention.archive_recovery_days <= 0 {
            return Err(Error::Configuration(
                "retention.archive_recovery_days must be positive".to_string(),
            ));
        }
        if self.analytics.batch_size == 0 {
            return Err(Error::Configuration(
                "analytics.batch_size must be positive".to_string(),
            ));
        }
        if self.storage.pool_size == 0 {
            return Err(Error::Configuration(
                "storage.pool_size must be positive".to_string(),
            ));
        }
        if self.storage.queue_capacity == 0 {
            return Err(Error::Configuration(
                "storage.queue_capacity must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
