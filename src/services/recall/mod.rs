//! Recall coordinator — the hot path.
//!
//! Parses the prompt, selects one or more strategies, merges their
//! candidates, ranks by temporal decay mixed with strategy relevance, and
//! returns the top-K inside an enhanced prompt. One failing strategy is
//! logged and skipped; only when every strategy fails does the call fail.

mod strategies;
mod temporal_decay;

pub use strategies::{entity_recall, keyword_recall, parse_time_window, temporal_recall};
pub use temporal_decay::{DecayExplanation, TemporalDecayEngine};

use crate::config::{EngramConfig, RecallConfig};
use crate::models::{Memory, MemoryContext, MemoryFilter, RecallStrategy};
use crate::storage::graph::GraphAdapter;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::instrument;

/// Capacity of the recall-result cache.
const CACHE_CAPACITY: usize = 128;

/// One recall request.
#[derive(Debug, Clone)]
pub struct RecallRequest {
    /// The prompt to find memories for.
    pub prompt: String,
    /// Number of memories to return.
    pub max_memories: usize,
    /// The strategy to run.
    pub strategy: RecallStrategy,
    /// Scoping filters.
    pub filter: MemoryFilter,
    /// When supplied, decay ages memories relative to this instant instead
    /// of absolute now (activity-aware recency).
    pub project_last_activity: Option<DateTime<Utc>>,
}

impl RecallRequest {
    /// Creates a request with default strategy and limits.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_memories: 10,
            strategy: RecallStrategy::Auto,
            filter: MemoryFilter::new(),
            project_last_activity: None,
        }
    }

    /// Sets the strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: RecallStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub const fn with_max_memories(mut self, max_memories: usize) -> Self {
        self.max_memories = max_memories;
        self
    }

    /// Sets the scoping filter.
    #[must_use]
    pub fn with_filter(mut self, filter: MemoryFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Enables activity-aware recency relative to the given instant.
    #[must_use]
    pub const fn with_project_last_activity(mut self, at: DateTime<Utc>) -> Self {
        self.project_last_activity = Some(at);
        self
    }

    fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}|{:?}|{:?}|{:?}|{:?}|{:?}",
            self.prompt,
            self.strategy,
            self.max_memories,
            self.filter.agent_id,
            self.filter.user_id,
            self.filter.session_id,
            self.filter.memory_type,
            self.project_last_activity.map(|t| t.timestamp()),
        )
    }
}

/// The recall coordinator.
pub struct RecallCoordinator {
    adapter: Arc<GraphAdapter>,
    decay: TemporalDecayEngine,
    config: RecallConfig,
    cache: Option<Mutex<LruCache<String, MemoryContext>>>,
}

impl RecallCoordinator {
    /// Creates a coordinator over the given adapter.
    #[must_use]
    pub fn new(adapter: Arc<GraphAdapter>, config: &EngramConfig) -> Self {
        let cache = config.recall.cache_enabled.then(|| {
            let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
            Mutex::new(LruCache::new(capacity))
        });
        Self {
            adapter,
            decay: TemporalDecayEngine::new(),
            config: config.recall.clone(),
            cache,
        }
    }

    /// Returns the decay engine (used by the facade for explanations).
    #[must_use]
    pub const fn decay_engine(&self) -> &TemporalDecayEngine {
        &self.decay
    }

    /// Drops every cached recall result. Called after writes.
    pub fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            if let Ok(mut cache) = cache.lock() {
                cache.clear();
            }
        }
    }

    /// Retrieves the most relevant memories for a prompt and builds the
    /// enhanced prompt around them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for empty prompts or a zero limit, and
    /// [`Error::RecallFailed`] only if every strategy failed.
    #[instrument(skip(self, request), fields(strategy = %request.strategy, max = request.max_memories))]
    pub fn attach_memories(&self, request: &RecallRequest) -> Result<MemoryContext> {
        let start = Instant::now();

        if request.prompt.trim().is_empty() {
            return Err(Error::Validation {
                field: "prompt".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }
        if request.max_memories == 0 {
            return Err(Error::Validation {
                field: "max_memories".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let cache_key = request.cache_key();
        if let Some(cache) = &self.cache {
            if let Ok(mut cache) = cache.lock() {
                if let Some(hit) = cache.get(&cache_key) {
                    metrics::counter!("recall_cache_hits_total").increment(1);
                    return Ok(hit.clone());
                }
            }
        }

        let now = Utc::now();
        let candidates = self.run_strategies(request, now)?;
        let ranked = self.rank(candidates, request, now);

        let confidence = if ranked.is_empty() {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let mean: f64 =
                ranked.iter().map(|(_, score)| *score).sum::<f64>() / ranked.len() as f64;
            mean.clamp(0.0, 1.0)
        };

        let memories: Vec<Memory> = ranked.into_iter().map(|(memory, _)| memory).collect();
        let recall_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        #[allow(clippy::cast_precision_loss)]
        let recall_time_f64 = recall_time_ms as f64;
        metrics::histogram!("recall_duration_ms").record(recall_time_f64);
        tracing::debug!(
            memories = memories.len(),
            recall_time_ms,
            "recall complete"
        );

        let context = MemoryContext::build(
            request.prompt.clone(),
            memories,
            confidence,
            request.strategy,
            recall_time_ms,
        );

        if let Some(cache) = &self.cache {
            if let Ok(mut cache) = cache.lock() {
                cache.put(cache_key, context.clone());
            }
        }

        Ok(context)
    }

    /// Resolves which concrete strategies to run for a request.
    fn plan(&self, request: &RecallRequest) -> Result<Vec<RecallStrategy>> {
        match request.strategy {
            RecallStrategy::Auto => {
                let planned: Vec<RecallStrategy> = [RecallStrategy::Keyword, RecallStrategy::Entity]
                    .into_iter()
                    .filter(|s| self.config.strategy_enabled(*s))
                    .collect();
                if planned.is_empty() {
                    return Err(Error::Configuration(
                        "auto recall needs keyword or entity strategy enabled".to_string(),
                    ));
                }
                Ok(planned)
            },
            strategy if self.config.strategy_enabled(strategy) => Ok(vec![strategy]),
            strategy => Err(Error::Validation {
                field: "strategy".to_string(),
                reason: format!("strategy '{strategy}' is disabled by configuration"),
            }),
        }
    }

    /// Runs the planned strategies (concurrently for more than one) and
    /// merges their candidates, keeping the best relevance per memory.
    fn run_strategies(
        &self,
        request: &RecallRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<(Memory, f64)>> {
        let planned = self.plan(request)?;
        let adapter = &self.adapter;
        let prompt = request.prompt.as_str();
        let filter = &request.filter;
        let limit = request.max_memories;

        let run_one = |strategy: RecallStrategy| -> Result<Vec<(Memory, f64)>> {
            match strategy {
                RecallStrategy::Keyword => keyword_recall(adapter, prompt, filter, now, limit),
                RecallStrategy::Entity => entity_recall(adapter, prompt, filter, now, limit),
                RecallStrategy::Temporal => temporal_recall(adapter, prompt, filter, now, limit),
                RecallStrategy::Auto => unreachable!("auto is expanded by plan()"),
            }
        };

        let run_one = &run_one;
        let outcomes: Vec<(RecallStrategy, Result<Vec<(Memory, f64)>>)> = if planned.len() == 1 {
            vec![(planned[0], run_one(planned[0]))]
        } else {
            std::thread::scope(|scope| {
                let handles: Vec<_> = planned
                    .iter()
                    .map(|&strategy| (strategy, scope.spawn(move || run_one(strategy))))
                    .collect();
                handles
                    .into_iter()
                    .map(|(strategy, handle)| {
                        let outcome = handle.join().unwrap_or_else(|_| {
                            Err(Error::RecallFailed(format!(
                                "strategy '{strategy}' panicked"
                            )))
                        });
                        (strategy, outcome)
                    })
                    .collect()
            })
        };

        let mut merged: HashMap<String, (Memory, f64)> = HashMap::new();
        let mut failures = 0_usize;
        let attempted = outcomes.len();

        for (strategy, outcome) in outcomes {
            match outcome {
                Ok(candidates) => {
                    for (memory, relevance) in candidates {
                        merged
                            .entry(memory.id.as_str().to_string())
                            .and_modify(|(_, best)| *best = best.max(relevance))
                            .or_insert((memory, relevance));
                    }
                },
                Err(err) => {
                    failures += 1;
                    tracing::warn!(strategy = %strategy, error = %err, "recall strategy failed");
                    metrics::counter!("recall_strategy_failures_total", "strategy" => strategy.as_str())
                        .increment(1);
                },
            }
        }

        if failures == attempted {
            return Err(Error::RecallFailed(format!(
                "all {attempted} recall strategies failed"
            )));
        }

        Ok(merged.into_values().collect())
    }

    /// Ranks candidates by effective score, descending, and truncates to
    /// the request's limit.
    fn rank(
        &self,
        candidates: Vec<(Memory, f64)>,
        request: &RecallRequest,
        now: DateTime<Utc>,
    ) -> Vec<(Memory, f64)> {
        let mut scored: Vec<(Memory, f64)> = candidates
            .into_iter()
            .map(|(memory, relevance)| {
                let score = self.decay.effective_score(
                    &memory,
                    now,
                    request.project_last_activity,
                    Some(relevance),
                );
                (memory, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(request.max_memories);
        scored
    }
}
