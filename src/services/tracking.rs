//! Non-blocking access tracking with batched writes.
//!
//! Recall reports which memories it returned; this module turns those
//! reports into `access_count`/`accessed_at` updates without ever blocking
//! the hot path. Events land in a bounded in-process queue (drop-oldest
//! with a counter when full) and a dedicated worker thread merges them per
//! memory id, flushing one bulk update when either the interval elapses or
//! the pending batch is large enough.
//!
//! One tracker is owned by one `Engram` instance; the worker drains and
//! flushes on drop. Flush failures are logged and retried on the next
//! tick — events are never lost silently.

use crate::config::AnalyticsConfig;
use crate::models::MemoryId;
use crate::storage::graph::GraphAdapter;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Worker poll interval while the queue is idle.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One access event.
#[derive(Debug, Clone)]
pub struct AccessEvent {
    /// The accessed memory.
    pub memory_id: MemoryId,
    /// When the access happened.
    pub timestamp: DateTime<Utc>,
    /// Where the access came from (`recall`, `enhance`, …).
    pub context: &'static str,
    /// How many accesses this event represents.
    pub count: u32,
}

/// Tracker counters, readable at any time.
#[derive(Debug, Clone, Default)]
pub struct TrackerStats {
    /// Events accepted by `track`/`track_batch`.
    pub total_tracked: u64,
    /// Batches flushed to storage.
    pub total_batches: u64,
    /// Individual merged updates written.
    pub total_flushed: u64,
    /// Events discarded because the queue was full.
    pub dropped_events: u64,
    /// Wall-clock time of the last successful flush.
    pub last_flush_at: Option<DateTime<Utc>>,
    /// Events currently queued.
    pub queue_depth: usize,
}

struct TrackerState {
    queue: VecDeque<AccessEvent>,
    shutdown: bool,
}

struct TrackerShared {
    state: Mutex<TrackerState>,
    signal: Condvar,
    capacity: usize,
    total_tracked: AtomicU64,
    total_batches: AtomicU64,
    total_flushed: AtomicU64,
    dropped_events: AtomicU64,
    last_flush: Mutex<Option<DateTime<Utc>>>,
}

fn lock_state(shared: &TrackerShared) -> MutexGuard<'_, TrackerState> {
    match shared.state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("access tracker mutex was poisoned, recovering");
            poisoned.into_inner()
        },
    }
}

/// The access tracker.
///
/// `track` and `track_batch` are O(1) and never block on the database;
/// the worker thread does all the writing.
pub struct AccessTracker {
    shared: Arc<TrackerShared>,
    worker: Option<JoinHandle<()>>,
}

impl AccessTracker {
    /// Starts a tracker (and its worker thread) over the given adapter.
    ///
    /// With `analytics.tracker_enabled = false` no worker is spawned and
    /// tracking calls are no-ops.
    #[must_use]
    pub fn start(
        adapter: Arc<GraphAdapter>,
        config: &AnalyticsConfig,
        queue_capacity: usize,
    ) -> Self {
        let shared = Arc::new(TrackerShared {
            state: Mutex::new(TrackerState {
                queue: VecDeque::new(),
                shutdown: false,
            }),
            signal: Condvar::new(),
            capacity: queue_capacity.max(1),
            total_tracked: AtomicU64::new(0),
            total_batches: AtomicU64::new(0),
            total_flushed: AtomicU64::new(0),
            dropped_events: AtomicU64::new(0),
            last_flush: Mutex::new(None),
        });

        let worker = config.tracker_enabled.then(|| {
            let worker_shared = Arc::clone(&shared);
            let interval = Duration::from_secs(config.batch_interval_s.max(1));
            let batch_size = config.batch_size.max(1);
            std::thread::Builder::new()
                .name("engram-access-tracker".to_string())
                .spawn(move || worker_loop(&worker_shared, &adapter, interval, batch_size))
                .map_err(|e| {
                    tracing::warn!(error = %e, "failed to spawn access tracker worker");
                })
                .ok()
        });

        Self {
            shared,
            worker: worker.flatten(),
        }
    }

    /// Returns `true` if a worker thread is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Records one memory access. Non-blocking.
    pub fn track(&self, memory_id: &MemoryId, context: &'static str) {
        if self.worker.is_none() {
            return;
        }
        self.push(AccessEvent {
            memory_id: memory_id.clone(),
            timestamp: Utc::now(),
            context,
            count: 1,
        });
    }

    /// Records a batch of memory accesses with one timestamp. Non-blocking.
    pub fn track_batch(&self, memory_ids: &[MemoryId], context: &'static str) {
        if self.worker.is_none() || memory_ids.is_empty() {
            return;
        }
        let timestamp = Utc::now();
        for memory_id in memory_ids {
            self.push(AccessEvent {
                memory_id: memory_id.clone(),
                timestamp,
                context,
                count: 1,
            });
        }
    }

    fn push(&self, event: AccessEvent) {
        {
            let mut state = lock_state(&self.shared);
            if state.queue.len() >= self.shared.capacity {
                // Drop-oldest keeps recall non-blocking under pressure
                state.queue.pop_front();
                self.shared.dropped_events.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("access_events_dropped_total").increment(1);
            }
            state.queue.push_back(event);
        }
        self.shared.total_tracked.fetch_add(1, Ordering::Relaxed);
        self.shared.signal.notify_one();
    }

    /// Returns current tracker counters.
    #[must_use]
    pub fn stats(&self) -> TrackerStats {
        let queue_depth = lock_state(&self.shared).queue.len();
        let last_flush_at = self
            .shared
            .last_flush
            .lock()
            .map(|guard| *guard)
            .unwrap_or(None);
        TrackerStats {
            total_tracked: self.shared.total_tracked.load(Ordering::Relaxed),
            total_batches: self.shared.total_batches.load(Ordering::Relaxed),
            total_flushed: self.shared.total_flushed.load(Ordering::Relaxed),
            dropped_events: self.shared.dropped_events.load(Ordering::Relaxed),
            last_flush_at,
            queue_depth,
        }
    }
}

impl Drop for AccessTracker {
    fn drop(&mut self) {
        {
            let mut state = lock_state(&self.shared);
            state.shutdown = true;
        }
        self.shared.signal.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("access tracker worker panicked during shutdown");
            }
        }
    }
}

/// The worker loop: drain, merge, flush.
fn worker_loop(
    shared: &TrackerShared,
    adapter: &GraphAdapter,
    interval: Duration,
    batch_size: usize,
) {
    let mut pending: HashMap<MemoryId, (DateTime<Utc>, u32)> = HashMap::new();
    let mut last_flush = Instant::now();

    loop {
        let (drained, shutdown) = {
            let mut state = lock_state(shared);
            if state.queue.is_empty() && !state.shutdown {
                state = match shared.signal.wait_timeout(state, POLL_INTERVAL) {
                    Ok((guard, _)) => guard,
                    Err(poisoned) => {
                        tracing::warn!("access tracker condvar recovered from poison");
                        poisoned.into_inner().0
                    },
                };
            }
            let drained: Vec<AccessEvent> = state.queue.drain(..).collect();
            (drained, state.shutdown)
        };

        // Merge per memory id: sum counts, keep the latest timestamp
        for event in drained {
            pending
                .entry(event.memory_id)
                .and_modify(|(timestamp, count)| {
                    *timestamp = (*timestamp).max(event.timestamp);
                    *count = count.saturating_add(event.count);
                })
                .or_insert((event.timestamp, event.count));
        }

        let due = last_flush.elapsed() >= interval || pending.len() >= batch_size || shutdown;
        if due && !pending.is_empty() {
            let updates: Vec<(MemoryId, DateTime<Utc>, u32)> = pending
                .iter()
                .map(|(id, (timestamp, count))| (id.clone(), *timestamp, *count))
                .collect();

            match adapter.update_access_batch(&updates) {
                Ok(()) => {
                    shared.total_batches.fetch_add(1, Ordering::Relaxed);
                    shared
                        .total_flushed
                        .fetch_add(updates.len() as u64, Ordering::Relaxed);
                    if let Ok(mut last) = shared.last_flush.lock() {
                        *last = Some(Utc::now());
                    }
                    tracing::debug!(updates = updates.len(), "access batch flushed");
                    pending.clear();
                    last_flush = Instant::now();
                },
                Err(err) if shutdown => {
                    // Shutdown must terminate; dropping here is loud, not silent
                    tracing::error!(
                        error = %err,
                        updates = updates.len(),
                        "dropping unflushed access events at shutdown"
                    );
                    metrics::counter!("access_flush_failures_total").increment(1);
                    pending.clear();
                },
                Err(err) => {
                    // Keep the batch; retry on the next tick
                    tracing::warn!(error = %err, "access batch flush failed, will retry");
                    metrics::counter!("access_flush_failures_total").increment(1);
                    last_flush = Instant::now();
                },
            }
        }

        if shutdown && pending.is_empty() {
            let queue_empty = lock_state(shared).queue.is_empty();
            if queue_empty {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Memory, MemoryType};

    fn tracked_setup(interval_s: u64, batch_size: usize) -> (Arc<GraphAdapter>, AccessTracker, Memory) {
        let adapter = Arc::new(GraphAdapter::in_memory().unwrap());
        let memory = Memory::new("tracked memory", MemoryType::Semantic, Utc::now());
        adapter.insert_memory(&memory, &[]).unwrap();

        let config = AnalyticsConfig {
            tracker_enabled: true,
            batch_interval_s: interval_s,
            batch_size,
            stale_threshold_days: 90,
        };
        let tracker = AccessTracker::start(Arc::clone(&adapter), &config, 1000);
        (adapter, tracker, memory)
    }

    #[test]
    fn test_track_is_nonblocking_and_flushes_on_interval() {
        let (adapter, tracker, memory) = tracked_setup(1, 10_000);

        for _ in 0..150 {
            tracker.track(&memory.id, "recall");
        }

        // Worker merges per id: one flush carries the whole count
        std::thread::sleep(Duration::from_millis(2000));

        let loaded = adapter.get_memory(&memory.id).unwrap().unwrap();
        assert_eq!(loaded.access_count, 150);
        assert!(loaded.accessed_at.is_some());

        let stats = tracker.stats();
        assert_eq!(stats.total_tracked, 150);
        assert_eq!(stats.total_batches, 1);
        assert_eq!(stats.total_flushed, 1);
    }

    #[test]
    fn test_flush_on_batch_size() {
        let adapter = Arc::new(GraphAdapter::in_memory().unwrap());
        let memories: Vec<Memory> = (0..5)
            .map(|i| {
                let memory = Memory::new(format!("memory {i}"), MemoryType::Semantic, Utc::now());
                adapter.insert_memory(&memory, &[]).unwrap();
                memory
            })
            .collect();

        let config = AnalyticsConfig {
            tracker_enabled: true,
            batch_interval_s: 3600, // interval never fires in this test
            batch_size: 5,
            stale_threshold_days: 90,
        };
        let tracker = AccessTracker::start(Arc::clone(&adapter), &config, 1000);

        let ids: Vec<MemoryId> = memories.iter().map(|m| m.id.clone()).collect();
        tracker.track_batch(&ids, "enhance");

        // Five distinct pending ids reach batch_size and force a flush
        std::thread::sleep(Duration::from_millis(500));

        for memory in &memories {
            let loaded = adapter.get_memory(&memory.id).unwrap().unwrap();
            assert_eq!(loaded.access_count, 1);
        }
    }

    #[test]
    fn test_drop_drains_and_flushes() {
        let (adapter, tracker, memory) = tracked_setup(3600, 10_000);

        for _ in 0..7 {
            tracker.track(&memory.id, "recall");
        }
        drop(tracker);

        let loaded = adapter.get_memory(&memory.id).unwrap().unwrap();
        assert_eq!(loaded.access_count, 7);
    }

    #[test]
    fn test_disabled_tracker_is_a_noop() {
        let adapter = Arc::new(GraphAdapter::in_memory().unwrap());
        let memory = Memory::new("untracked", MemoryType::Semantic, Utc::now());
        adapter.insert_memory(&memory, &[]).unwrap();

        let config = AnalyticsConfig {
            tracker_enabled: false,
            ..AnalyticsConfig::default()
        };
        let tracker = AccessTracker::start(Arc::clone(&adapter), &config, 1000);
        assert!(!tracker.is_running());

        tracker.track(&memory.id, "recall");
        drop(tracker);

        let loaded = adapter.get_memory(&memory.id).unwrap().unwrap();
        assert_eq!(loaded.access_count, 0);
    }

    #[test]
    fn test_queue_overflow_drops_oldest_with_counter() {
        let adapter = Arc::new(GraphAdapter::in_memory().unwrap());
        let memory = Memory::new("pressured", MemoryType::Semantic, Utc::now());
        adapter.insert_memory(&memory, &[]).unwrap();

        // Disabled worker so the queue only fills
        let config = AnalyticsConfig {
            tracker_enabled: true,
            batch_interval_s: 3600,
            batch_size: 1_000_000,
            stale_threshold_days: 90,
        };
        let tracker = AccessTracker::start(Arc::clone(&adapter), &config, 10);

        // Saturate well past capacity before the worker can drain much
        for _ in 0..500 {
            tracker.track(&memory.id, "recall");
        }

        let stats = tracker.stats();
        assert_eq!(stats.total_tracked, 500);
        // Either the worker drained some or the drop counter accounts for
        // the overflow; the queue itself never exceeds capacity
        assert!(stats.queue_depth <= 10);
    }
}
