//! Retention management.
//!
//! Smart pruning scores every memory on age, size, access, and importance
//! and archives-then-deletes the low scorers; consolidation clusters old
//! low-access memories and replaces each cluster with one summary. Both run
//! on the caller's thread and honor a cooperative stop flag between batches
//! and between clusters. Archived rows stay restorable for the recovery
//! window.

pub mod archive;
pub mod consolidation;
pub mod pruning;

pub use archive::ArchiveManager;
pub use consolidation::{ConsolidationEngine, ConsolidationResult, MemoryCluster};
pub use pruning::{PruneResult, PruneStrategy, RetentionScore, ScoreBreakdown, SmartPruner};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation for maintenance operations.
///
/// Maintenance checks the flag between work units; partial progress is
/// allowed and resumable, since unfinished candidates simply remain live.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Creates a flag in the "keep running" state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that the operation stop at its next checkpoint.
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once a stop has been requested.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_flag_propagates_between_clones() {
        let flag = StopFlag::new();
        let observer = flag.clone();
        assert!(!observer.should_stop());
        flag.request_stop();
        assert!(observer.should_stop());
    }
}
