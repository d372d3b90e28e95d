//! Archived memory entries.
//!
//! Pruning and consolidation archive memories before deleting them. An
//! archive entry is the recovery copy: it carries enough of the original to
//! restore a live memory, plus provenance about why it was pruned. Entries
//! expire after the recovery window and are then purged for good.

use super::{MemoryId, MemoryType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A soft-deleted memory retained for the recovery window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedMemory {
    /// Archive entry identifier.
    pub id: String,
    /// Id of the memory this entry was archived from. Write-once: at most
    /// one archive entry exists per original.
    pub original_id: MemoryId,
    /// The original content.
    pub content: String,
    /// The original memory type.
    pub memory_type: MemoryType,
    /// The original provenance tag.
    pub source_type: String,
    /// The original importance.
    pub importance: f64,
    /// The original confidence.
    pub confidence: f64,
    /// The original agent scope.
    pub agent_id: String,
    /// The original user scope.
    pub user_id: Option<String>,
    /// The original session scope.
    pub session_id: Option<String>,
    /// The original creation timestamp.
    pub created_at: DateTime<Utc>,
    /// When the archive entry was written.
    pub archived_at: DateTime<Utc>,
    /// Retention score at prune time (or cluster similarity at
    /// consolidation time).
    pub prune_score: f64,
    /// Human-readable reason the memory was archived.
    pub prune_reason: String,
    /// End of the recovery window; purge removes the entry after this.
    pub expires_at: DateTime<Utc>,
    /// The original metadata bag.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ArchivedMemory {
    /// Builds an archive entry from a memory.
    #[must_use]
    pub fn from_memory(
        memory: &super::Memory,
        prune_score: f64,
        prune_reason: impl Into<String>,
        archived_at: DateTime<Utc>,
        recovery_days: i64,
    ) -> Self {
        Self {
            id: format!("archive-{}", uuid::Uuid::new_v4()),
            original_id: memory.id.clone(),
            content: memory.content.clone(),
            memory_type: memory.memory_type,
            source_type: memory.source_type.clone(),
            importance: memory.importance,
            confidence: memory.confidence,
            agent_id: memory.agent_id.clone(),
            user_id: memory.user_id.clone(),
            session_id: memory.session_id.clone(),
            created_at: memory.created_at,
            archived_at,
            prune_score,
            prune_reason: prune_reason.into(),
            expires_at: archived_at + chrono::Duration::days(recovery_days),
            metadata: memory.metadata.clone(),
        }
    }

    /// Returns `true` if the recovery window has passed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Memory;
    use chrono::Duration;

    #[test]
    fn test_from_memory_sets_recovery_window() {
        let now = Utc::now();
        let memory = Memory::new("old fact", MemoryType::Episodic, now - Duration::days(100));
        let archived = ArchivedMemory::from_memory(&memory, 0.12, "low retention score", now, 30);

        assert_eq!(archived.original_id, memory.id);
        assert_eq!(archived.expires_at, now + Duration::days(30));
        assert!(!archived.is_expired(now));
        assert!(archived.is_expired(now + Duration::days(31)));
    }
}
