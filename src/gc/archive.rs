//! Archive management: restore within the recovery window, purge after it.

use crate::models::{Memory, MemoryId};
use crate::storage::graph::GraphAdapter;
use crate::{Error, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

/// Manages archived memories.
pub struct ArchiveManager {
    adapter: Arc<GraphAdapter>,
}

impl ArchiveManager {
    /// Creates a manager over the given adapter.
    #[must_use]
    pub fn new(adapter: Arc<GraphAdapter>) -> Self {
        Self { adapter }
    }

    /// Restores an archived memory as a fresh live memory and removes the
    /// archive entry.
    ///
    /// The restored memory gets a new id; its metadata records where it
    /// came from.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArchiveNotFound`] when the entry does not exist
    /// (never created, or purged after the recovery window).
    #[instrument(skip(self))]
    pub fn restore(&self, archive_id: &str) -> Result<MemoryId> {
        let Some(archived) = self.adapter.get_archive(archive_id)? else {
            return Err(Error::ArchiveNotFound(archive_id.to_string()));
        };

        let now = Utc::now();
        let mut metadata = archived.metadata.clone();
        metadata.insert("restored_from".to_string(), serde_json::json!(archived.id));
        metadata.insert(
            "original_id".to_string(),
            serde_json::json!(archived.original_id.as_str()),
        );
        metadata.insert(
            "prune_score".to_string(),
            serde_json::json!(archived.prune_score),
        );

        let mut memory = Memory::new(archived.content.clone(), archived.memory_type, now)
            .with_source(archived.source_type.clone())
            .with_agent(archived.agent_id.clone())
            .with_importance(archived.importance)
            .with_confidence(archived.confidence)
            .with_metadata(metadata);
        memory.created_at = archived.created_at;
        memory.accessed_at = Some(now);
        if let Some(user_id) = &archived.user_id {
            memory = memory.with_user(user_id.clone());
        }
        if let Some(session_id) = &archived.session_id {
            memory = memory.with_session(session_id.clone());
        }

        self.adapter.insert_memory(&memory, &[])?;
        self.adapter.delete_archive(archive_id)?;

        tracing::info!(
            archive_id,
            restored_id = %memory.id,
            "memory restored from archive"
        );
        metrics::counter!("archives_restored_total").increment(1);
        Ok(memory.id)
    }

    /// Permanently deletes archive entries past their recovery window.
    /// Returns the number purged.
    #[instrument(skip(self))]
    pub fn purge_expired(&self) -> Result<usize> {
        let purged = self.adapter.purge_expired_archives(Utc::now())?;
        if purged > 0 {
            tracing::info!(purged, "expired archives purged");
            metrics::counter!("archives_purged_total").increment(purged as u64);
        }
        Ok(purged)
    }

    /// Lists archive entries, newest first.
    pub fn list(&self, limit: usize) -> Result<Vec<crate::models::ArchivedMemory>> {
        self.adapter.list_archives(limit)
    }
}
