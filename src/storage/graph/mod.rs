//! Graph adapter over embedded SQLite.
//!
//! Owns the database handle and the connection pool, creates the schema,
//! and exposes typed operations to the rest of the system. All SQL and all
//! timestamp/metadata serialization live in this module: the adapter is the
//! only component that knows the on-disk format.
//!
//! Backend failures are translated into `DatabaseError{kind}` at this
//! boundary; nothing above it sees a raw driver error.

mod pool;
mod row;
mod schema;

pub use pool::{ConnectionPool, PooledConnection};

use crate::models::{
    ArchivedMemory, ConsolidationEdge, Entity, EntityMention, Memory, MemoryFilter, MemoryId,
    MemoryType,
};
use crate::{DatabaseErrorKind, Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params, params_from_iter};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

use row::timestamp_to_sql;

/// Translates a driver error into a typed database error.
pub(crate) fn translate_error(e: rusqlite::Error) -> Error {
    let kind = match &e {
        rusqlite::Error::SqliteFailure(code, _) => match code.code {
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                DatabaseErrorKind::Locked
            },
            rusqlite::ErrorCode::NotADatabase | rusqlite::ErrorCode::DatabaseCorrupt => {
                DatabaseErrorKind::Corrupted
            },
            _ => DatabaseErrorKind::QueryFailed,
        },
        _ => DatabaseErrorKind::QueryFailed,
    };
    Error::Database {
        kind,
        message: e.to_string(),
    }
}

/// Escapes SQL LIKE wildcards so user tokens match literally.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Memory columns qualified with a table alias for JOIN queries.
fn qualified_memory_columns(alias: &str) -> String {
    schema::MEMORY_COLUMNS
        .split(',')
        .map(|col| format!("{alias}.{}", col.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Appends scoping-filter clauses and their parameter values.
fn push_filter(filter: &MemoryFilter, clauses: &mut Vec<String>, values: &mut Vec<String>) {
    if let Some(agent_id) = &filter.agent_id {
        clauses.push("agent_id = ?".to_string());
        values.push(agent_id.clone());
    }
    if let Some(user_id) = &filter.user_id {
        clauses.push("user_id = ?".to_string());
        values.push(user_id.clone());
    }
    if let Some(session_id) = &filter.session_id {
        clauses.push("session_id = ?".to_string());
        values.push(session_id.clone());
    }
    if let Some(memory_type) = filter.memory_type {
        clauses.push("memory_type = ?".to_string());
        values.push(memory_type.as_str().to_string());
    }
}

/// The graph adapter.
///
/// One adapter owns one database; every query in the process goes through
/// its pool. See the module docs for the boundary rules.
pub struct GraphAdapter {
    pool: ConnectionPool,
    db_path: Option<PathBuf>,
}

impl GraphAdapter {
    /// Opens (creating if needed) the database under `db_dir` and
    /// initializes the schema.
    ///
    /// # Errors
    ///
    /// Returns a `Database` error if the directory cannot be created, a
    /// connection fails to open, or the schema version mismatches.
    pub fn open(db_dir: &Path, pool_size: usize, acquire_timeout: Duration) -> Result<Self> {
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Database {
            kind: DatabaseErrorKind::QueryFailed,
            message: format!("cannot create {}: {e}", db_dir.display()),
        })?;
        let db_path = db_dir.join("memories.db");
        let pool = ConnectionPool::open(&db_path, pool_size, acquire_timeout)?;
        let adapter = Self {
            pool,
            db_path: Some(db_path),
        };
        adapter.initialize()?;
        Ok(adapter)
    }

    /// Opens an in-memory adapter (used by tests).
    ///
    /// # Errors
    ///
    /// Returns a `Database` error if initialization fails.
    pub fn in_memory() -> Result<Self> {
        let pool = ConnectionPool::open_in_memory(2, Duration::from_secs(5))?;
        let adapter = Self {
            pool,
            db_path: None,
        };
        adapter.initialize()?;
        Ok(adapter)
    }

    /// Returns the database file path (`None` for in-memory).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Acquires a pooled connection.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError{kind: PoolExhausted}` on timeout.
    pub fn connection(&self) -> Result<PooledConnection> {
        self.pool.acquire()
    }

    /// Creates the schema if absent and verifies the schema version.
    #[instrument(skip(self))]
    pub fn initialize(&self) -> Result<()> {
        let conn = self.connection()?;

        let version: i64 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .map_err(translate_error)?;

        if version != 0 && version != schema::SCHEMA_VERSION {
            return Err(Error::Database {
                kind: DatabaseErrorKind::SchemaMismatch,
                message: format!(
                    "on-disk schema version {version}, expected {}",
                    schema::SCHEMA_VERSION
                ),
            });
        }

        for ddl in schema::CREATE_TABLES {
            conn.execute(ddl, []).map_err(translate_error)?;
        }
        for ddl in schema::CREATE_INDEXES {
            conn.execute(ddl, []).map_err(translate_error)?;
        }
        conn.pragma_update(None, "user_version", schema::SCHEMA_VERSION)
            .map_err(translate_error)?;

        tracing::debug!("schema initialized");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Memory nodes
    // ------------------------------------------------------------------

    /// Persists a memory and its MENTIONS edges in one transaction.
    #[instrument(skip(self, memory, mentions), fields(memory_id = %memory.id, mentions = mentions.len()))]
    pub fn insert_memory(&self, memory: &Memory, mentions: &[EntityMention]) -> Result<()> {
        let mut conn = self.connection()?;
        let tx = conn.transaction().map_err(translate_error)?;

        let metadata = serde_json::Value::Object(memory.metadata.clone()).to_string();
        tx.execute(
            "INSERT INTO memory (id, content, content_hash, memory_type, importance, confidence, \
             source_type, created_at, valid_from, valid_to, accessed_at, access_count, agent_id, \
             user_id, session_id, metadata) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                memory.id.as_str(),
                memory.content,
                memory.content_hash,
                memory.memory_type.as_str(),
                memory.importance,
                memory.confidence,
                memory.source_type,
                timestamp_to_sql(memory.created_at),
                timestamp_to_sql(memory.valid_from),
                memory.valid_to.map(timestamp_to_sql),
                memory.accessed_at.map(timestamp_to_sql),
                memory.access_count,
                memory.agent_id,
                memory.user_id,
                memory.session_id,
                metadata,
            ],
        )
        .map_err(translate_error)?;

        for mention in mentions {
            tx.execute(
                "INSERT OR IGNORE INTO entity (id, name, entity_type) VALUES (?1, ?2, ?3)",
                params![
                    mention.entity.id,
                    mention.entity.name,
                    mention.entity.entity_type.as_str(),
                ],
            )
            .map_err(translate_error)?;
            tx.execute(
                "INSERT OR REPLACE INTO mentions (memory_id, entity_id, position) \
                 VALUES (?1, ?2, ?3)",
                params![
                    memory.id.as_str(),
                    mention.entity.id,
                    i64::try_from(mention.position).unwrap_or(i64::MAX),
                ],
            )
            .map_err(translate_error)?;
        }

        tx.commit().map_err(translate_error)?;
        metrics::counter!("memories_stored_total").increment(1);
        Ok(())
    }

    /// Fetches a memory by id.
    pub fn get_memory(&self, id: &MemoryId) -> Result<Option<Memory>> {
        let conn = self.connection()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM memory WHERE id = ?1",
                schema::MEMORY_COLUMNS
            ),
            params![id.as_str()],
            row::memory_from_row,
        )
        .optional()
        .map_err(translate_error)
    }

    /// Finds the live memory with the given hash and type, if any.
    ///
    /// This is the exact-duplicate lookup; `(content_hash, memory_type)` is
    /// the deduplication boundary among live memories.
    pub fn find_live_by_hash(
        &self,
        content_hash: &str,
        memory_type: MemoryType,
        now: DateTime<Utc>,
    ) -> Result<Option<Memory>> {
        let conn = self.connection()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM memory \
                 WHERE content_hash = ?1 AND memory_type = ?2 \
                 AND (valid_to IS NULL OR valid_to > ?3) \
                 LIMIT 1",
                schema::MEMORY_COLUMNS
            ),
            params![content_hash, memory_type.as_str(), timestamp_to_sql(now)],
            row::memory_from_row,
        )
        .optional()
        .map_err(translate_error)
    }

    /// Returns up to `limit` live memories of one type, newest first.
    ///
    /// The near/semantic dedup layers run over this candidate set.
    pub fn live_memories_of_type(
        &self,
        memory_type: MemoryType,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT {} FROM memory \
             WHERE memory_type = ?1 AND (valid_to IS NULL OR valid_to > ?2) \
             ORDER BY created_at DESC LIMIT {limit}",
            schema::MEMORY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql).map_err(translate_error)?;
        let rows = stmt
            .query_map(
                params![memory_type.as_str(), timestamp_to_sql(now)],
                row::memory_from_row,
            )
            .map_err(translate_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(translate_error)
    }

    /// Returns the most recently created live memories, optionally scoped.
    pub fn recent_memories(
        &self,
        limit: usize,
        filter: &MemoryFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Memory>> {
        let mut clauses = vec!["(valid_to IS NULL OR valid_to > ?)".to_string()];
        let mut values = vec![timestamp_to_sql(now)];
        push_filter(filter, &mut clauses, &mut values);

        let sql = format!(
            "SELECT {} FROM memory WHERE {} ORDER BY created_at DESC LIMIT {limit}",
            schema::MEMORY_COLUMNS,
            clauses.join(" AND "),
        );

        let conn = self.connection()?;
        let mut stmt = conn.prepare(&sql).map_err(translate_error)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), row::memory_from_row)
            .map_err(translate_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(translate_error)
    }

    /// Returns every memory (live or not). Used by retention scoring.
    pub fn all_memories(&self) -> Result<Vec<Memory>> {
        let conn = self.connection()?;
        let sql = format!("SELECT {} FROM memory", schema::MEMORY_COLUMNS);
        let mut stmt = conn.prepare(&sql).map_err(translate_error)?;
        let rows = stmt
            .query_map([], row::memory_from_row)
            .map_err(translate_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(translate_error)
    }

    /// Deletes memories whose `valid_to` has passed. Returns the count.
    #[instrument(skip(self))]
    pub fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.connection()?;
        let deleted = conn
            .execute(
                "DELETE FROM memory WHERE valid_to IS NOT NULL AND valid_to <= ?1",
                params![timestamp_to_sql(now)],
            )
            .map_err(translate_error)?;
        if deleted > 0 {
            metrics::counter!("memories_expired_total").increment(deleted as u64);
        }
        Ok(deleted)
    }

    /// Deletes memories by id. Returns the number of rows removed.
    pub fn delete_memories(&self, ids: &[MemoryId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM memory WHERE id IN ({placeholders})");
        let conn = self.connection()?;
        conn.execute(
            &sql,
            params_from_iter(ids.iter().map(MemoryId::as_str)),
        )
        .map_err(translate_error)
    }

    /// Refreshes a memory's metadata bag.
    pub fn update_metadata(
        &self,
        id: &MemoryId,
        metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE memory SET metadata = ?2 WHERE id = ?1",
            params![
                id.as_str(),
                serde_json::Value::Object(metadata.clone()).to_string()
            ],
        )
        .map_err(translate_error)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Search operations (the recall strategies)
    // ------------------------------------------------------------------

    /// Finds live memories whose content contains any of `tokens`.
    pub fn search_by_tokens(
        &self,
        tokens: &[String],
        filter: &MemoryFilter,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut clauses = vec!["(valid_to IS NULL OR valid_to > ?)".to_string()];
        let mut values = vec![timestamp_to_sql(now)];

        let token_clause = tokens
            .iter()
            .map(|_| "content LIKE ? ESCAPE '\\'")
            .collect::<Vec<_>>()
            .join(" OR ");
        clauses.push(format!("({token_clause})"));
        values.extend(tokens.iter().map(|t| format!("%{}%", escape_like(t))));

        push_filter(filter, &mut clauses, &mut values);

        let sql = format!(
            "SELECT {} FROM memory WHERE {} ORDER BY created_at DESC LIMIT {limit}",
            schema::MEMORY_COLUMNS,
            clauses.join(" AND "),
        );

        let conn = self.connection()?;
        let mut stmt = conn.prepare(&sql).map_err(translate_error)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), row::memory_from_row)
            .map_err(translate_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(translate_error)
    }

    /// Finds live memories linked to any of the given entities via MENTIONS,
    /// with the count of shared entities per memory, most shared first.
    pub fn memories_mentioning(
        &self,
        entity_ids: &[String],
        filter: &MemoryFilter,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(Memory, u32)>> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; entity_ids.len()].join(", ");
        let mut clauses = vec![
            format!("mm.entity_id IN ({placeholders})"),
            "(m.valid_to IS NULL OR m.valid_to > ?)".to_string(),
        ];
        let mut values: Vec<String> = entity_ids.to_vec();
        values.push(timestamp_to_sql(now));

        let mut filter_clauses = Vec::new();
        push_filter(filter, &mut filter_clauses, &mut values);
        clauses.extend(filter_clauses.into_iter().map(|c| format!("m.{c}")));

        let sql = format!(
            "SELECT {}, COUNT(mm.entity_id) AS shared \
             FROM memory m JOIN mentions mm ON mm.memory_id = m.id \
             WHERE {} \
             GROUP BY m.id \
             ORDER BY shared DESC, m.created_at DESC \
             LIMIT {limit}",
            qualified_memory_columns("m"),
            clauses.join(" AND "),
        );

        let conn = self.connection()?;
        let mut stmt = conn.prepare(&sql).map_err(translate_error)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |r| {
                Ok((row::memory_from_row(r)?, r.get::<_, u32>(16)?))
            })
            .map_err(translate_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(translate_error)
    }

    /// Finds live memories created inside a time window, newest first.
    pub fn memories_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        filter: &MemoryFilter,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        let mut clauses = vec![
            "created_at >= ?".to_string(),
            "created_at <= ?".to_string(),
            "(valid_to IS NULL OR valid_to > ?)".to_string(),
        ];
        let mut values = vec![
            timestamp_to_sql(from),
            timestamp_to_sql(to),
            timestamp_to_sql(now),
        ];
        push_filter(filter, &mut clauses, &mut values);

        let sql = format!(
            "SELECT {} FROM memory WHERE {} ORDER BY created_at DESC LIMIT {limit}",
            schema::MEMORY_COLUMNS,
            clauses.join(" AND "),
        );

        let conn = self.connection()?;
        let mut stmt = conn.prepare(&sql).map_err(translate_error)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), row::memory_from_row)
            .map_err(translate_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(translate_error)
    }

    /// Returns the entities a memory mentions.
    pub fn entities_of(&self, memory_id: &MemoryId) -> Result<Vec<Entity>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT e.id, e.name, e.entity_type FROM entity e \
                 JOIN mentions mm ON mm.entity_id = e.id WHERE mm.memory_id = ?1 \
                 ORDER BY mm.position",
            )
            .map_err(translate_error)?;
        let rows = stmt
            .query_map(params![memory_id.as_str()], |r| {
                let entity_type: String = r.get(2)?;
                Ok(Entity {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    entity_type: crate::models::EntityType::parse(&entity_type)
                        .unwrap_or(crate::models::EntityType::Other),
                })
            })
            .map_err(translate_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(translate_error)
    }

    // ------------------------------------------------------------------
    // Access tracking
    // ------------------------------------------------------------------

    /// Applies a merged batch of access events in one transaction:
    /// `access_count += increment`, `accessed_at = latest`.
    #[instrument(skip(self, updates), fields(batch = updates.len()))]
    pub fn update_access_batch(
        &self,
        updates: &[(MemoryId, DateTime<Utc>, u32)],
    ) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection()?;
        let tx = conn.transaction().map_err(translate_error)?;
        {
            let mut stmt = tx
                .prepare(
                    "UPDATE memory SET access_count = access_count + ?2, accessed_at = ?3 \
                     WHERE id = ?1",
                )
                .map_err(translate_error)?;
            for (id, timestamp, increment) in updates {
                stmt.execute(params![id.as_str(), increment, timestamp_to_sql(*timestamp)])
                    .map_err(translate_error)?;
            }
        }
        tx.commit().map_err(translate_error)?;
        metrics::counter!("access_batches_total").increment(1);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Consolidation and associative edges
    // ------------------------------------------------------------------

    /// Records a CONSOLIDATED_INTO edge.
    pub fn add_consolidated_edge(&self, edge: &ConsolidationEdge) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT OR IGNORE INTO consolidated_into \
             (original_id, summary_id, consolidation_date, cluster_id, similarity_score) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                edge.original_id.as_str(),
                edge.summary_id.as_str(),
                timestamp_to_sql(edge.consolidation_date),
                edge.cluster_id,
                edge.similarity_score,
            ],
        )
        .map_err(translate_error)?;
        Ok(())
    }

    /// Returns the CONSOLIDATED_INTO edges pointing at a summary.
    pub fn edges_into_summary(&self, summary_id: &MemoryId) -> Result<Vec<ConsolidationEdge>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT original_id, summary_id, consolidation_date, cluster_id, \
                 similarity_score FROM consolidated_into WHERE summary_id = ?1",
            )
            .map_err(translate_error)?;
        let rows = stmt
            .query_map(params![summary_id.as_str()], |r| {
                let date: String = r.get(2)?;
                Ok(ConsolidationEdge {
                    original_id: MemoryId::new(r.get::<_, String>(0)?),
                    summary_id: MemoryId::new(r.get::<_, String>(1)?),
                    consolidation_date: DateTime::parse_from_rfc3339(&date)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                2,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?,
                    cluster_id: r.get(3)?,
                    similarity_score: r.get(4)?,
                })
            })
            .map_err(translate_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(translate_error)
    }

    /// Records a RELATED_TO associative edge between two memories.
    pub fn add_related(&self, from: &MemoryId, to: &MemoryId) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT OR IGNORE INTO related_to (from_id, to_id) VALUES (?1, ?2)",
            params![from.as_str(), to.as_str()],
        )
        .map_err(translate_error)?;
        Ok(())
    }

    /// Returns ids related to the given memory (outgoing RELATED_TO edges).
    pub fn related_ids(&self, id: &MemoryId) -> Result<Vec<MemoryId>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare("SELECT to_id FROM related_to WHERE from_id = ?1")
            .map_err(translate_error)?;
        let rows = stmt
            .query_map(params![id.as_str()], |r| {
                Ok(MemoryId::new(r.get::<_, String>(0)?))
            })
            .map_err(translate_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(translate_error)
    }

    /// Returns live consolidation candidates: eligible types, created before
    /// `cutoff`, at most `max_access_count` accesses, excluding prior
    /// summaries. Oldest first.
    pub fn consolidation_candidates(
        &self,
        cutoff: DateTime<Utc>,
        max_access_count: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Memory>> {
        let eligible: Vec<String> = MemoryType::all()
            .into_iter()
            .filter(|t| t.consolidation_eligible())
            .map(|t| format!("'{}'", t.as_str()))
            .collect();

        let sql = format!(
            "SELECT {} FROM memory \
             WHERE memory_type IN ({}) \
             AND created_at < ?1 \
             AND access_count <= {max_access_count} \
             AND (valid_to IS NULL OR valid_to > ?2) \
             AND source_type != 'consolidation' \
             ORDER BY created_at ASC",
            schema::MEMORY_COLUMNS,
            eligible.join(", "),
        );

        let conn = self.connection()?;
        let mut stmt = conn.prepare(&sql).map_err(translate_error)?;
        let rows = stmt
            .query_map(
                params![timestamp_to_sql(cutoff), timestamp_to_sql(now)],
                row::memory_from_row,
            )
            .map_err(translate_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(translate_error)
    }

    // ------------------------------------------------------------------
    // Archive
    // ------------------------------------------------------------------

    /// Writes an archive entry. Archival is write-once per original: an
    /// existing entry for the same original is left untouched and `false`
    /// is returned.
    pub fn insert_archive(&self, archived: &ArchivedMemory) -> Result<bool> {
        let conn = self.connection()?;
        let metadata = serde_json::Value::Object(archived.metadata.clone()).to_string();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO archived_memory \
                 (id, original_id, content, memory_type, source_type, importance, confidence, \
                  agent_id, user_id, session_id, created_at, archived_at, prune_score, \
                  prune_reason, expires_at, metadata) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    archived.id,
                    archived.original_id.as_str(),
                    archived.content,
                    archived.memory_type.as_str(),
                    archived.source_type,
                    archived.importance,
                    archived.confidence,
                    archived.agent_id,
                    archived.user_id,
                    archived.session_id,
                    timestamp_to_sql(archived.created_at),
                    timestamp_to_sql(archived.archived_at),
                    archived.prune_score,
                    archived.prune_reason,
                    timestamp_to_sql(archived.expires_at),
                    metadata,
                ],
            )
            .map_err(translate_error)?;
        Ok(inserted > 0)
    }

    /// Fetches an archive entry by id.
    pub fn get_archive(&self, archive_id: &str) -> Result<Option<ArchivedMemory>> {
        let conn = self.connection()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM archived_memory WHERE id = ?1",
                schema::ARCHIVE_COLUMNS
            ),
            params![archive_id],
            row::archive_from_row,
        )
        .optional()
        .map_err(translate_error)
    }

    /// Deletes an archive entry. Returns `true` if it existed.
    pub fn delete_archive(&self, archive_id: &str) -> Result<bool> {
        let conn = self.connection()?;
        let deleted = conn
            .execute(
                "DELETE FROM archived_memory WHERE id = ?1",
                params![archive_id],
            )
            .map_err(translate_error)?;
        Ok(deleted > 0)
    }

    /// Deletes archive entries past their recovery window. Returns the count.
    pub fn purge_expired_archives(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM archived_memory WHERE expires_at <= ?1",
            params![timestamp_to_sql(now)],
        )
        .map_err(translate_error)
    }

    /// Lists archive entries, newest first.
    pub fn list_archives(&self, limit: usize) -> Result<Vec<ArchivedMemory>> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT {} FROM archived_memory ORDER BY archived_at DESC LIMIT {limit}",
            schema::ARCHIVE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql).map_err(translate_error)?;
        let rows = stmt
            .query_map([], row::archive_from_row)
            .map_err(translate_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(translate_error)
    }

    // ------------------------------------------------------------------
    // Statistics and backup
    // ------------------------------------------------------------------

    /// Counts live memories per type.
    pub fn counts_by_type(&self, now: DateTime<Utc>) -> Result<HashMap<String, u64>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT memory_type, COUNT(*) FROM memory \
                 WHERE valid_to IS NULL OR valid_to > ?1 GROUP BY memory_type",
            )
            .map_err(translate_error)?;
        let rows = stmt
            .query_map(params![timestamp_to_sql(now)], |r| {
                let count: i64 = r.get(1)?;
                Ok((r.get::<_, String>(0)?, count.max(0).unsigned_abs()))
            })
            .map_err(translate_error)?;
        rows.collect::<rusqlite::Result<HashMap<_, _>>>()
            .map_err(translate_error)
    }

    /// Total number of memory rows (live or not).
    pub fn count_memories(&self) -> Result<u64> {
        let conn = self.connection()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM memory", [], |r| r.get(0))
            .map_err(translate_error)?;
        Ok(count.max(0).unsigned_abs())
    }

    /// Writes a consistent snapshot of the database next to the original,
    /// named `<dbname>_backup_<strategy>_<YYYYMMDD_HHMMSS>`.
    ///
    /// # Errors
    ///
    /// Returns a `Database` error for in-memory databases or on I/O failure.
    #[instrument(skip(self))]
    pub fn snapshot(&self, strategy: &str, now: DateTime<Utc>) -> Result<PathBuf> {
        let Some(db_path) = &self.db_path else {
            return Err(Error::Database {
                kind: DatabaseErrorKind::QueryFailed,
                message: "cannot snapshot an in-memory database".to_string(),
            });
        };

        let file_name = db_path
            .file_name()
            .map_or_else(|| "memories.db".to_string(), |n| n.to_string_lossy().into_owned());
        let backup_name = format!(
            "{file_name}_backup_{strategy}_{}",
            now.format("%Y%m%d_%H%M%S")
        );
        let backup_path = db_path.with_file_name(backup_name);

        let conn = self.connection()?;
        conn.execute(
            "VACUUM INTO ?1",
            params![backup_path.to_string_lossy().into_owned()],
        )
        .map_err(translate_error)?;

        tracing::info!(backup = %backup_path.display(), "database snapshot written");
        Ok(backup_path)
    }
}
