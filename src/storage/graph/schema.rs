//! Graph schema DDL.
//!
//! Node tables (`memory`, `archived_memory`, `entity`) and edge tables
//! (`mentions`, `consolidated_into`, `related_to`) with the indexes the hot
//! path depends on. Timestamps are stored as RFC 3339 UTC strings, which
//! sort and compare lexicographically.

/// Current schema version, recorded in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// Node table: memories.
pub const CREATE_MEMORY: &str = "CREATE TABLE IF NOT EXISTS memory (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    memory_type TEXT NOT NULL,
    importance REAL NOT NULL DEFAULT 0.5,
    confidence REAL NOT NULL DEFAULT 1.0,
    source_type TEXT NOT NULL DEFAULT 'api',
    created_at TEXT NOT NULL,
    valid_from TEXT NOT NULL,
    valid_to TEXT,
    accessed_at TEXT,
    access_count INTEGER NOT NULL DEFAULT 0,
    agent_id TEXT NOT NULL DEFAULT 'default',
    user_id TEXT,
    session_id TEXT,
    metadata TEXT NOT NULL DEFAULT '{}'
)";

/// Node table: archived memories (the recovery window).
pub const CREATE_ARCHIVED_MEMORY: &str = "CREATE TABLE IF NOT EXISTS archived_memory (
    id TEXT PRIMARY KEY,
    original_id TEXT NOT NULL UNIQUE,
    content TEXT NOT NULL,
    memory_type TEXT NOT NULL,
    source_type TEXT NOT NULL,
    importance REAL NOT NULL,
    confidence REAL NOT NULL,
    agent_id TEXT NOT NULL,
    user_id TEXT,
    session_id TEXT,
    created_at TEXT NOT NULL,
    archived_at TEXT NOT NULL,
    prune_score REAL NOT NULL,
    prune_reason TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}'
)";

/// Node table: entities mentioned by memories.
pub const CREATE_ENTITY: &str = "CREATE TABLE IF NOT EXISTS entity (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    entity_type TEXT NOT NULL
)";

/// Edge table: (memory) -[MENTIONS]-> (entity), with the mention position.
pub const CREATE_MENTIONS: &str = "CREATE TABLE IF NOT EXISTS mentions (
    memory_id TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    position INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (memory_id, entity_id),
    FOREIGN KEY (memory_id) REFERENCES memory(id) ON DELETE CASCADE,
    FOREIGN KEY (entity_id) REFERENCES entity(id) ON DELETE CASCADE
)";

/// Edge table: (original) -[CONSOLIDATED_INTO]-> (summary).
///
/// The summary side is not a foreign key on purpose: originals are deleted
/// after archival while their lineage edges must survive.
pub const CREATE_CONSOLIDATED_INTO: &str = "CREATE TABLE IF NOT EXISTS consolidated_into (
    original_id TEXT NOT NULL,
    summary_id TEXT NOT NULL,
    consolidation_date TEXT NOT NULL,
    cluster_id TEXT NOT NULL,
    similarity_score REAL NOT NULL,
    PRIMARY KEY (original_id, summary_id)
)";

/// Edge table: optional associative link between memories.
pub const CREATE_RELATED_TO: &str = "CREATE TABLE IF NOT EXISTS related_to (
    from_id TEXT NOT NULL,
    to_id TEXT NOT NULL,
    PRIMARY KEY (from_id, to_id)
)";

/// Index statements. `IF NOT EXISTS` keeps initialization idempotent.
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_memory_hash ON memory(content_hash, memory_type)",
    "CREATE INDEX IF NOT EXISTS idx_memory_created ON memory(created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_memory_valid_to ON memory(valid_to)",
    "CREATE INDEX IF NOT EXISTS idx_memory_type ON memory(memory_type)",
    "CREATE INDEX IF NOT EXISTS idx_mentions_entity ON mentions(entity_id)",
    "CREATE INDEX IF NOT EXISTS idx_mentions_memory ON mentions(memory_id)",
    "CREATE INDEX IF NOT EXISTS idx_consolidated_summary ON consolidated_into(summary_id)",
    "CREATE INDEX IF NOT EXISTS idx_archive_original ON archived_memory(original_id)",
    "CREATE INDEX IF NOT EXISTS idx_archive_expires ON archived_memory(expires_at)",
];

/// All table DDL, in dependency order.
pub const CREATE_TABLES: &[&str] = &[
    CREATE_MEMORY,
    CREATE_ARCHIVED_MEMORY,
    CREATE_ENTITY,
    CREATE_MENTIONS,
    CREATE_CONSOLIDATED_INTO,
    CREATE_RELATED_TO,
];

/// Shared column list for memory SELECTs; must match
/// [`super::row::memory_from_row`].
pub const MEMORY_COLUMNS: &str = "id, content, content_hash, memory_type, importance, \
     confidence, source_type, created_at, valid_from, valid_to, accessed_at, access_count, \
     agent_id, user_id, session_id, metadata";

/// Shared column list for archive SELECTs; must match
/// [`super::row::archive_from_row`].
pub const ARCHIVE_COLUMNS: &str = "id, original_id, content, memory_type, source_type, \
     importance, confidence, agent_id, user_id, session_id, created_at, archived_at, \
     prune_score, prune_reason, expires_at, metadata";
