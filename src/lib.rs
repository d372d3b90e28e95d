//! # Engram
//!
//! An embedded, graph-backed memory store for AI coding assistants.
//!
//! Engram gives an agent persistent, project-scoped memory of facts,
//! decisions, preferences, and interaction history, then returns the most
//! relevant of those memories when enhancing a prompt.
//!
//! ## Features
//!
//! - Typed memories with content-addressed deduplication
//! - Multi-strategy recall (keyword, entity, temporal, auto) with
//!   temporal decay ranking
//! - Pattern-driven memory extraction from free-form text
//! - Non-blocking access tracking with batched writes
//! - Smart pruning and consolidation with archive-and-recovery
//!
//! ## Example
//!
//! ```rust,ignore
//! use engram::{Engram, GenerateOptions, RecallOptions};
//!
//! let engram = Engram::open("/path/to/project", None)?;
//! engram.generate_memories("My name is Sarah. I prefer Rust.", &GenerateOptions::default())?;
//! let context = engram.attach_memories("What do I prefer?", &RecallOptions::default())?;
//! println!("{}", context.enhanced_prompt);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod gc;
pub mod memory;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::EngramConfig;
pub use memory::{Engram, GenerateOptions, RecallOptions, RememberOptions};
pub use models::{
    Memory, MemoryContext, MemoryFilter, MemoryId, MemoryType, RecallStrategy,
};
pub use services::deduplication::DeduplicationEngine;
pub use storage::graph::GraphAdapter;
pub use storage::memory_store::MemoryStore;

/// Classification of a database failure.
///
/// Attached to [`Error::Database`] so callers can distinguish transient
/// conditions (retry) from fatal ones (report and stop).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    /// The database is locked by another connection or process.
    Locked,
    /// The database file is corrupted or not a recognized database.
    Corrupted,
    /// The on-disk schema does not match what this version expects.
    SchemaMismatch,
    /// A query failed for a reason other than the above.
    QueryFailed,
    /// No pooled connection became available within the acquire timeout.
    PoolExhausted,
}

impl DatabaseErrorKind {
    /// Returns `true` for conditions worth retrying with backoff.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Locked | Self::PoolExhausted)
    }

    /// Returns the kind as a static string (used in logs and metrics labels).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Corrupted => "corrupted",
            Self::SchemaMismatch => "schema_mismatch",
            Self::QueryFailed => "query_failed",
            Self::PoolExhausted => "pool_exhausted",
        }
    }
}

/// Error type for engram operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Validation` | Empty prompts, oversized content, bad strategy names |
/// | `Configuration` | Invalid thresholds or budgets at construction |
/// | `Database` | Backend failures, translated by the graph adapter |
/// | `RecallFailed` | Every recall strategy failed for one request |
/// | `ExtractionFailed` | The extractor could not process input text |
/// | `PerformanceExceeded` | A latency budget was blown in strict mode |
/// | `ArchiveNotFound` | Restoring an archive that was purged or never existed |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Input validation failed.
    #[error("validation failed for {field}: {reason}")]
    Validation {
        /// The input field that failed validation.
        field: String,
        /// Why it failed.
        reason: String,
    },

    /// Configuration is invalid or inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A database operation failed.
    #[error("database error ({}): {message}", kind.as_str())]
    Database {
        /// Classification of the failure.
        kind: DatabaseErrorKind,
        /// The underlying cause.
        message: String,
    },

    /// All recall strategies failed for a request.
    #[error("recall failed: {0}")]
    RecallFailed(String),

    /// Memory extraction from text failed.
    ///
    /// The write path catches this at the component boundary, logs it, and
    /// returns an empty candidate list instead of surfacing it to callers.
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// An operation exceeded its latency budget while strict monitoring
    /// is enabled. In non-strict mode the same condition only logs a warning.
    #[error("operation '{operation}' took {actual_ms}ms (budget: {budget_ms}ms)")]
    PerformanceExceeded {
        /// The operation that blew its budget.
        operation: String,
        /// Measured wall time in milliseconds.
        actual_ms: u64,
        /// The configured budget in milliseconds.
        budget_ms: u64,
    },

    /// The requested archive entry does not exist (purged or never created).
    #[error("archive not found: {0}")]
    ArchiveNotFound(String),
}

impl Error {
    /// Returns an actionable suggestion for recovering from this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "check input parameters and their constraints",
            Self::Configuration(_) => {
                "check configuration values and environment overrides"
            },
            Self::Database { kind, .. } => match kind {
                DatabaseErrorKind::Locked => {
                    "wait and retry, or check for other engram instances"
                },
                DatabaseErrorKind::Corrupted => {
                    "back up the database directory and reinitialize"
                },
                DatabaseErrorKind::SchemaMismatch => {
                    "run with a new database directory or migrate the old one"
                },
                DatabaseErrorKind::QueryFailed => "check database connectivity and disk space",
                DatabaseErrorKind::PoolExhausted => {
                    "retry shortly or raise storage.pool_size"
                },
            },
            Self::RecallFailed(_) => "try a simpler prompt or check database connectivity",
            Self::ExtractionFailed(_) => "check input text encoding and length limits",
            Self::PerformanceExceeded { .. } => {
                "reduce max_memories or disable strict monitoring"
            },
            Self::ArchiveNotFound(_) => {
                "the recovery window may have passed; list archives to confirm"
            },
        }
    }
}

/// Result type alias for engram operations.
pub type Result<T> = std::result::Result<T, Error>;
