//! Storage layer.
//!
//! The graph adapter is the only component that knows the on-disk format;
//! everything above it works with typed models and typed operations.

pub mod graph;
pub mod memory_store;

pub use graph::{ConnectionPool, GraphAdapter, PooledConnection};
pub use memory_store::{DedupPolicy, MemoryStore, StorageStats, StoreRequest};
