//! Graph node and edge payloads.
//!
//! Entities are people, organizations, technologies, and locations harvested
//! from memory content; they are linked to memories through MENTIONS edges.
//! Consolidation lineage is recorded through CONSOLIDATED_INTO edges.

use super::MemoryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of an extracted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// A person's name.
    Person,
    /// A company, team, or other organization.
    Organization,
    /// A language, framework, database, tool, or platform.
    Technology,
    /// A geographic or logical location.
    Location,
    /// Anything else worth linking.
    Other,
}

impl EntityType {
    /// Returns the lowercase type name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Technology => "technology",
            Self::Location => "location",
            Self::Other => "other",
        }
    }

    /// Parses an entity type name (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "person" => Some(Self::Person),
            "organization" => Some(Self::Organization),
            "technology" => Some(Self::Technology),
            "location" => Some(Self::Location),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entity node in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable identifier (derived from name and type).
    pub id: String,
    /// Display name as it appeared in content.
    pub name: String,
    /// Entity category.
    pub entity_type: EntityType,
}

impl Entity {
    /// Creates an entity with an id derived from its name and type.
    ///
    /// The id is deterministic so repeated mentions of the same entity
    /// resolve to one node.
    #[must_use]
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        let name = name.into();
        let id = format!("{}:{}", entity_type.as_str(), name.to_lowercase());
        Self {
            id,
            name,
            entity_type,
        }
    }
}

/// A MENTIONS edge payload: an entity occurrence inside a memory's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMention {
    /// The mentioned entity.
    pub entity: Entity,
    /// Byte offset of the mention within the content.
    pub position: usize,
}

/// A CONSOLIDATED_INTO edge payload: original memory → summary memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationEdge {
    /// The archived original.
    pub original_id: MemoryId,
    /// The summary that replaced it.
    pub summary_id: MemoryId,
    /// When the consolidation ran.
    pub consolidation_date: DateTime<Utc>,
    /// Identifier of the cluster this edge came from.
    pub cluster_id: String,
    /// Similarity of the original to the cluster centroid.
    pub similarity_score: f64,
}
