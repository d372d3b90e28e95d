//! Pattern-based entity and keyword harvesting.
//!
//! No model inference happens here: technologies come from a curated name
//! table, people from a capitalized-name heuristic, and organizations from
//! a legal-suffix heuristic. Keywords are content words minus stopwords.

use crate::models::{Entity, EntityMention, EntityType};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Technology names recognized without any model.
static TECH_NAMES: &[&str] = &[
    // Languages
    "Rust", "Python", "Java", "JavaScript", "TypeScript", "Go", "Ruby", "Kotlin", "Swift", "C++",
    "C#", "Scala", "Elixir", "Haskell", "Zig",
    // Databases
    "PostgreSQL", "MySQL", "SQLite", "Redis", "MongoDB", "Cassandra", "DynamoDB", "ClickHouse",
    "Elasticsearch", "Neo4j", "DuckDB", "Kuzu",
    // Frameworks
    "React", "Vue", "Angular", "Svelte", "Django", "Rails", "Flask", "FastAPI", "Axum", "Actix",
    "Spring", "Express",
    // Infrastructure
    "Docker", "Kubernetes", "Terraform", "Ansible", "Prometheus", "Grafana", "Nginx", "Kafka",
    "RabbitMQ", "NATS",
    // Cloud
    "AWS", "Azure", "GCP", "Cloudflare", "Vercel", "Heroku",
    // Tooling
    "Git", "GitHub", "GitLab", "Cargo", "npm", "pnpm", "Webpack", "Vite", "Bazel",
    // Protocols
    "GraphQL", "gRPC", "REST", "WebSocket", "MQTT",
];

/// Compiles a pattern known to be valid at build time.
#[allow(clippy::unwrap_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

/// Word-boundary regex over the technology table, case-insensitive.
static TECH_REGEX: Lazy<Regex> = Lazy::new(|| {
    let alternation = TECH_NAMES
        .iter()
        .map(|name| regex::escape(name))
        .collect::<Vec<_>>()
        .join("|");
    compile(&format!(r"(?i)\b({alternation})\b"))
});

/// Two consecutive capitalized words, the shape of a person's name.
static PERSON_REGEX: Lazy<Regex> =
    Lazy::new(|| compile(r"\b([A-Z][a-z]+ [A-Z][a-z]+)\b"));

/// Capitalized word followed by a legal or team suffix.
static ORG_REGEX: Lazy<Regex> =
    Lazy::new(|| compile(r"\b([A-Z][A-Za-z]+ (?:Corp|Inc|Ltd|GmbH|Labs|Team))\b"));

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "do", "for", "from", "has", "have",
        "i", "in", "is", "it", "its", "my", "no", "not", "of", "on", "or", "our", "so", "that",
        "the", "their", "then", "there", "these", "they", "this", "to", "use", "uses", "we",
        "what", "when", "where", "which", "who", "will", "with", "you", "your",
    ]
    .into_iter()
    .collect()
});

/// Resolves the canonical casing for a technology name matched
/// case-insensitively.
fn canonical_tech_name(matched: &str) -> String {
    TECH_NAMES
        .iter()
        .find(|name| name.eq_ignore_ascii_case(matched))
        .map_or_else(|| matched.to_string(), |name| (*name).to_string())
}

/// Extracts entity mentions (with byte positions) from text.
///
/// A name that matches both the technology table and a name-shaped pattern
/// is reported once, as a technology.
#[must_use]
pub fn extract_entities(text: &str) -> Vec<EntityMention> {
    let mut mentions = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for m in TECH_REGEX.find_iter(text) {
        let entity = Entity::new(canonical_tech_name(m.as_str()), EntityType::Technology);
        if seen.insert(entity.id.clone()) {
            mentions.push(EntityMention {
                entity,
                position: m.start(),
            });
        }
    }

    for m in ORG_REGEX.find_iter(text) {
        let entity = Entity::new(m.as_str(), EntityType::Organization);
        if seen.insert(entity.id.clone()) {
            mentions.push(EntityMention {
                entity,
                position: m.start(),
            });
        }
    }

    for m in PERSON_REGEX.find_iter(text) {
        // Skip name-shaped matches already claimed as organizations
        if ORG_REGEX.is_match(m.as_str()) {
            continue;
        }
        let entity = Entity::new(m.as_str(), EntityType::Person);
        if seen.insert(entity.id.clone()) {
            mentions.push(EntityMention {
                entity,
                position: m.start(),
            });
        }
    }

    mentions
}

/// Harvests up to `limit` keywords: lowercase content words, stopwords
/// removed, order of first appearance preserved.
#[must_use]
pub fn extract_keywords(text: &str, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();

    for token in crate::services::deduplication::tokenize(text) {
        if token.len() < 3 || STOPWORDS.contains(token.as_str()) {
            continue;
        }
        if seen.insert(token.clone()) {
            keywords.push(token);
            if keywords.len() >= limit {
                break;
            }
        }
    }

    keywords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_technologies_with_canonical_casing() {
        let mentions = extract_entities("we moved from postgresql to SQLite last week");
        let names: Vec<&str> = mentions.iter().map(|m| m.entity.name.as_str()).collect();
        assert!(names.contains(&"PostgreSQL"));
        assert!(names.contains(&"SQLite"));
        assert!(
            mentions
                .iter()
                .all(|m| m.entity.entity_type == EntityType::Technology)
        );
    }

    #[test]
    fn test_extracts_person_names() {
        let mentions = extract_entities("Sarah Chen reviewed the migration plan");
        assert!(
            mentions
                .iter()
                .any(|m| m.entity.name == "Sarah Chen" && m.entity.entity_type == EntityType::Person)
        );
    }

    #[test]
    fn test_extracts_organizations() {
        let mentions = extract_entities("The contract with Acme Corp was renewed");
        assert!(
            mentions
                .iter()
                .any(|m| m.entity.name == "Acme Corp"
                    && m.entity.entity_type == EntityType::Organization)
        );
    }

    #[test]
    fn test_positions_point_into_text() {
        let text = "My name is Sarah Chen; I use Python and PostgreSQL.";
        for mention in extract_entities(text) {
            let found = &text[mention.position..mention.position + mention.entity.name.len()];
            assert!(found.eq_ignore_ascii_case(&mention.entity.name));
        }
    }

    #[test]
    fn test_duplicate_mentions_reported_once() {
        let mentions = extract_entities("Rust here, rust there, RUST everywhere");
        assert_eq!(mentions.len(), 1);
    }

    #[test]
    fn test_keywords_skip_stopwords() {
        let keywords = extract_keywords("We use the PostgreSQL database for the project", 10);
        assert!(keywords.contains(&"postgresql".to_string()));
        assert!(keywords.contains(&"database".to_string()));
        assert!(!keywords.contains(&"the".to_string()));
        assert!(!keywords.contains(&"use".to_string()));
    }

    #[test]
    fn test_keyword_limit() {
        let keywords = extract_keywords(
            "alpha bravo charlie delta echo foxtrot golf hotel india juliet",
            3,
        );
        assert_eq!(keywords.len(), 3);
    }
}
