//! Recall output types.

use super::Memory;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy used to retrieve memories for a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecallStrategy {
    /// Run keyword and entity recall concurrently and union the results.
    Auto,
    /// Token-overlap search over memory content.
    Keyword,
    /// Search via entity MENTIONS edges.
    Entity,
    /// Time-window search driven by temporal references in the prompt.
    Temporal,
}

impl RecallStrategy {
    /// Returns the lowercase strategy name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Keyword => "keyword",
            Self::Entity => "entity",
            Self::Temporal => "temporal",
        }
    }

    /// Parses a strategy name (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "keyword" => Some(Self::Keyword),
            "entity" => Some(Self::Entity),
            "temporal" => Some(Self::Temporal),
            _ => None,
        }
    }
}

impl fmt::Display for RecallStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of attaching memories to a prompt.
#[derive(Debug, Clone)]
pub struct MemoryContext {
    /// The prompt as given.
    pub original_prompt: String,
    /// The prompt preceded by a numbered list of relevant memory contents.
    /// No LLM call is involved in building it.
    pub enhanced_prompt: String,
    /// The memories selected by the ranker, best first.
    pub memories: Vec<Memory>,
    /// Aggregate confidence in `[0.0, 1.0]` (mean of the top scores).
    pub confidence: f64,
    /// The strategy that produced the candidates.
    pub strategy_used: RecallStrategy,
    /// Wall time of the recall call in milliseconds.
    pub recall_time_ms: u64,
}

impl MemoryContext {
    /// Builds a context with an enhanced prompt derived from `memories`.
    ///
    /// With no memories the enhanced prompt is the original unchanged.
    #[must_use]
    pub fn build(
        original_prompt: String,
        memories: Vec<Memory>,
        confidence: f64,
        strategy_used: RecallStrategy,
        recall_time_ms: u64,
    ) -> Self {
        let enhanced_prompt = if memories.is_empty() {
            original_prompt.clone()
        } else {
            let mut out = String::from("Relevant context from memory:\n");
            for (i, memory) in memories.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", i + 1, memory.content));
            }
            out.push('\n');
            out.push_str(&original_prompt);
            out
        };

        Self {
            original_prompt,
            enhanced_prompt,
            memories,
            confidence,
            strategy_used,
            recall_time_ms,
        }
    }

    /// Returns `true` if no memory was attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MemoryType;
    use chrono::Utc;

    #[test]
    fn test_strategy_parse_roundtrip() {
        for s in [
            RecallStrategy::Auto,
            RecallStrategy::Keyword,
            RecallStrategy::Entity,
            RecallStrategy::Temporal,
        ] {
            assert_eq!(RecallStrategy::parse(s.as_str()), Some(s));
        }
        assert_eq!(RecallStrategy::parse("semantic"), None);
    }

    #[test]
    fn test_empty_context_leaves_prompt_unchanged() {
        let ctx = MemoryContext::build(
            "What do I use?".to_string(),
            vec![],
            0.0,
            RecallStrategy::Auto,
            3,
        );
        assert!(ctx.is_empty());
        assert_eq!(ctx.enhanced_prompt, "What do I use?");
    }

    #[test]
    fn test_enhanced_prompt_lists_memories() {
        let now = Utc::now();
        let memories = vec![
            Memory::new("I use Python", MemoryType::Semantic, now),
            Memory::new("I use PostgreSQL", MemoryType::Semantic, now),
        ];
        let ctx = MemoryContext::build(
            "What do I use?".to_string(),
            memories,
            0.9,
            RecallStrategy::Keyword,
            1,
        );
        assert!(ctx.enhanced_prompt.contains("1. I use Python"));
        assert!(ctx.enhanced_prompt.contains("2. I use PostgreSQL"));
        assert!(ctx.enhanced_prompt.ends_with("What do I use?"));
    }
}
