//! The individual recall strategies.
//!
//! Each strategy turns a prompt into a candidate list of (memory,
//! relevance) pairs. Relevance is strategy-specific and normalized to
//! `[0.0, 1.0]`; the coordinator mixes it with temporal decay.

use crate::models::{Memory, MemoryFilter};
use crate::services::deduplication::tokenize;
use crate::services::extraction::{extract_entities, extract_keywords};
use crate::storage::graph::GraphAdapter;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Overfetch factor: strategies pull more rows than the caller's top-K so
/// the ranker has something to choose from.
const OVERFETCH: usize = 4;

/// Keyword recall: match prompt tokens against memory content, rank by
/// token-overlap density.
pub fn keyword_recall(
    adapter: &GraphAdapter,
    prompt: &str,
    filter: &MemoryFilter,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<(Memory, f64)>> {
    let mut tokens = extract_keywords(prompt, 16);
    if tokens.is_empty() {
        // Stopword-only prompts still deserve a match attempt
        tokens = tokenize(prompt);
    }
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let rows = adapter.search_by_tokens(&tokens, filter, now, limit * OVERFETCH)?;
    let prompt_tokens: HashSet<String> = tokens.into_iter().collect();

    Ok(rows
        .into_iter()
        .map(|memory| {
            let memory_tokens: HashSet<String> = tokenize(&memory.content).into_iter().collect();
            let overlap = prompt_tokens.intersection(&memory_tokens).count();
            #[allow(clippy::cast_precision_loss)]
            let relevance = overlap as f64 / prompt_tokens.len() as f64;
            (memory, relevance)
        })
        .collect())
}

/// Entity recall: extract entities from the prompt, follow MENTIONS edges,
/// rank by shared-entity count.
pub fn entity_recall(
    adapter: &GraphAdapter,
    prompt: &str,
    filter: &MemoryFilter,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<(Memory, f64)>> {
    let mentions = extract_entities(prompt);
    if mentions.is_empty() {
        return Ok(Vec::new());
    }

    let entity_ids: Vec<String> = mentions.iter().map(|m| m.entity.id.clone()).collect();
    let total = entity_ids.len();
    let rows = adapter.memories_mentioning(&entity_ids, filter, now, limit * OVERFETCH)?;

    Ok(rows
        .into_iter()
        .map(|(memory, shared)| {
            #[allow(clippy::cast_precision_loss)]
            let relevance = f64::from(shared) / total as f64;
            (memory, relevance.clamp(0.0, 1.0))
        })
        .collect())
}

static DAYS_AGO: Lazy<Regex> = Lazy::new(|| {
    // literal pattern, cannot fail to compile
    #[allow(clippy::unwrap_used)]
    let regex = Regex::new(r"(?i)\b(\d{1,3})\s+days?\s+ago\b").unwrap();
    regex
});

/// Derives a created-at window from temporal references in the prompt.
///
/// Returns `None` when the prompt carries no time reference.
#[must_use]
pub fn parse_time_window(prompt: &str, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let lowered = prompt.to_lowercase();

    if let Some(captures) = DAYS_AGO.captures(prompt) {
        let days: i64 = captures.get(1)?.as_str().parse().ok()?;
        // A day of slack on both sides of the referenced point
        return Some((
            now - Duration::days(days + 1),
            now - Duration::days((days - 1).max(0)),
        ));
    }
    if lowered.contains("yesterday") {
        return Some((now - Duration::days(2), now - Duration::hours(12)));
    }
    if lowered.contains("today") || lowered.contains("this morning") {
        return Some((now - Duration::days(1), now));
    }
    if lowered.contains("last week") || lowered.contains("past week") {
        return Some((now - Duration::days(14), now - Duration::days(5)));
    }
    if lowered.contains("last month") || lowered.contains("past month") {
        return Some((now - Duration::days(45), now - Duration::days(20)));
    }
    if lowered.contains("recently") || lowered.contains("lately") {
        return Some((now - Duration::days(7), now));
    }

    None
}

/// Temporal recall: filter by a created-at window derived from the prompt,
/// rank by recency within the window.
///
/// A prompt without any time reference falls back to the last seven days.
pub fn temporal_recall(
    adapter: &GraphAdapter,
    prompt: &str,
    filter: &MemoryFilter,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<(Memory, f64)>> {
    let (from, to) =
        parse_time_window(prompt, now).unwrap_or((now - Duration::days(7), now));

    let rows = adapter.memories_in_window(from, to, filter, now, limit * OVERFETCH)?;
    let span_seconds = (to - from).num_seconds().max(1);

    Ok(rows
        .into_iter()
        .map(|memory| {
            let offset = (memory.created_at - from).num_seconds().clamp(0, span_seconds);
            #[allow(clippy::cast_precision_loss)]
            let relevance = offset as f64 / span_seconds as f64;
            (memory, relevance)
        })
        .collect())
}
