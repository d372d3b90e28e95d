//! Extraction pattern table.
//!
//! Regex-level signals keyed to memory type, checked in priority order:
//! the first matching pattern classifies the sentence. Weak scratch cues
//! come last so stronger signals always win.

use crate::models::MemoryType;
use once_cell::sync::Lazy;
use regex::Regex;

/// Compiles a pattern known to be valid at build time.
#[allow(clippy::unwrap_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

/// The classification table in priority order.
static TYPE_PATTERNS: Lazy<Vec<(MemoryType, Regex)>> = Lazy::new(|| {
    vec![
        // Identity and project facts
        (
            MemoryType::Semantic,
            compile(r"(?i)\b(my name is|i am called|this project uses|the project is built (on|with)|we use|our stack is|is written in)\b"),
        ),
        // Preferences and standing rules
        (
            MemoryType::Preference,
            compile(r"(?i)\b(i prefer|we prefer|we always|i always|never use|always use|i like|we like|do not ever|we should always)\b"),
        ),
        // Procedures and how-to
        (
            MemoryType::Procedural,
            compile(r"(?i)(\bto fix\b|\bto resolve\b|\bto set up\b|\bsteps?:|\bfirst\b.*\bthen\b|\brun\b.*\bcommand\b|\bhow to\b)"),
        ),
        // Decisions and events
        (
            MemoryType::Episodic,
            compile(r"(?i)\b(we decided|we chose|we agreed|decided to|yesterday|last week|last month|this morning|today we)\b"),
        ),
        // Observations
        (
            MemoryType::Sensory,
            compile(r"(?i)\b(i noticed|i observed|i saw|it seems|it looks like|appears to)\b"),
        ),
        // Weak scratch cues; anything weaker yields no memory at all
        (
            MemoryType::Working,
            compile(r"(?i)\b(for now|temporarily|as a workaround|in the meantime|note:)\b"),
        ),
    ]
});

/// Explicit memory instructions boost importance regardless of type.
static EXPLICIT_INSTRUCTION: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)\b(remember that|remember:|don't forget|do not forget|keep in mind|note that|important:)\b")
});

/// Classifies a sentence, returning the first memory type whose pattern
/// matches. `None` means the sentence carries no memory signal.
#[must_use]
pub fn classify(sentence: &str) -> Option<MemoryType> {
    TYPE_PATTERNS
        .iter()
        .find(|(_, regex)| regex.is_match(sentence))
        .map(|(memory_type, _)| *memory_type)
}

/// Returns `true` if the sentence contains an explicit memory instruction.
#[must_use]
pub fn has_explicit_instruction(sentence: &str) -> bool {
    EXPLICIT_INSTRUCTION.is_match(sentence)
}

/// Splits free text into candidate sentences.
///
/// Sentences end at `.`, `!`, `?`, or a newline; fragments shorter than
/// a handful of characters are discarded as noise.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split_inclusive(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| s.len() >= 8)
        .collect()
}
