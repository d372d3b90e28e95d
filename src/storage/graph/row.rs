//! Row-to-model mapping.
//!
//! Timestamps cross this boundary as RFC 3339 UTC strings and nowhere
//! else; metadata crosses as JSON text.

use crate::models::{ArchivedMemory, Memory, MemoryId, MemoryType};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

/// Serializes a timestamp the way the schema stores it.
#[must_use]
pub fn timestamp_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp back to UTC.
fn timestamp_from_sql(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_timestamp_from_sql(
    idx: usize,
    value: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| timestamp_from_sql(idx, &v)).transpose()
}

fn memory_type_from_sql(idx: usize, value: &str) -> rusqlite::Result<MemoryType> {
    MemoryType::parse(value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown memory type: {value}").into(),
        )
    })
}

fn metadata_from_sql(
    idx: usize,
    value: &str,
) -> rusqlite::Result<serde_json::Map<String, serde_json::Value>> {
    serde_json::from_str(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Maps a row selected with [`super::schema::MEMORY_COLUMNS`] to a [`Memory`].
pub fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<Memory> {
    let created_at: String = row.get(7)?;
    let valid_from: String = row.get(8)?;
    let valid_to: Option<String> = row.get(9)?;
    let accessed_at: Option<String> = row.get(10)?;
    let memory_type: String = row.get(3)?;
    let metadata: String = row.get(15)?;

    Ok(Memory {
        id: MemoryId::new(row.get::<_, String>(0)?),
        content: row.get(1)?,
        content_hash: row.get(2)?,
        memory_type: memory_type_from_sql(3, &memory_type)?,
        importance: row.get(4)?,
        confidence: row.get(5)?,
        source_type: row.get(6)?,
        created_at: timestamp_from_sql(7, &created_at)?,
        valid_from: timestamp_from_sql(8, &valid_from)?,
        valid_to: optional_timestamp_from_sql(9, valid_to)?,
        accessed_at: optional_timestamp_from_sql(10, accessed_at)?,
        access_count: row.get(11)?,
        agent_id: row.get(12)?,
        user_id: row.get(13)?,
        session_id: row.get(14)?,
        metadata: metadata_from_sql(15, &metadata)?,
    })
}

/// Maps a row selected with [`super::schema::ARCHIVE_COLUMNS`] to an
/// [`ArchivedMemory`].
pub fn archive_from_row(row: &Row<'_>) -> rusqlite::Result<ArchivedMemory> {
    let memory_type: String = row.get(3)?;
    let created_at: String = row.get(10)?;
    let archived_at: String = row.get(11)?;
    let expires_at: String = row.get(14)?;
    let metadata: String = row.get(15)?;

    Ok(ArchivedMemory {
        id: row.get(0)?,
        original_id: MemoryId::new(row.get::<_, String>(1)?),
        content: row.get(2)?,
        memory_type: memory_type_from_sql(3, &memory_type)?,
        source_type: row.get(4)?,
        importance: row.get(5)?,
        confidence: row.get(6)?,
        agent_id: row.get(7)?,
        user_id: row.get(8)?,
        session_id: row.get(9)?,
        created_at: timestamp_from_sql(10, &created_at)?,
        archived_at: timestamp_from_sql(11, &archived_at)?,
        prune_score: row.get(12)?,
        prune_reason: row.get(13)?,
        expires_at: timestamp_from_sql(14, &expires_at)?,
        metadata: metadata_from_sql(15, &metadata)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_roundtrip() {
        let now = Utc::now();
        let text = timestamp_to_sql(now);
        let parsed = timestamp_from_sql(0, &text).unwrap();
        // Micros precision loses sub-microsecond detail only
        assert!((now - parsed).num_microseconds().unwrap_or(0).abs() < 2);
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let early = Utc::now();
        let late = early + chrono::Duration::seconds(90);
        assert!(timestamp_to_sql(early) < timestamp_to_sql(late));
    }

    #[test]
    fn test_bad_timestamp_is_a_conversion_error() {
        assert!(timestamp_from_sql(0, "not-a-timestamp").is_err());
    }
}
