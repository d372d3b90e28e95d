//! Integration tests for retention: smart pruning, consolidation, and the
//! archive recovery window. These seed the graph directly so ages and
//! access counts can be backdated.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::{Duration, Utc};
use engram::config::RetentionConfig;
use engram::gc::{ArchiveManager, ConsolidationEngine, PruneStrategy, SmartPruner};
use engram::models::{Memory, MemoryType};
use engram::services::recall::TemporalDecayEngine;
use engram::storage::graph::GraphAdapter;
use std::collections::HashSet;
use std::sync::Arc;

/// Seed a mixed population with deterministic ages, sizes, access counts,
/// and importances.
fn seed_population(adapter: &GraphAdapter, count: usize) -> usize {
    let now = Utc::now();
    let mut predicted_candidates = 0;

    for i in 0..count {
        let age_days = 31 + (i * 13) % 400;
        let importance = f64::from(u32::try_from(i % 10).unwrap()) / 10.0;
        let access_count = u32::try_from(i % 12).unwrap();
        let content = format!("seeded observation {i} about subsystem {}", i % 7);

        let mut memory = Memory::new(
            content.clone(),
            MemoryType::Episodic,
            now - Duration::days(i64::try_from(age_days).unwrap()),
        )
        .with_importance(importance)
        .with_source("ai-conversation");
        memory.access_count = access_count;
        adapter.insert_memory(&memory, &[]).unwrap();

        // Analytic prediction from the published scoring formula
        let age_score = (1.0 - (age_days as f64) / 365.0).max(0.0);
        let size_score = (1.0 - content.len() as f64 / 10_000.0).max(0.0);
        let access_score = (f64::from(access_count) / 20.0).min(1.0) * 0.6;
        let total =
            age_score * 0.35 + size_score * 0.20 + access_score * 0.30 + importance * 0.15;
        let protected = importance >= 0.8 || access_count >= 10;
        if !protected && total < 0.3 {
            predicted_candidates += 1;
        }
    }

    predicted_candidates
}

#[test]
fn test_smart_prune_dry_run_matches_analytic_prediction() {
    let adapter = Arc::new(GraphAdapter::in_memory().unwrap());
    let predicted = seed_population(&adapter, 1000);
    assert!(predicted > 0, "seed should produce some candidates");

    let pruner = SmartPruner::new(Arc::clone(&adapter), &RetentionConfig::default());
    let result = pruner.execute(PruneStrategy::Smart, true, false).unwrap();

    assert!(result.dry_run);
    assert_eq!(result.pruned, 0);
    assert_eq!(adapter.count_memories().unwrap(), 1000);

    // Within ±5% of the prediction from the scoring formula
    let tolerance = (predicted as f64 * 0.05).ceil() as usize;
    assert!(
        result.candidates.abs_diff(predicted) <= tolerance,
        "candidates {} vs predicted {predicted}",
        result.candidates
    );

    // Protected memories never appear among candidates
    assert!(result.breakdown.protected > 0);
    assert!(result.candidates + result.breakdown.protected <= result.breakdown.total_memories);
}

#[test]
fn test_smart_prune_execute_archives_and_deletes() {
    let adapter = Arc::new(GraphAdapter::in_memory().unwrap());
    seed_population(&adapter, 200);
    let before = adapter.count_memories().unwrap();

    let pruner = SmartPruner::new(Arc::clone(&adapter), &RetentionConfig::default());
    let result = pruner.execute(PruneStrategy::Smart, false, false).unwrap();

    assert_eq!(result.pruned, result.archived);
    assert_eq!(
        adapter.count_memories().unwrap(),
        before - u64::try_from(result.pruned).unwrap()
    );
    assert_eq!(
        adapter.list_archives(1000).unwrap().len(),
        result.archived
    );
}

#[test]
fn test_consolidation_round_trip_with_lineage() {
    let adapter = Arc::new(GraphAdapter::in_memory().unwrap());
    let now = Utc::now();

    // Ten EPISODIC memories, 120 days old, one access, heavy content overlap
    let originals: Vec<Memory> = (0..10)
        .map(|i| {
            let mut memory = Memory::new(
                format!("retro notes: deploy pipeline held, rollback drill passed, take {i}"),
                MemoryType::Episodic,
                now - Duration::days(120),
            );
            memory.access_count = 1;
            adapter.insert_memory(&memory, &[]).unwrap();
            memory
        })
        .collect();

    let engine = ConsolidationEngine::new(Arc::clone(&adapter), &RetentionConfig::default());
    let result = engine.execute(false).unwrap();

    assert_eq!(result.summaries_created, 1);
    assert_eq!(result.memories_consolidated, 10);
    assert_eq!(result.memories_archived, 10);

    // Exactly the summary survives
    assert_eq!(adapter.count_memories().unwrap(), 1);
    let summary = adapter
        .recent_memories(1, &engram::models::MemoryFilter::new(), now)
        .unwrap()
        .remove(0);
    assert_eq!(summary.source_type, "consolidation");

    // Ten CONSOLIDATED_INTO edges point at it, one per original
    let edges = adapter.edges_into_summary(&summary.id).unwrap();
    assert_eq!(edges.len(), 10);
    let from: HashSet<&str> = edges.iter().map(|e| e.original_id.as_str()).collect();
    for original in &originals {
        assert!(from.contains(original.id.as_str()));
    }

    // Ten archive rows cover the recovery window
    let archives = adapter.list_archives(20).unwrap();
    assert_eq!(archives.len(), 10);
    for archive in &archives {
        assert!(archive.expires_at > archive.archived_at);
    }
}

#[test]
fn test_archive_recovery_window() {
    let adapter = Arc::new(GraphAdapter::in_memory().unwrap());
    let now = Utc::now();

    // Prune a stale memory into the archive
    let stale = Memory::new(
        "an abandoned experiment writeup",
        MemoryType::Episodic,
        now - Duration::days(300),
    )
    .with_importance(0.1)
    .with_source("ai-conversation");
    adapter.insert_memory(&stale, &[]).unwrap();

    let pruner = SmartPruner::new(Arc::clone(&adapter), &RetentionConfig::default());
    let result = pruner.execute(PruneStrategy::Smart, false, false).unwrap();
    assert_eq!(result.archived, 1);

    let archive_id = adapter.list_archives(1).unwrap()[0].id.clone();
    let manager = ArchiveManager::new(Arc::clone(&adapter));

    // Inside the window: restore yields a live memory with the old content
    let restored_id = manager.restore(&archive_id).unwrap();
    let restored = adapter.get_memory(&restored_id).unwrap().unwrap();
    assert_eq!(restored.content, "an abandoned experiment writeup");
    assert!(restored.valid_to.is_none() || restored.valid_to.unwrap() > now);

    // The entry was consumed; restoring again reports ArchiveNotFound
    let err = manager.restore(&archive_id).unwrap_err();
    assert!(matches!(err, engram::Error::ArchiveNotFound(_)));
}

#[test]
fn test_activity_aware_recency_scenario() {
    let now = Utc::now();
    let engine = TemporalDecayEngine::new();

    // Memory created 100 days ago; the project went quiet 90 days ago
    let memory = Memory::new(
        "build cache lives under target/debug/incremental",
        MemoryType::Procedural,
        now - Duration::days(100),
    );
    let last_activity = now - Duration::days(90);

    let aware = engine.temporal_score(&memory, now, Some(last_activity));
    let absolute = engine.temporal_score(&memory, now, None);
    assert!(aware > absolute);

    let explanation = engine.explain(&memory, now, Some(last_activity));
    assert!(explanation.activity_aware_mode);
    assert!((explanation.age_days - 10.0).abs() < 0.05);
    assert!((explanation.absolute_age_days - 100.0).abs() < 0.05);
}
