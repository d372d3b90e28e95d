//! Benchmarks for the recall hot path.
//!
//! Benchmark targets:
//! - 100 memories: well under the 10ms budget
//! - 1,000 memories: around the budget on laptop hardware
//!
//! Exercises the full pipeline: strategy selection, token/entity search,
//! decay ranking, and enhanced-prompt construction. The result cache is
//! disabled so every iteration pays the full cost.

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use engram::memory::{RecallOptions, RememberOptions};
use engram::storage::DedupPolicy;
use engram::{Engram, EngramConfig};

/// Seeds an in-memory instance with `count` varied memories.
///
/// The merge policy keeps near-duplicates as distinct rows so the store
/// actually reaches the requested size.
fn seeded_engram(count: usize) -> Engram {
    let config = EngramConfig::default()
        .with_cache_enabled(false)
        .with_tracker_enabled(false);
    let engram = Engram::in_memory(Some(config)).expect("in-memory instance");

    let subsystems = ["parser", "scheduler", "storage", "network", "auth"];
    let options = RememberOptions {
        policy: DedupPolicy::Merge,
        ..RememberOptions::default()
    };
    for i in 0..count {
        let subsystem = subsystems[i % subsystems.len()];
        engram
            .remember(
                &format!("To fix the {subsystem} timeout, raise the retry budget (note {i})."),
                &options,
            )
            .expect("seed memory");
    }
    engram
}

fn bench_attach_memories(c: &mut Criterion) {
    let mut group = c.benchmark_group("attach_memories");

    for &count in &[100_usize, 1_000] {
        let engram = seeded_engram(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &engram, |b, engram| {
            b.iter(|| {
                engram
                    .attach_memories(
                        "how do I fix the scheduler timeout?",
                        &RecallOptions::default(),
                    )
                    .expect("recall")
            });
        });
    }

    group.finish();
}

fn bench_generate_memories(c: &mut Criterion) {
    let engram = seeded_engram(100);

    c.bench_function("generate_memories", |b| {
        let mut i = 0_u64;
        b.iter(|| {
            i += 1;
            engram
                .generate_memories(
                    &format!("We decided to cap worker pools at {i} threads."),
                    &engram::memory::GenerateOptions::default(),
                )
                .expect("generate")
        });
    });
}

criterion_group!(benches, bench_attach_memories, bench_generate_memories);
criterion_main!(benches);
