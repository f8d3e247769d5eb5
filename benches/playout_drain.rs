//! Benchmarks for playout queue operations
//!
//! The audio render callback runs `release_with` under a try-lock every
//! buffer period, so its cost bounds how long the lock is held. Insertion
//! covers the in-order common case and reordered arrival.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

use avsync::queue::{AnchorRule, PlayoutQueue};
use avsync::test_utils::ManualTimeSource;
use avsync::{EncodedUnit, PcmChunk, QueuePolicy, SyncClock};

const FRAME_US: u64 = 33_333;

fn video_units(count: usize, reorder: bool) -> Vec<EncodedUnit> {
    let mut units: Vec<EncodedUnit> = (0..count as u64)
        .map(|i| EncodedUnit::video(vec![0u8; 64], 1_000_000 + i * FRAME_US, i == 0))
        .collect();
    if reorder {
        for pair in units.chunks_mut(2) {
            pair.reverse();
        }
    }
    units
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("playout_insert");
    let policy = QueuePolicy { span_ceiling_us: u64::MAX, ..QueuePolicy::video() };

    for depth in [8usize, 64, 256] {
        for (label, reorder) in [("in_order", false), ("reordered", true)] {
            let units = video_units(depth, reorder);
            group.bench_with_input(BenchmarkId::new(label, depth), &units, |b, units| {
                b.iter(|| {
                    let mut queue = PlayoutQueue::new("video", policy, AnchorRule::KeyframeOnly);
                    for unit in units.iter().cloned() {
                        queue.insert(unit);
                    }
                    black_box(queue.len())
                })
            });
        }
    }

    group.finish();
}

fn bench_drain(c: &mut Criterion) {
    let clock = SyncClock::with_time_source(100_000, Arc::new(ManualTimeSource::new(0)));
    clock.anchor_if_needed(1_000_000, "bench");
    let policy = QueuePolicy { span_ceiling_us: u64::MAX, ..QueuePolicy::video() };

    // At the anchor instant the first four frames are inside the latency window.
    c.bench_function("video_drain_ready_of_64", |b| {
        b.iter_batched(
            || {
                let mut queue = PlayoutQueue::new("video", policy, AnchorRule::KeyframeOnly);
                for unit in video_units(64, false) {
                    queue.insert(unit);
                }
                queue
            },
            |mut queue| black_box(queue.drain(&clock)),
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_audio_release(c: &mut Criterion) {
    let clock = SyncClock::with_time_source(100_000, Arc::new(ManualTimeSource::new(0)));
    clock.anchor_if_needed(1_000_000, "bench");

    c.bench_function("audio_release_512_frames", |b| {
        b.iter_batched(
            || {
                let mut queue = PlayoutQueue::new("audio", QueuePolicy::audio(), AnchorRule::AnyUnit);
                queue.insert(PcmChunk::new(1_000_000, 48_000, 1, vec![0.1; 960]));
                queue.insert(PcmChunk::new(1_020_000, 48_000, 1, vec![0.1; 960]));
                (queue, vec![0.0f32; 512])
            },
            |(mut queue, mut out)| {
                let frames = queue.release_with(&clock, |chunk| chunk.read_into(&mut out));
                black_box((frames, out))
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_insert, bench_drain, bench_audio_release);
criterion_main!(benches);
