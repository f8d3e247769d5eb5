//! Benchmarks for bitstream framing on the per-unit hot path
//!
//! Every received access unit is split and converted to length-prefixed
//! samples on the decode timer; every encoded sample is reframed as Annex-B on
//! the capture task. Both must stay well under one frame period.

use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use avsync::bitstream::{
    ParameterSetCache, assemble_annex_b, infer_opus_frame_duration, split_annex_b, split_annex_b_bytes,
    to_length_prefixed,
};
use avsync::capture::frame_video_sample;
use avsync::codec::EncodedVideoSample;
use avsync::test_utils::hevc_parameter_sets;

/// Keyframe access unit with `slices` IDR slices of `slice_len` bytes each.
fn keyframe(slices: usize, slice_len: usize) -> Vec<u8> {
    let mut slice = vec![0xA5u8; slice_len];
    slice[0] = 0x26;
    slice[1] = 0x01;
    let vcl: Vec<Vec<u8>> = (0..slices).map(|_| slice.clone()).collect();
    assemble_annex_b(hevc_parameter_sets(1).as_slices(), vcl)
}

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("annexb_split");

    for (label, slices, len) in [("720p_idr", 4, 24_000), ("720p_delta", 1, 3_000), ("1080p_idr", 8, 32_000)] {
        let unit = Bytes::from(keyframe(slices, len));
        group.throughput(Throughput::Bytes(unit.len() as u64));

        group.bench_with_input(BenchmarkId::new("borrowed", label), &unit, |b, unit| {
            b.iter(|| black_box(split_annex_b(black_box(unit)).count()))
        });
        group.bench_with_input(BenchmarkId::new("shared_bytes", label), &unit, |b, unit| {
            b.iter(|| black_box(split_annex_b_bytes(black_box(unit))))
        });
    }

    group.finish();
}

fn bench_decode_preparation(c: &mut Criterion) {
    let unit = Bytes::from(keyframe(4, 24_000));

    c.bench_function("decode_preparation_720p_idr", |b| {
        b.iter(|| {
            let mut cache = ParameterSetCache::new();
            let mut samples = 0usize;
            for nal in split_annex_b_bytes(black_box(&unit)) {
                if cache.observe(&nal).is_some_and(|kind| kind.is_vcl())
                    && let Ok(sample) = to_length_prefixed(&nal)
                {
                    samples += sample.len();
                }
            }
            black_box(samples)
        })
    });
}

fn bench_capture_framing(c: &mut Criterion) {
    let mut data = Vec::new();
    for _ in 0..4 {
        let mut slice = vec![0x5Au8; 24_000];
        slice[0] = 0x26;
        data.extend(to_length_prefixed(&slice).unwrap_or_default());
    }
    let sample = EncodedVideoSample {
        pts_us: 1_000_000,
        is_keyframe: true,
        data: Bytes::from(data),
        parameter_sets: Some(hevc_parameter_sets(1)),
    };

    let mut group = c.benchmark_group("capture_framing");
    group.throughput(Throughput::Bytes(sample.data.len() as u64));
    group.bench_function("frame_video_sample_720p_idr", |b| {
        b.iter(|| black_box(frame_video_sample(black_box(&sample))))
    });
    group.finish();
}

fn bench_opus_toc(c: &mut Criterion) {
    let packets: Vec<[u8; 2]> = (0u8..=255).map(|toc| [toc, 0x03]).collect();

    c.bench_function("opus_duration_all_tocs", |b| {
        b.iter(|| {
            let total: u32 = packets.iter().filter_map(|p| infer_opus_frame_duration(black_box(p))).sum();
            black_box(total)
        })
    });
}

criterion_group!(benches, bench_split, bench_decode_preparation, bench_capture_framing, bench_opus_toc);
criterion_main!(benches);
