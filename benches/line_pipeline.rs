//! Benchmarks for the inbound line pipeline
//!
//! Measures the per-line cost of:
//! - Framing a byte stream delivered in transport-sized chunks
//! - Decoding framed `$DATA` lines into telemetry frames
//! - Classifying acknowledgement lines with the filter codec
//!
//! Platform: Cross-platform (generated telemetry, CI-safe)

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use groundlink::codec::decode_inbound;
use groundlink::test_utils::{SAMPLE_DATA_LINE, sample_stream};
use groundlink::{LineFramer, TelemetryDecoder};
use std::hint::black_box;

const LINES: usize = 1_000;

fn bench_framing(c: &mut Criterion) {
    let bytes = sample_stream(LINES);

    let mut group = c.benchmark_group("line_framing");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    for chunk_size in [1usize, 16, 64, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(chunk_size), &chunk_size, |b, &size| {
            b.iter(|| {
                let mut framer = LineFramer::new();
                let mut count = 0;
                for chunk in bytes.chunks(size) {
                    count += framer.ingest(black_box(chunk)).len();
                }
                black_box(count)
            })
        });
    }

    group.finish();
}

fn bench_decoding(c: &mut Criterion) {
    let lines = LineFramer::new().ingest(&sample_stream(LINES));

    let mut group = c.benchmark_group("telemetry_decoding");
    group.throughput(Throughput::Elements(lines.len() as u64));

    group.bench_function("decode_generated_lines", |b| {
        b.iter(|| {
            let mut decoder = TelemetryDecoder::new();
            for line in &lines {
                black_box(decoder.decode(black_box(line)).ok());
            }
        })
    });

    group.bench_function("decode_reference_line", |b| {
        let mut decoder = TelemetryDecoder::new();
        b.iter(|| black_box(decoder.decode(black_box(SAMPLE_DATA_LINE)).ok()))
    });

    group.finish();
}

fn bench_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("inbound_classification");

    for line in ["SPECTRAL_ACK:13", "$FILTER_STATUS,B,135,BUSY", SAMPLE_DATA_LINE] {
        group.bench_with_input(BenchmarkId::from_parameter(line), line, |b, line| {
            b.iter(|| black_box(decode_inbound(black_box(line))))
        });
    }

    group.finish();
}

fn bench_end_to_end(c: &mut Criterion) {
    let bytes = sample_stream(LINES);

    let mut group = c.benchmark_group("bytes_to_frames");
    group.throughput(Throughput::Elements(LINES as u64));

    group.bench_function("64_byte_chunks", |b| {
        b.iter(|| {
            let mut framer = LineFramer::new();
            let mut decoder = TelemetryDecoder::new();
            for chunk in bytes.chunks(64) {
                for line in framer.ingest(chunk) {
                    black_box(decoder.decode(&line).ok());
                }
            }
            decoder.packets_decoded()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_framing, bench_decoding, bench_classification, bench_end_to_end);
criterion_main!(benches);
