//! Append throughput, with and without segment rollover.

use criterion::{BatchSize, Criterion, Throughput};
use segmented_journal::{JournalConfig, SegmentedJournal};
use std::hint::black_box;

const BATCH: usize = 1_000;

fn open(dir: &std::path::Path, segment_size: usize) -> SegmentedJournal {
    SegmentedJournal::open(JournalConfig::new(dir).with_max_segment_size(segment_size))
        .expect("journal must open in bench setup")
}

pub fn register_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("journal_append");

    for payload_size in [64usize, 1024] {
        let payload = vec![0x5Au8; payload_size];
        group.throughput(Throughput::Bytes((payload_size * BATCH) as u64));

        // One large segment: no rollover in the measured loop.
        group.bench_function(format!("append_{payload_size}b_single_segment"), |b| {
            b.iter_batched(
                || tempfile::tempdir().expect("tempdir"),
                |dir| {
                    let journal = open(dir.path(), 64 * 1024 * 1024);
                    let mut writer = journal.writer().expect("writer");
                    for _ in 0..BATCH {
                        black_box(writer.append(payload.clone()).expect("append"));
                    }
                },
                BatchSize::PerIteration,
            )
        });

        // Small segments: rolls over every few dozen entries.
        group.bench_function(format!("append_{payload_size}b_with_rollover"), |b| {
            b.iter_batched(
                || tempfile::tempdir().expect("tempdir"),
                |dir| {
                    let journal = open(dir.path(), 64 * 1024);
                    let mut writer = journal.writer().expect("writer");
                    for _ in 0..BATCH {
                        black_box(writer.append(payload.clone()).expect("append"));
                    }
                },
                BatchSize::PerIteration,
            )
        });
    }

    group.bench_function("append_then_flush", |b| {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = open(dir.path(), 256 * 1024 * 1024);
        let mut writer = journal.writer().expect("writer");
        let payload = vec![0xA5u8; 256];
        b.iter(|| {
            writer.append(payload.clone()).expect("append");
            writer.flush().expect("flush");
        })
    });

    group.finish();
}
