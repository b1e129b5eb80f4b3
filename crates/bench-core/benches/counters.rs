//! Hot path cost of the shared counters and the snapshot ring.
//!
//! ```bash
//! cargo bench -p bench-core --bench counters
//! ```

use bench_core::{SnapshotRing, StatCounters};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::thread;

const OPERATIONS_PER_THREAD: u64 = 10_000;

fn bench_record_success(c: &mut Criterion) {
    let counters = StatCounters::new();
    let mut latency = 0u64;

    c.bench_function("record_success", |b| {
        b.iter(|| {
            counters.record_success(black_box(latency % 500));
            latency += 1;
        });
    });
}

fn bench_contended_record_success(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_record_success");

    for threads in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let counters = Arc::new(StatCounters::new());
                thread::scope(|s| {
                    for t in 0..threads as u64 {
                        let counters = &counters;
                        s.spawn(move || {
                            for i in 0..OPERATIONS_PER_THREAD {
                                counters.record_success((i * 7 + t) % 1_000);
                            }
                        });
                    }
                });
                black_box(counters.load())
            });
        });
    }

    group.finish();
}

fn bench_snapshot_and_report(c: &mut Criterion) {
    let ring = SnapshotRing::new(Arc::new(StatCounters::new()));

    c.bench_function("take_snapshot", |b| b.iter(|| ring.take_snapshot()));
    c.bench_function("window_report", |b| b.iter(|| black_box(ring.window_report())));
}

criterion_group!(
    benches,
    bench_record_success,
    bench_contended_record_success,
    bench_snapshot_and_report
);
criterion_main!(benches);
