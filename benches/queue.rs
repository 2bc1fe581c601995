//! Benchmarks for submission, round-trip latency and statistics snapshots

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use endpoint_queue::{PriorityTaskQueue, SlidingWindow, Tier};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn bench_round_trip(c: &mut Criterion) {
    let queue = PriorityTaskQueue::with_defaults("bench-round-trip");
    let token = CancellationToken::new();

    c.bench_function("queue/submit_and_wait", |b| {
        b.iter(|| {
            let handle = queue
                .submit(|_| Ok(black_box(1u64)), 0, Tier::Normal, &token)
                .unwrap();
            black_box(handle.wait().unwrap())
        });
    });
}

fn bench_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue/burst");
    let token = CancellationToken::new();

    for size in [16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let queue = PriorityTaskQueue::with_defaults("bench-burst");
            b.iter(|| {
                let handles: Vec<_> = (0..size)
                    .map(|i| {
                        let tier = Tier::ALL[i % Tier::COUNT];
                        queue
                            .submit(move |_| Ok(i), (i % 7) as i32, tier, &token)
                            .unwrap()
                    })
                    .collect();
                for handle in handles {
                    black_box(handle.wait().unwrap());
                }
            });
        });
    }
    group.finish();
}

fn bench_cancel_tier(c: &mut Criterion) {
    let token = CancellationToken::new();

    c.bench_function("queue/cancel_tier_1024", |b| {
        b.iter_batched(
            || {
                // Park the worker so the submissions stay queued
                let queue = PriorityTaskQueue::with_defaults("bench-cancel");
                let (release_tx, release_rx) = crossbeam::channel::bounded::<()>(1);
                let gate = queue
                    .submit(
                        move |_| {
                            let _ = release_rx.recv_timeout(Duration::from_secs(5));
                            Ok(())
                        },
                        0,
                        Tier::Emergency,
                        &token,
                    )
                    .unwrap();
                let handles: Vec<_> = (0..1024)
                    .map(|i| queue.submit(|_| Ok(()), i, Tier::Normal, &token).unwrap())
                    .collect();
                (queue, release_tx, gate, handles)
            },
            |(queue, release_tx, gate, handles)| {
                black_box(queue.cancel_tier(Tier::Normal));
                release_tx.send(()).unwrap();
                gate.wait().unwrap();
                drop(handles);
            },
            BatchSize::PerIteration,
        );
    });
}

fn bench_stats(c: &mut Criterion) {
    let queue = PriorityTaskQueue::with_defaults("bench-stats");
    let token = CancellationToken::new();
    for i in 0..1000 {
        queue
            .submit(|_| Ok(()), i, Tier::ALL[i as usize % Tier::COUNT], &token)
            .unwrap()
            .wait()
            .unwrap();
    }

    c.bench_function("queue/stats_snapshot", |b| {
        b.iter(|| black_box(queue.stats()));
    });
}

fn bench_sliding_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("sliding_window");

    for capacity in [10usize, 100, 1000] {
        let mut window = SlidingWindow::new(capacity);
        for i in 0..capacity as u64 {
            window.add_sample(Duration::from_micros(i));
        }

        group.bench_with_input(BenchmarkId::new("add_sample", capacity), &capacity, |b, _| {
            b.iter(|| window.add_sample(black_box(Duration::from_micros(42))));
        });
        group.bench_with_input(BenchmarkId::new("average", capacity), &capacity, |b, _| {
            b.iter(|| black_box(window.average()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_round_trip,
    bench_burst,
    bench_cancel_tier,
    bench_stats,
    bench_sliding_window
);
criterion_main!(benches);
