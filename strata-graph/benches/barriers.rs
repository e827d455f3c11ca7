//! Barrier Round-Trip Benchmarks
//!
//! Compares the custom spin barrier against the blocking `std::sync::Barrier`
//! on back-to-back rendezvous rounds, the pattern the per-iteration loop
//! produces. The spin barrier's advantage is avoiding kernel transitions on
//! the hot path; this suite quantifies it per participant count.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use strata_graph::barrier::{SpinBarrier, SpinWaiter};

const ROUNDS: u64 = 1_000;

/// Wall-clock for `ROUNDS` spin-barrier rendezvous across `n` threads.
fn spin_rounds(n: usize) -> Duration {
    let barrier = Arc::new(SpinBarrier::new(n));
    let start_gate = Arc::new(Barrier::new(n + 1));

    let handles: Vec<_> = (0..n)
        .map(|_| {
            let mut waiter = SpinWaiter::new(Arc::clone(&barrier));
            let gate = Arc::clone(&start_gate);
            std::thread::spawn(move || {
                gate.wait();
                for _ in 0..ROUNDS {
                    waiter.wait();
                }
            })
        })
        .collect();

    start_gate.wait();
    let start = Instant::now();
    for h in handles {
        h.join().unwrap();
    }
    start.elapsed()
}

/// Wall-clock for `ROUNDS` blocking-barrier rendezvous across `n` threads.
fn blocking_rounds(n: usize) -> Duration {
    let barrier = Arc::new(Barrier::new(n));
    let start_gate = Arc::new(Barrier::new(n + 1));

    let handles: Vec<_> = (0..n)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let gate = Arc::clone(&start_gate);
            std::thread::spawn(move || {
                gate.wait();
                for _ in 0..ROUNDS {
                    barrier.wait();
                }
            })
        })
        .collect();

    start_gate.wait();
    let start = Instant::now();
    for h in handles {
        h.join().unwrap();
    }
    start.elapsed()
}

fn bench_barriers(c: &mut Criterion) {
    let max = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(2);
    let mut group = c.benchmark_group("barrier_rounds");
    group.throughput(Throughput::Elements(ROUNDS));
    group.sample_size(10);

    for &n in &[2usize, 4, 8] {
        if n > max {
            continue;
        }
        group.bench_with_input(BenchmarkId::new("spin", n), &n, |b, &n| {
            b.iter_custom(|iters| (0..iters).map(|_| spin_rounds(n)).sum());
        });
        group.bench_with_input(BenchmarkId::new("blocking", n), &n, |b, &n| {
            b.iter_custom(|iters| (0..iters).map(|_| blocking_rounds(n)).sum());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_barriers);
criterion_main!(benches);
