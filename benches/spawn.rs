//! Raw task spawn/resume throughput, on each reference scheduler.
//!
//! Grounded on the sibling `async`/`kasync2` executor's `spawn` bench:
//! measure how many trivial tasks a scheduler can push through end to end.

use criterion::{criterion_group, criterion_main, Criterion};
use uni20_async::{DeterministicScheduler, WorkerPool};

const TASKS: usize = 10_000;

fn spawn_10k_deterministic(c: &mut Criterion) {
    c.bench_function("spawn_10k_deterministic", |b| {
        b.iter(|| {
            let sched = DeterministicScheduler::new();
            for _ in 0..TASKS {
                sched.spawn(async {});
            }
            sched.run_all();
        });
    });
}

fn spawn_10k_worker_pool(c: &mut Criterion) {
    c.bench_function("spawn_10k_worker_pool", |b| {
        b.iter(|| {
            let pool = WorkerPool::builder().workers(4).build();
            let handles: Vec<_> = (0..TASKS).map(|_| pool.spawn(async {})).collect();
            for handle in handles {
                futures::executor::block_on(handle).unwrap();
            }
        });
    });
}

criterion_group!(spawn, spawn_10k_deterministic, spawn_10k_worker_pool);
criterion_main!(spawn);
