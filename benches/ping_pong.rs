//! Repeated epoch handoff throughput.
//!
//! Grounded on the sibling `kasync` executor's `ping_pong` bench, which
//! measures repeated suspend/resume round trips through a bare
//! `yield_now()`. This runtime has
//! no such bare suspension point — the unit of handoff here is one epoch
//! reaching the head of its queue and waking the next party — so the
//! closest analog is a long dependent chain of compound-assignment tasks,
//! each of which suspends until the previous one has committed.

use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use uni20_async::{clear_default_scheduler, set_default_scheduler, Async, DeterministicScheduler};

const ROUNDS: i64 = 10_000;

fn chain_of_10k_compound_assigns(c: &mut Criterion) {
    c.bench_function("chain_of_10k_compound_assigns", |b| {
        b.iter(|| {
            let sched = DeterministicScheduler::new();
            set_default_scheduler(Arc::new(sched.clone()));

            let mut total = Async::new(0i64);
            for _ in 0..ROUNDS {
                total += 1;
            }
            sched.run_all();
            assert_eq!(total.get_wait(&sched).unwrap(), ROUNDS);

            clear_default_scheduler();
        });
    });
}

criterion_group!(ping_pong, chain_of_10k_compound_assigns);
criterion_main!(ping_pong);
