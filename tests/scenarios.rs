//! End-to-end scenarios exercising the full read/write/mutate/epoch stack
//! together, rather than one module in isolation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use uni20_async::{
    all2, all_vec, async_negate, clear_default_scheduler, maybe, or_cancel, set_default_scheduler, Async,
    DeterministicScheduler, Error, ReverseValue,
};

/// Scenario A — linear chain: repeatedly `a = a + 1`, 100 times, on the
/// deterministic scheduler.
#[test]
fn linear_chain_of_a_hundred_additions() {
    let sched = DeterministicScheduler::new();
    set_default_scheduler(Arc::new(sched.clone()));

    let mut a = Async::new(0i64);
    for _ in 0..100 {
        a += 1;
    }
    sched.run_all();
    assert_eq!(a.get_wait(&sched).unwrap(), 100);

    clear_default_scheduler();
}

/// Scenario B — diamond reduction: square each of `1..=1000` and
/// pairwise-sum via a balanced tree built from the `+` operator.
#[test]
fn diamond_reduction_of_squares() {
    let sched = DeterministicScheduler::new();
    set_default_scheduler(Arc::new(sched.clone()));

    let mut level: Vec<Async<i64>> = (1..=1000i64).map(|i| Async::new(i * i)).collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut pairs = level.into_iter();
        while let Some(lhs) = pairs.next() {
            match pairs.next() {
                Some(rhs) => next.push(&lhs + &rhs),
                None => next.push(lhs),
            }
        }
        level = next;
    }
    sched.run_all();

    let total = level.into_iter().next().unwrap();
    assert_eq!(total.get_wait(&sched).unwrap(), 333_833_500);

    clear_default_scheduler();
}

/// Scenario C — blocked `all`: a task awaiting both `x` and `y` only
/// produces a result once both have been committed, in whatever order their
/// writers actually ran.
#[test]
fn blocked_all_resumes_once_both_operands_commit() {
    let sched = DeterministicScheduler::new();
    let x: Async<i32> = Async::uninitialized();
    let y: Async<i32> = Async::uninitialized();
    let result = Arc::new(Mutex::new(None));

    let rx = x.read();
    let ry = y.read();
    let result_for_task = Arc::clone(&result);
    sched.spawn(async move {
        let (vx, vy) = all2(rx, ry).await;
        *result_for_task.lock().unwrap() = Some(vx.unwrap().get() + vy.unwrap().get());
    });

    sched.run_all();
    assert!(result.lock().unwrap().is_none(), "neither operand written yet");

    let wx = x.write();
    sched.spawn(async move {
        wx.await.write(3);
    });
    sched.run_all();
    assert!(result.lock().unwrap().is_none(), "y still uncommitted");

    let wy = y.write();
    sched.spawn(async move {
        wy.await.write(4);
    });
    sched.run_all();

    assert_eq!(*result.lock().unwrap(), Some(7));
}

/// Scenario D — cancellation through mutate: an unused, dropped mutate
/// token commits the existing value unchanged.
#[test]
fn dropped_mutate_token_passes_existing_value_through() {
    let sched = DeterministicScheduler::new();
    let a = Async::new(10);

    drop(a.mutate());

    assert_eq!(a.get_wait(&sched).unwrap(), 10);
}

/// Scenario E — write drop cancels reader: a dropped, uncommitted write
/// token cancels every accessor waiting on that epoch, each observing
/// cancellation the way its own accessor contract promises.
#[test]
fn dropped_write_token_cancels_downstream_accessors() {
    let sched = DeterministicScheduler::new();
    let a = Async::new(10);

    drop(a.write());

    match a.get_wait(&sched) {
        Err(Error::NotConstructed) => {}
        other => panic!("expected Err(Error::NotConstructed), got {other:?}"),
    }

    let soft_result = Arc::new(Mutex::new(None));
    let soft_result_for_task = Arc::clone(&soft_result);
    let soft_read = maybe(a.read());
    sched.spawn(async move {
        *soft_result_for_task.lock().unwrap() = Some(soft_read.await);
    });
    sched.run_all();
    assert_eq!(soft_result.lock().unwrap().take(), Some(None));

    let cancelled = Arc::new(AtomicBool::new(false));
    let cancelled_in_task = Arc::clone(&cancelled);
    let read = a.read();
    let handle = sched.spawn(async move {
        let _ = or_cancel(read).await;
        // Never reached: `or_cancel` drops this task's frame on cancellation.
        cancelled_in_task.store(true, Ordering::Release);
    });
    sched.run_all();
    assert!(!cancelled.load(Ordering::Acquire));
    assert!(futures::executor::block_on(handle).is_err());
}

/// Scenario F — reverse chain: `y = sin(x)` at `x = 0.1` with upstream
/// gradient seed `1.0` accumulates to `cos(0.1)` at `x`'s gradient.
#[test]
fn reverse_chain_through_sine_matches_cosine_derivative() {
    let sched = DeterministicScheduler::new();
    set_default_scheduler(Arc::new(sched.clone()));

    let x = Async::new(0.1f64);
    let y = Async::uninitialized();
    async_negate(&x, &y, |v: f64| v.sin());
    sched.run_all();
    assert!((y.get_wait(&sched).unwrap() - 0.1f64.sin()).abs() < 1e-9);

    let mut y_grad = ReverseValue::<f64>::new();
    y_grad.set(1.0);
    sched.run_all();

    let cos_x = Async::uninitialized();
    async_negate(&x, &cos_x, |v: f64| v.cos());
    sched.run_all();

    let local_contribution = y_grad.value() * &cos_x;
    let mut x_grad = ReverseValue::<f64>::new();
    x_grad += &local_contribution;
    sched.run_all();

    let dx = x_grad.finish_wait(&sched).unwrap();
    assert!((dx - 0.1f64.cos()).abs() < 1e-9, "got {dx}");

    clear_default_scheduler();
}

/// Boundary case: `all_vec` with zero operands is immediately ready.
#[test]
fn all_vec_of_zero_futures_is_immediately_ready() {
    let sched = DeterministicScheduler::new();
    let result: Arc<Mutex<Option<Vec<i32>>>> = Arc::new(Mutex::new(None));
    let result_for_task = Arc::clone(&result);
    sched.spawn(async move {
        let empty: Vec<Async<i32>> = Vec::new();
        let reads: Vec<_> = empty.iter().map(Async::read).collect();
        *result_for_task.lock().unwrap() = Some(
            all_vec(reads)
                .await
                .into_iter()
                .map(|r| r.unwrap().get())
                .collect(),
        );
    });
    sched.run_all();
    assert_eq!(result.lock().unwrap().take(), Some(Vec::new()));
}

/// Boundary case: an `Async` with no initial value and no writer leaves a
/// strict reader parked forever; a bounded number of scheduler ticks makes
/// no progress on it.
#[test]
fn uninitialized_value_never_progresses_without_a_writer() {
    let sched = DeterministicScheduler::new();
    let a: Async<i32> = Async::uninitialized();
    let resumed = Arc::new(AtomicUsize::new(0));
    let resumed_in_task = Arc::clone(&resumed);
    let read = a.read();
    sched.spawn(async move {
        let _ = read.await;
        resumed_in_task.fetch_add(1, Ordering::Release);
    });
    for _ in 0..50 {
        sched.run();
    }
    assert_eq!(resumed.load(Ordering::Acquire), 0);
}
