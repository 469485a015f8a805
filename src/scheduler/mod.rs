// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The scheduler interface and its two reference implementations.
//!
//! Grounded on `async-exec`'s `Schedule` trait (`executor.rs`,
//! `scheduler.rs`): a small object-safe trait that both reference
//! schedulers, and any external one (e.g. a tensor-library scheduler
//! wired in from outside this crate), implement. Unlike `async-exec`'s
//! lock-free `MpscQueue`-backed `Scheduler`, both implementations here use
//! a plain `Mutex`-guarded queue — matching the original C++'s own
//! `std::mutex`-based schedulers (`debug_scheduler.hpp`,
//! `tbb_numa_scheduler.hpp`) more closely than a lock-free translation
//! would.

mod deterministic;
mod pool;

pub use deterministic::DeterministicScheduler;
pub use pool::{WorkerPool, WorkerPoolBuilder};

use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock};

use crate::task::builder::TaskBuilder;
use crate::task::{JoinHandle, TaskRef};

/// The minimal interface a task scheduler must provide.
///
/// Both reference schedulers are thin handles around shared state, so
/// wrapping one in an `Arc<dyn Scheduler>` is one allocation for the trait
/// object plus an `Arc` bump, never a deep copy.
pub trait Scheduler: Send + Sync {
    /// Initial submission of a freshly constructed, `Scheduled` task.
    fn submit(&self, task: TaskRef);

    /// Re-submission after a suspended task's waker fired. The default
    /// implementation forwards to `submit`; reference schedulers override
    /// it only when resubmission needs different bookkeeping (neither
    /// does, today, but the split mirrors the original `IScheduler`'s
    /// private `reschedule` distinct from public `schedule`).
    fn reschedule(&self, task: TaskRef) {
        self.submit(task);
    }

    /// Gates new work: submitted tasks queue but do not run while paused.
    fn pause(&self);

    /// Un-gates work paused by `pause`.
    fn resume(&self);

    /// Blocks the calling thread, driving progress however this scheduler
    /// sees fit, until `predicate` returns `true`.
    fn wait_for(&self, predicate: &mut dyn FnMut() -> bool);
}

/// Starts building a task to run on `scheduler`.
///
/// `scheduler` must be an owned, type-erased handle: a [`Task`] records its
/// scheduler so that a `Waker` firing long after the call that spawned it
/// can still reach it (see [`crate::task::Task`]).
///
/// [`Task`]: crate::task::Task
pub fn task_builder(scheduler: Arc<dyn Scheduler>) -> TaskBuilder {
    TaskBuilder::new(scheduler)
}

/// Convenience free function: spawns `future` on `scheduler` with no name.
pub fn spawn<F>(scheduler: Arc<dyn Scheduler>, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    task_builder(scheduler).spawn(future)
}

fn default_scheduler_slot() -> &'static Mutex<Option<Arc<dyn Scheduler>>> {
    static SLOT: OnceLock<Mutex<Option<Arc<dyn Scheduler>>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(None))
}

/// Installs `scheduler` as the process-wide default, used by the arithmetic
/// surface ([`crate::ops`]) when it launches a task without an explicit
/// scheduler argument.
///
/// Call sites are expected to balance this with [`clear_default_scheduler`];
/// the crate does not reference-count installs.
pub fn set_default_scheduler(scheduler: Arc<dyn Scheduler>) {
    *default_scheduler_slot()
        .lock()
        .unwrap_or_else(|p| p.into_inner()) = Some(scheduler);
}

/// Removes whatever scheduler [`set_default_scheduler`] installed, if any.
pub fn clear_default_scheduler() {
    *default_scheduler_slot()
        .lock()
        .unwrap_or_else(|p| p.into_inner()) = None;
}

/// Returns the process-wide default scheduler, if one is installed.
pub fn default_scheduler() -> Option<Arc<dyn Scheduler>> {
    default_scheduler_slot()
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .clone()
}

/// Returns the process-wide default scheduler.
///
/// # Panics
///
/// Panics if none was installed via [`set_default_scheduler`]; launching an
/// operator-surface task with nowhere to run it is a programming error.
pub(crate) fn require_default_scheduler() -> Arc<dyn Scheduler> {
    default_scheduler().expect(
        "no default scheduler installed; call uni20_async::scheduler::set_default_scheduler first",
    )
}
