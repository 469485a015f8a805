// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A single-threaded, deterministic scheduler for tests.
//!
//! Grounded directly on `debug_scheduler.hpp`'s `DebugScheduler`: tasks
//! accumulate in a `Vec` used as a LIFO; `run()` swaps the whole batch out,
//! reverses it (LIFO push order becomes FIFO resumption order), and polls
//! each task once. `run_all()` repeats until nothing is left to run.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::scheduler::Scheduler;
use crate::task::{self, JoinHandle, TaskRef};

struct Inner {
    queue: Mutex<Vec<TaskRef>>,
    paused: AtomicBool,
}

/// A deterministic, single-threaded scheduler with FIFO resumption order.
///
/// Cheap to clone: clones share the same underlying queue.
#[derive(Clone)]
pub struct DeterministicScheduler {
    inner: Arc<Inner>,
}

impl DeterministicScheduler {
    pub fn new() -> Self {
        DeterministicScheduler {
            inner: Arc::new(Inner {
                queue: Mutex::new(Vec::new()),
                paused: AtomicBool::new(false),
            }),
        }
    }

    /// Spawns `future` directly on this scheduler.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle: Arc<dyn Scheduler> = Arc::new(self.clone());
        crate::scheduler::spawn(handle, future)
    }

    /// Runs one batch of currently-queued tasks in FIFO order. Returns
    /// `true` if any task was polled.
    pub fn run(&self) -> bool {
        if self.inner.paused.load(Ordering::Acquire) {
            return false;
        }
        let mut batch = {
            let mut queue = self.inner.queue.lock().unwrap_or_else(|p| p.into_inner());
            std::mem::take(&mut *queue)
        };
        if batch.is_empty() {
            return false;
        }
        batch.reverse();
        for task in &batch {
            task::poll_task(task);
        }
        true
    }

    /// Runs batches until none remain (quiescence).
    pub fn run_all(&self) {
        while self.run() {}
    }
}

impl Default for DeterministicScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for DeterministicScheduler {
    fn submit(&self, task: TaskRef) {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(task);
    }

    fn pause(&self) {
        self.inner.paused.store(true, Ordering::Release);
    }

    fn resume(&self) {
        self.inner.paused.store(false, Ordering::Release);
    }

    fn wait_for(&self, predicate: &mut dyn FnMut() -> bool) {
        loop {
            if predicate() {
                return;
            }
            self.run();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn linear_chain_of_a_hundred_tasks_resumes_in_order() {
        let sched = DeterministicScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..100 {
            let order = Arc::clone(&order);
            sched.spawn(async move {
                order.lock().unwrap().push(i);
            });
        }
        sched.run_all();
        assert_eq!(*order.lock().unwrap(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn paused_scheduler_does_not_run_queued_tasks() {
        let sched = DeterministicScheduler::new();
        sched.pause();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        sched.spawn(async move {
            ran2.fetch_add(1, Ordering::Relaxed);
        });
        assert!(!sched.run());
        assert_eq!(ran.load(Ordering::Relaxed), 0);
        sched.resume();
        sched.run_all();
        assert_eq!(ran.load(Ordering::Relaxed), 1);
    }
}
