// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Suspendable computations with scheduler-mediated resumption rights.
//!
//! A [`Task`] owns a boxed, pinned `Future<Output = ()>` (the user's future
//! is erased to `()` with its real output routed through a
//! [`crate::sync::oneshot`] channel to a [`JoinHandle`]). The "right to
//! resume" is tracked by [`TaskState`], replacing the original's
//! intrusive, atomically-shared coroutine handle: at most one party ever
//! holds `Scheduled`/`Polling` at a time, and a `Waker` firing while a task
//! is mid-poll is remembered (`PollingThenScheduled`) rather than lost or
//! double-submitted.

use std::cell::RefCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};

use crate::scheduler::Scheduler;
use crate::sync::oneshot;

pub mod builder;

/// Opaque task identifier, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(u64);

fn next_id() -> Id {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    Id(NEXT.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    /// Not scheduled; either never started or suspended awaiting a wake.
    Idle,
    /// Handed to the scheduler, not yet picked up by a worker.
    Scheduled,
    /// A worker is currently inside `Future::poll` for this task.
    Polling,
    /// Woken while `Polling`; must be resubmitted once the poll returns.
    PollingThenScheduled,
    /// The future returned `Poll::Ready(())`, panicked, or was cancelled.
    Completed,
}

pub(crate) struct Task {
    future: Mutex<Option<Pin<Box<dyn Future<Output = ()> + Send>>>>,
    state: Mutex<TaskState>,
    cancel_on_resume: AtomicBool,
    scheduler: Arc<dyn Scheduler>,
    id: Id,
    name: Option<&'static str>,
    preferred_node: Option<usize>,
}

/// A strong reference to a task, also usable as a `Waker` source.
#[derive(Clone)]
pub struct TaskRef(pub(crate) Arc<Task>);

impl TaskRef {
    pub fn id(&self) -> Id {
        self.0.id
    }

    pub fn name(&self) -> Option<&'static str> {
        self.0.name
    }

    /// The placement hint attached at spawn time, if any. Schedulers that
    /// partition their run queue (e.g. [`crate::scheduler::WorkerPool`]'s
    /// NUMA-node mode) may honor this; schedulers with a single queue
    /// ignore it.
    pub fn preferred_node(&self) -> Option<usize> {
        self.0.preferred_node
    }

    /// Flags the task to be dropped, not polled, the next time it would
    /// otherwise resume. Used by [`crate::combinators::OrCancel`] to
    /// propagate queue cancellation into task cancellation.
    pub(crate) fn cancel_on_resume(&self) {
        self.0.cancel_on_resume.store(true, Ordering::Release);
    }
}

impl Wake for Task {
    fn wake(self: Arc<Self>) {
        let should_submit = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            match *state {
                TaskState::Idle => {
                    *state = TaskState::Scheduled;
                    true
                }
                TaskState::Polling => {
                    *state = TaskState::PollingThenScheduled;
                    false
                }
                TaskState::Scheduled | TaskState::PollingThenScheduled | TaskState::Completed => {
                    false
                }
            }
        };
        if should_submit {
            let scheduler = Arc::clone(&self.scheduler);
            scheduler.reschedule(TaskRef(self));
        }
    }
}

/// Builds a task from a future and hands it straight to `scheduler`,
/// returning a handle to await its output.
pub(crate) fn spawn<F>(
    scheduler: Arc<dyn Scheduler>,
    name: Option<&'static str>,
    preferred_node: Option<usize>,
    future: F,
) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let wrapped: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
        let output = future.await;
        tx.send(output);
    });
    let task = Arc::new(Task {
        future: Mutex::new(Some(wrapped)),
        state: Mutex::new(TaskState::Scheduled),
        cancel_on_resume: AtomicBool::new(false),
        scheduler: Arc::clone(&scheduler),
        id: next_id(),
        name,
        preferred_node,
    });
    let task_ref = TaskRef(task);
    scheduler.submit(task_ref.clone());
    JoinHandle { receiver: rx, id: task_ref.id() }
}

thread_local! {
    /// The task currently being polled on this thread, if any. Lets an
    /// [`crate::combinators::OrCancel`] awaiter reach back to flag its own
    /// enclosing task for cancellation without a task needing to thread a
    /// handle to itself through every future it awaits; this is the
    /// `Waker`-free half of cancellation propagation (the woken half goes
    /// through the ordinary `Waker` machinery).
    static CURRENT_TASK: RefCell<Option<TaskRef>> = const { RefCell::new(None) };
}

/// Flags the task currently being polled on this thread for cancellation on
/// its next resume. Panics if called outside of `poll_task` (an
/// `or_cancel` awaiter should only ever run while a task is being polled).
pub(crate) fn cancel_current_task() {
    CURRENT_TASK.with(|cell| {
        let current = cell.borrow();
        let task = current
            .as_ref()
            .expect("cancel_current_task called outside of poll_task");
        task.cancel_on_resume();
    });
}

/// Polls `task` exactly once. Callers (schedulers) must only call this for
/// a task currently in the `Scheduled` state; violating that is a
/// programming error and panics, mirroring the C++ original's own
/// "polling an already-polling task" assertion.
pub(crate) fn poll_task(task: &TaskRef) {
    {
        let mut state = task.0.state.lock().unwrap_or_else(|p| p.into_inner());
        assert_eq!(
            *state,
            TaskState::Scheduled,
            "task {:?} polled while not in the Scheduled state (double-poll)",
            task.0.id
        );
        *state = TaskState::Polling;
    }

    if task.0.cancel_on_resume.load(Ordering::Acquire) {
        tracing::trace!(task = ?task.0.id, "dropping cancelled task frame");
        *task.0.future.lock().unwrap_or_else(|p| p.into_inner()) = None;
        *task.0.state.lock().unwrap_or_else(|p| p.into_inner()) = TaskState::Completed;
        return;
    }

    let waker = Waker::from(Arc::clone(&task.0));
    let mut cx = Context::from_waker(&waker);

    let previous = CURRENT_TASK.with(|cell| cell.borrow_mut().replace(task.clone()));
    let poll_result = {
        let mut slot = task.0.future.lock().unwrap_or_else(|p| p.into_inner());
        let fut = slot
            .as_mut()
            .expect("task polled after it already completed");
        std::panic::catch_unwind(AssertUnwindSafe(|| fut.as_mut().poll(&mut cx)))
    };
    CURRENT_TASK.with(|cell| *cell.borrow_mut() = previous);

    match poll_result {
        Ok(Poll::Ready(())) => {
            *task.0.future.lock().unwrap_or_else(|p| p.into_inner()) = None;
            *task.0.state.lock().unwrap_or_else(|p| p.into_inner()) = TaskState::Completed;
            tracing::trace!(task = ?task.0.id, "task completed");
        }
        Ok(Poll::Pending) => {
            if task.0.cancel_on_resume.load(Ordering::Acquire) {
                // An `or_cancel` awaiter flagged cancellation mid-poll: the
                // future registered no waker worth keeping (it will never
                // legitimately resume), so drop the frame now rather than
                // waiting for a resubmission that would never come.
                *task.0.future.lock().unwrap_or_else(|p| p.into_inner()) = None;
                *task.0.state.lock().unwrap_or_else(|p| p.into_inner()) = TaskState::Completed;
                tracing::trace!(task = ?task.0.id, "task cancelled mid-poll");
                return;
            }
            let mut state = task.0.state.lock().unwrap_or_else(|p| p.into_inner());
            match *state {
                TaskState::Polling => *state = TaskState::Idle,
                TaskState::PollingThenScheduled => {
                    *state = TaskState::Scheduled;
                    drop(state);
                    task.0.scheduler.reschedule(task.clone());
                }
                other => unreachable!("unexpected task state after poll: {other:?}"),
            }
        }
        Err(payload) => {
            *task.0.future.lock().unwrap_or_else(|p| p.into_inner()) = None;
            *task.0.state.lock().unwrap_or_else(|p| p.into_inner()) = TaskState::Completed;
            tracing::error!(task = ?task.0.id, "task panicked");
            std::panic::resume_unwind(payload);
        }
    }
}

/// A handle to a spawned task's eventual output.
pub struct JoinHandle<T> {
    receiver: oneshot::Receiver<T>,
    id: Id,
}

impl<T> JoinHandle<T> {
    pub fn id(&self) -> Id {
        self.id
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T, crate::error::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.receiver)
            .poll(cx)
            .map(|r| r.map_err(|_| crate::error::Error::Cancelled))
    }
}

/// Polls `future` exactly once with a no-op waker and returns the result
/// without suspending. Used by driving loops (`Scheduler::wait_for`
/// implementations, [`crate::value::Async::get_wait`]) that re-poll on
/// every loop iteration rather than relying on a real wake signal.
pub(crate) fn poll_once<F: Future + Unpin>(future: &mut F) -> Poll<F::Output> {
    struct NoopWake;
    impl Wake for NoopWake {
        fn wake(self: Arc<Self>) {}
        fn wake_by_ref(self: &Arc<Self>) {}
    }
    let waker = Waker::from(Arc::new(NoopWake));
    let mut cx = Context::from_waker(&waker);
    Pin::new(future).poll(&mut cx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::DeterministicScheduler;

    #[test]
    fn spawn_and_join_returns_output() {
        let sched = DeterministicScheduler::new();
        let handle = sched.spawn(async { 7 });
        sched.run_all();
        let mut handle = handle;
        match poll_once(&mut handle) {
            Poll::Ready(Ok(v)) => assert_eq!(v, 7),
            other => panic!("expected Ready(Ok(7)), got {other:?}"),
        }
    }
}
