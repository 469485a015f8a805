// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A small builder for spawning tasks with optional metadata.
//!
//! Mirrors `async-exec`'s `TaskBuilder`: a handful of chained setters
//! ending in a method that actually constructs and submits the task. Its
//! `kind`/`location` fields (task-kind tagging and
//! `#[track_caller]` source locations for a multi-core kernel scheduler)
//! have no counterpart here; only the name survives, attached to
//! `tracing` spans around each poll, alongside a NUMA-node placement hint.

use std::future::Future;
use std::sync::Arc;

use crate::scheduler::Scheduler;
use crate::task::{self, JoinHandle};

/// Builds a task before submitting it to a scheduler.
pub struct TaskBuilder {
    scheduler: Arc<dyn Scheduler>,
    name: Option<&'static str>,
    preferred_node: Option<usize>,
}

impl TaskBuilder {
    pub(crate) fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        TaskBuilder {
            scheduler,
            name: None,
            preferred_node: None,
        }
    }

    /// Attaches a name, surfaced in `tracing` spans around this task's
    /// polls.
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// Hints that this task should run on NUMA node `node`, for schedulers
    /// that partition their run queue by node (e.g.
    /// [`crate::scheduler::WorkerPool`]). Ignored by schedulers with a
    /// single queue.
    pub fn preferred_node(mut self, node: usize) -> Self {
        self.preferred_node = Some(node);
        self
    }

    /// Submits `future` to the scheduler this builder was created from.
    pub fn spawn<F>(self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        task::spawn(self.scheduler, self.name, self.preferred_node, future)
    }
}
