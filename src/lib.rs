// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A dataflow runtime for asynchronous values.
//!
//! An [`Async<T>`](value::Async) is a shared, lazily-constructed cell plus
//! an epoch queue that enforces writer -> readers -> next-writer ordering
//! for every access. Four move-only token types ([`token::ReadToken`],
//! [`token::WriteToken`], [`token::MutateToken`], [`token::EmplaceToken`])
//! are `Future`s that resolve once their epoch reaches the head of its
//! value's queue; the [`scheduler`] module drives tasks built from them.
//! [`ops`] and [`reverse`] build an arithmetic/autodiff surface on top.
//!
//! Grounded throughout on `async-exec`'s module layout (a small
//! object-safe scheduler trait, `tracing`-instrumented task lifecycle,
//! `thiserror`-typed errors) and, for the epoch/token/queue core, on the
//! C++ original's `epoch_queue.hpp`/`epoch_context.hpp`/`buffers.hpp` —
//! see `DESIGN.md` for the full grounding ledger.

mod cell;
mod combinators;
mod epoch;
mod error;
mod ops;
mod queue;
mod reverse;
mod scheduler;
mod sync;
mod task;
mod token;
mod value;

pub use cell::{SharedCell, WeakCell};
pub use combinators::{
    all2, all3, all_vec, maybe, or_cancel, write_to, All2, All3, Maybe, OrCancel, StrictResult,
};
pub use error::{Error, Result};
pub use ops::{assign, async_binary_op, async_compound_op, async_negate};
pub use reverse::ReverseValue;
pub use scheduler::{
    clear_default_scheduler, default_scheduler, set_default_scheduler, spawn, task_builder, DeterministicScheduler,
    Scheduler, WorkerPool, WorkerPoolBuilder,
};
pub use task::builder::TaskBuilder;
pub use task::{Id as TaskId, JoinHandle, TaskRef};
pub use token::{EmplaceGuard, EmplaceToken, MutateGuard, MutateToken, ReadGuard, ReadToken, WriteGuard, WriteToken};
pub use value::Async;
