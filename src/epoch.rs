// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Per-epoch write state machine and reader wait list.
//!
//! One [`Epoch`] is one generation of write/read ordering, grounded on
//! `epoch_context.hpp`'s `EpochContext`/`EpochState` pair. Unlike the C++
//! coroutine model, which distinguishes a `required_unbound` state (no
//! writer task attached yet) from a `bound` state (writer handle stored but
//! not yet resumed), Rust's `Poll`/`Waker` model collapses both into a
//! single `Pending` state: a writer that has not yet reached the head of
//! the queue simply has not had its `Waker` invoked yet. See `DESIGN.md`
//! for the full rationale.

use std::sync::Mutex;
use std::task::Waker;

use crate::error::EpochFailure;

/// The write-state of one epoch.
#[derive(Debug, Clone)]
pub(crate) enum WriteState {
    /// No writer has committed yet (covers both the C++ original's
    /// `required_unbound` and `bound` states).
    Pending,
    /// The writer committed a value.
    Written,
    /// The writer was dropped without committing, or panicked.
    Error(EpochFailure),
}

#[derive(Debug)]
struct Inner {
    write: WriteState,
    /// The writer's `Waker`, stored once it has polled and found itself not
    /// yet at the head of the queue.
    writer_waker: Option<Waker>,
    /// Suspended readers' wakers.
    readers: Vec<Waker>,
    /// Outstanding reader *tokens* (not tasks) — a token dropped before
    /// ever being polled still counts here until drop.
    reader_tokens: usize,
}

/// One generation of read/write ordering for a single [`crate::value::Async`].
#[derive(Debug)]
pub(crate) struct Epoch {
    inner: Mutex<Inner>,
}

impl Epoch {
    /// A freshly created epoch awaiting its writer.
    pub(crate) fn pending() -> Self {
        Epoch {
            inner: Mutex::new(Inner {
                write: WriteState::Pending,
                writer_waker: None,
                readers: Vec::new(),
                reader_tokens: 0,
            }),
        }
    }

    /// A bootstrap epoch that already holds a committed value (used by
    /// `Async::new(value)`).
    pub(crate) fn already_written() -> Self {
        Epoch {
            inner: Mutex::new(Inner {
                write: WriteState::Written,
                writer_waker: None,
                readers: Vec::new(),
                reader_tokens: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Increments the outstanding reader-token count and returns the
    /// current write state (cloned, since callers need to branch on it
    /// without holding the lock across a wake).
    pub(crate) fn register_reader_token(&self) {
        self.lock().reader_tokens += 1;
    }

    /// Current write state, cheaply cloned.
    pub(crate) fn write_state(&self) -> WriteState {
        self.lock().write.clone()
    }

    /// Stores `waker` as the writer's waker. Only ever called by the single
    /// writer of this epoch, so there is no concurrent-writer race to guard
    /// against.
    pub(crate) fn park_writer(&self, waker: Waker) {
        self.lock().writer_waker = Some(waker);
    }

    /// Stores `waker` in the reader wait list.
    pub(crate) fn park_reader(&self, waker: Waker) {
        self.lock().readers.push(waker);
    }

    /// Marks the epoch written. Does not itself wake anyone — the queue's
    /// `advance()` is the single place that drains and wakes readers, so
    /// that a reader parked before *and* after this transition is woken
    /// exactly once either way.
    pub(crate) fn mark_written(&self) {
        self.lock().write = WriteState::Written;
    }

    /// Marks the epoch failed (cancelled or panicked).
    pub(crate) fn mark_error(&self, failure: EpochFailure) {
        self.lock().write = WriteState::Error(failure);
    }

    /// Takes the writer's parked waker, if any.
    pub(crate) fn take_writer_waker(&self) -> Option<Waker> {
        self.lock().writer_waker.take()
    }

    /// Takes every parked reader waker.
    pub(crate) fn take_reader_wakers(&self) -> Vec<Waker> {
        std::mem::take(&mut self.lock().readers)
    }

    /// Decrements the reader-token count, returning the new count.
    pub(crate) fn release_reader_token(&self) -> usize {
        let mut guard = self.lock();
        guard.reader_tokens = guard.reader_tokens.saturating_sub(1);
        guard.reader_tokens
    }

    /// Returns `true` once the writer is done (written or errored) *and*
    /// there are no outstanding reader tokens.
    pub(crate) fn is_drained(&self) -> bool {
        let guard = self.lock();
        !matches!(guard.write, WriteState::Pending) && guard.reader_tokens == 0
    }

    pub(crate) fn writer_is_done(&self) -> bool {
        !matches!(self.lock().write, WriteState::Pending)
    }

    pub(crate) fn reader_tokens(&self) -> usize {
        self.lock().reader_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::task::Wake;

    struct Noop;
    impl Wake for Noop {
        fn wake(self: std::sync::Arc<Self>) {}
    }

    fn waker() -> Waker {
        Waker::from(std::sync::Arc::new(Noop))
    }

    #[test]
    fn fresh_epoch_is_pending() {
        let e = Epoch::pending();
        assert!(matches!(e.write_state(), WriteState::Pending));
        assert!(!e.writer_is_done());
    }

    #[test]
    fn marking_written_then_draining_readers() {
        let e = Epoch::pending();
        e.park_reader(waker());
        e.park_reader(waker());
        e.mark_written();
        assert_eq!(e.take_reader_wakers().len(), 2);
        assert!(e.writer_is_done());
    }

    #[test]
    fn reader_token_accounting() {
        let e = Epoch::already_written();
        e.register_reader_token();
        e.register_reader_token();
        assert_eq!(e.reader_tokens(), 2);
        assert_eq!(e.release_reader_token(), 1);
        assert!(!e.is_drained());
        assert_eq!(e.release_reader_token(), 0);
        assert!(e.is_drained());
    }
}
