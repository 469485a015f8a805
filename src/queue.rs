// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Per-value FIFO of epochs.
//!
//! Grounded directly on `epoch_queue.hpp`'s `EpochQueue`: a `VecDeque` of
//! epoch handles under one `Mutex`, with `create_read_context` /
//! `create_write_context` as the two entry points tokens are built from,
//! and `advance()` as the single place that decides who gets woken next.
//! The original's `bootstrapped_` / `initial_writer_pending_` /
//! `initial_value_initialized_` trio collapses here into one
//! `initial_writer_pending` flag plus the choice of bootstrap epoch
//! (`Epoch::pending()` vs `Epoch::already_written()`).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::epoch::{Epoch, WriteState};
use crate::error::EpochFailure;

struct Inner {
    epochs: VecDeque<Arc<Epoch>>,
    /// True only until the very first write token has been issued against
    /// the bootstrap epoch of a value constructed without an initial value.
    initial_writer_pending: bool,
}

/// FIFO of epochs for one value. Shared by every token and task that
/// touches that value.
pub(crate) struct EpochQueue {
    inner: Mutex<Inner>,
}

impl EpochQueue {
    /// A queue for a value with no initial writer: a single pending
    /// bootstrap epoch, reusable by the very first write token.
    pub(crate) fn new_uninitialized() -> Self {
        EpochQueue {
            inner: Mutex::new(Inner {
                epochs: VecDeque::from([Arc::new(Epoch::pending())]),
                initial_writer_pending: true,
            }),
        }
    }

    /// A queue for a value that already has a committed initial value.
    pub(crate) fn new_initialized() -> Self {
        EpochQueue {
            inner: Mutex::new(Inner {
                epochs: VecDeque::from([Arc::new(Epoch::already_written())]),
                initial_writer_pending: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Attaches a reader to the tail epoch.
    pub(crate) fn create_read_context(&self) -> Arc<Epoch> {
        let epoch = Arc::clone(self.lock().epochs.back().expect("queue is never empty"));
        epoch.register_reader_token();
        epoch
    }

    /// Attaches a writer: reuses the bootstrap epoch if it has never had a
    /// writer, otherwise appends a fresh epoch at the tail. Opportunistically
    /// prunes any epochs at the head that are already fully drained.
    pub(crate) fn create_write_context(&self) -> Arc<Epoch> {
        let mut guard = self.lock();
        let epoch = if guard.initial_writer_pending {
            guard.initial_writer_pending = false;
            Arc::clone(guard.epochs.back().expect("queue is never empty"))
        } else {
            let fresh = Arc::new(Epoch::pending());
            guard.epochs.push_back(Arc::clone(&fresh));
            fresh
        };
        Self::prune_locked(&mut guard);
        epoch
    }

    /// `true` if `epoch` is currently at the front of the queue.
    pub(crate) fn is_head(&self, epoch: &Arc<Epoch>) -> bool {
        self.lock()
            .epochs
            .front()
            .is_some_and(|head| Arc::ptr_eq(head, epoch))
    }

    fn prune_locked(guard: &mut MutexGuard<'_, Inner>) {
        while guard.epochs.len() > 1 {
            match guard.epochs.front() {
                Some(head) if head.is_drained() => {
                    guard.epochs.pop_front();
                }
                _ => break,
            }
        }
    }

    /// A writer finished, successfully or not. Marks the epoch and advances
    /// the queue.
    pub(crate) fn on_writer_done(&self, epoch: &Arc<Epoch>, outcome: Result<(), EpochFailure>) {
        match outcome {
            Ok(()) => epoch.mark_written(),
            Err(failure) => epoch.mark_error(failure),
        }
        self.advance();
    }

    /// A reader token was released (dropped or explicitly released).
    pub(crate) fn on_reader_released(&self, epoch: &Arc<Epoch>) {
        epoch.release_reader_token();
        self.advance();
    }

    /// Inspects the head epoch and wakes whichever party can now make
    /// progress, pruning fully-drained epochs along the way. Idempotent:
    /// calling it when nothing changed is a harmless no-op.
    pub(crate) fn advance(&self) {
        loop {
            let mut guard = self.lock();
            let Some(head) = guard.epochs.front().cloned() else {
                return;
            };
            if guard.epochs.len() > 1 && head.is_drained() {
                guard.epochs.pop_front();
                continue;
            }
            drop(guard);
            match head.write_state() {
                WriteState::Pending => {
                    if let Some(waker) = head.take_writer_waker() {
                        waker.wake();
                    }
                }
                WriteState::Written | WriteState::Error(_) => {
                    for waker in head.take_reader_wakers() {
                        waker.wake();
                    }
                }
            }
            return;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().epochs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_uninitialized_queue_reuses_bootstrap_epoch_once() {
        let q = EpochQueue::new_uninitialized();
        let w1 = q.create_write_context();
        assert_eq!(q.len(), 1);
        let w2 = q.create_write_context();
        assert_eq!(q.len(), 2);
        assert!(!Arc::ptr_eq(&w1, &w2));
    }

    #[test]
    fn initialized_queue_starts_written_and_at_head() {
        let q = EpochQueue::new_initialized();
        let r = q.create_read_context();
        assert!(q.is_head(&r));
        assert!(matches!(r.write_state(), WriteState::Written));
    }

    #[test]
    fn writer_done_prunes_once_reader_released() {
        let q = EpochQueue::new_initialized();
        let first = q.create_read_context();
        let second_writer = q.create_write_context();
        assert_eq!(q.len(), 2);
        q.on_reader_released(&first);
        // first epoch still drained-pending because second writer hasn't
        // committed, but it has no more reader tokens and the writer was
        // already done, so it should have been pruned.
        assert!(q.is_head(&second_writer));
        assert_eq!(q.len(), 1);
    }
}
