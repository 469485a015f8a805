// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Move-only access tokens: read, write, mutate, emplace.
//!
//! Each token is a `Future` that resolves once its epoch reaches the head
//! of the queue in the right write state; resolving hands back a guard that
//! exposes the value and commits (or, for reads, releases) on drop. This
//! mirrors `buffers.hpp`'s `ReadBuffer<T>`/`WriteBuffer<T>` pair, with the
//! commit-on-drop behavior folded into `Drop` impls instead of a C++
//! destructor, and `&T`/`&mut T` access expressed through closures over the
//! cell's mutex rather than a raw borrow, since nothing here can assume a
//! coroutine frame keeping the guard's backing storage pinned in place.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::epoch::{Epoch, WriteState};
use crate::error::{EpochFailure, Error};
use crate::value::ValueInner;
use std::sync::Arc;

pub(crate) struct TokenCore<T> {
    pub(crate) value: Arc<ValueInner<T>>,
    pub(crate) epoch: Arc<Epoch>,
}

impl<T> TokenCore<T> {
    pub(crate) fn new(value: Arc<ValueInner<T>>, epoch: Arc<Epoch>) -> Self {
        TokenCore { value, epoch }
    }
}

// ---------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------

/// A pending read of one epoch of an [`crate::Async`] value.
///
/// Ready once its epoch is both at the head of the queue and written.
/// Dropping the token before it resolves releases its reservation without
/// affecting the epoch's write state (reads never cancel a writer).
pub struct ReadToken<T> {
    state: Option<TokenCore<T>>,
}

impl<T> ReadToken<T> {
    pub(crate) fn new(core: TokenCore<T>) -> Self {
        ReadToken { state: Some(core) }
    }
}

impl<T> Future for ReadToken<T> {
    type Output = Result<ReadGuard<T>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let core = this
            .state
            .as_ref()
            .expect("ReadToken polled after completion");

        if !core.value.queue.is_head(&core.epoch) {
            core.epoch.park_reader(cx.waker().clone());
            return Poll::Pending;
        }

        match core.epoch.write_state() {
            WriteState::Pending => {
                core.epoch.park_reader(cx.waker().clone());
                Poll::Pending
            }
            WriteState::Written => {
                let core = this.state.take().unwrap();
                Poll::Ready(Ok(ReadGuard { core, done: false }))
            }
            WriteState::Error(failure) => {
                let core = this.state.take().unwrap();
                core.value.queue.on_reader_released(&core.epoch);
                Poll::Ready(Err(failure.into_error()))
            }
        }
    }
}

impl<T> Drop for ReadToken<T> {
    fn drop(&mut self) {
        if let Some(core) = self.state.take() {
            core.value.queue.on_reader_released(&core.epoch);
        }
    }
}

/// A resolved read: shared access to the committed value of one epoch.
pub struct ReadGuard<T> {
    core: TokenCore<T>,
    done: bool,
}

impl<T> ReadGuard<T> {
    /// Runs `f` with a shared reference to the value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.core
            .value
            .cell
            .with(f)
            .expect("a written epoch always has a constructed cell")
    }

    /// Clones the value out.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(Clone::clone)
    }

    /// Releases the token early; equivalent to dropping it, but named for
    /// call sites where that reads more clearly.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.done {
            self.done = true;
            self.core.value.queue.on_reader_released(&self.core.epoch);
        }
    }
}

impl<T> Drop for ReadGuard<T> {
    fn drop(&mut self) {
        self.release_once();
    }
}

// ---------------------------------------------------------------------
// Write
// ---------------------------------------------------------------------

/// A pending write to a fresh epoch.
///
/// Ready once its epoch reaches the head of the queue. Dropping the token
/// before it resolves cancels the epoch: every reader waiting on it (and
/// any later epoch's writer) observes [`Error::NotConstructed`].
pub struct WriteToken<T> {
    state: Option<TokenCore<T>>,
}

impl<T> WriteToken<T> {
    pub(crate) fn new(core: TokenCore<T>) -> Self {
        WriteToken { state: Some(core) }
    }
}

impl<T> Future for WriteToken<T> {
    type Output = WriteGuard<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let core = this
            .state
            .as_ref()
            .expect("WriteToken polled after completion");

        if core.value.queue.is_head(&core.epoch) {
            let core = this.state.take().unwrap();
            Poll::Ready(WriteGuard { core, done: false })
        } else {
            core.epoch.park_writer(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl<T> Drop for WriteToken<T> {
    fn drop(&mut self) {
        if let Some(core) = self.state.take() {
            core.value
                .queue
                .on_writer_done(&core.epoch, Err(EpochFailure::Cancelled));
        }
    }
}

/// A resolved write: exclusive access to commit a value into this epoch.
pub struct WriteGuard<T> {
    core: TokenCore<T>,
    done: bool,
}

impl<T> WriteGuard<T> {
    /// Stores `value` and commits.
    pub fn write(mut self, value: T) {
        self.core.value.cell.store(value);
        self.commit();
    }

    /// Constructs `value` in a cell that must not already hold one. Used by
    /// [`crate::value::Async::emplace`]'s single-shot path.
    ///
    /// # Panics
    ///
    /// Panics if the cell already holds a constructed value.
    pub fn emplace(mut self, value: T) {
        self.core.value.cell.emplace(value);
        self.commit();
    }

    /// Runs `f` with mutable access to the cell, constructing a default
    /// value first if it was empty.
    pub fn with_mut<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Default,
    {
        self.core.value.cell.with_mut_or_default(f)
    }

    /// Commits without changing the cell's current contents.
    pub fn release(mut self) {
        self.commit();
    }

    fn commit(&mut self) {
        if !self.done {
            self.done = true;
            self.core.value.queue.on_writer_done(&self.core.epoch, Ok(()));
        }
    }
}

impl<T> Drop for WriteGuard<T> {
    fn drop(&mut self) {
        self.commit();
    }
}

// ---------------------------------------------------------------------
// Emplace
// ---------------------------------------------------------------------

/// A single-shot construction of an uninitialized cell. Thin wrapper over
/// [`WriteToken`]/[`WriteGuard`] that routes through
/// [`WriteGuard::emplace`] instead of [`WriteGuard::write`].
pub struct EmplaceToken<T> {
    inner: WriteToken<T>,
}

impl<T> EmplaceToken<T> {
    pub(crate) fn new(core: TokenCore<T>) -> Self {
        EmplaceToken {
            inner: WriteToken::new(core),
        }
    }
}

impl<T> Future for EmplaceToken<T> {
    type Output = EmplaceGuard<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll(cx).map(EmplaceGuard)
    }
}

/// A resolved emplace: commits a freshly constructed value exactly once.
pub struct EmplaceGuard<T>(WriteGuard<T>);

impl<T> EmplaceGuard<T> {
    /// Constructs the value and commits.
    ///
    /// # Panics
    ///
    /// Panics if the cell was already constructed (using an emplace token
    /// twice is a programming error, see [`Error::TokenMisuse`]).
    pub fn construct(self, value: T) {
        self.0.emplace(value);
    }
}

// ---------------------------------------------------------------------
// Mutate
// ---------------------------------------------------------------------

enum MutateState<T> {
    AwaitingPredecessor(ReadToken<T>, TokenCore<T>),
    AwaitingWrite(TokenCore<T>, Option<Error>),
    Done,
}

/// A pending read-modify-write.
///
/// Internally two coupled reservations on a new epoch: a read of the
/// predecessor epoch's committed value (released as soon as it resolves)
/// and a write on the new epoch. Unlike [`WriteToken`], dropping a
/// `MutateToken` before it resolves never cancels: the new epoch still
/// commits, passing the existing value through unchanged.
pub struct MutateToken<T> {
    state: MutateState<T>,
}

impl<T> MutateToken<T> {
    pub(crate) fn new(predecessor: ReadToken<T>, write_core: TokenCore<T>) -> Self {
        MutateToken {
            state: MutateState::AwaitingPredecessor(predecessor, write_core),
        }
    }
}

impl<T> Future for MutateToken<T> {
    type Output = MutateGuard<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            match std::mem::replace(&mut this.state, MutateState::Done) {
                MutateState::AwaitingPredecessor(mut read, write_core) => {
                    match Pin::new(&mut read).poll(cx) {
                        Poll::Pending => {
                            this.state = MutateState::AwaitingPredecessor(read, write_core);
                            return Poll::Pending;
                        }
                        Poll::Ready(Ok(guard)) => {
                            // Dropping the guard here releases the
                            // predecessor's reader token, letting it drain.
                            drop(guard);
                            this.state = MutateState::AwaitingWrite(write_core, None);
                        }
                        Poll::Ready(Err(err)) => {
                            this.state = MutateState::AwaitingWrite(write_core, Some(err));
                        }
                    }
                }
                MutateState::AwaitingWrite(core, err) => {
                    if core.value.queue.is_head(&core.epoch) {
                        return Poll::Ready(MutateGuard {
                            core,
                            pending_error: err,
                            done: false,
                        });
                    }
                    core.epoch.park_writer(cx.waker().clone());
                    this.state = MutateState::AwaitingWrite(core, err);
                    return Poll::Pending;
                }
                MutateState::Done => panic!("MutateToken polled after completion"),
            }
        }
    }
}

impl<T> Drop for MutateToken<T> {
    fn drop(&mut self) {
        match std::mem::replace(&mut self.state, MutateState::Done) {
            MutateState::AwaitingPredecessor(_read, write_core) => {
                write_core.value.queue.on_writer_done(&write_core.epoch, Ok(()));
            }
            MutateState::AwaitingWrite(core, _err) => {
                core.value.queue.on_writer_done(&core.epoch, Ok(()));
            }
            MutateState::Done => {}
        }
    }
}

/// A resolved mutate: in-place access to the predecessor's value.
pub struct MutateGuard<T> {
    core: TokenCore<T>,
    pending_error: Option<Error>,
    done: bool,
}

impl<T> MutateGuard<T> {
    /// Runs `f` with mutable access to the existing value.
    ///
    /// # Errors
    ///
    /// Returns the predecessor epoch's error if it never committed a value
    /// (e.g. its writer was cancelled).
    pub fn with_mut<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> Result<R, Error> {
        if let Some(err) = &self.pending_error {
            return Err(err.clone());
        }
        self.core.value.cell.with_mut(f)
    }

    /// Commits without making further changes (pass-through).
    pub fn release(mut self) {
        self.commit();
    }

    fn commit(&mut self) {
        if !self.done {
            self.done = true;
            self.core.value.queue.on_writer_done(&self.core.epoch, Ok(()));
        }
    }
}

impl<T> Drop for MutateGuard<T> {
    fn drop(&mut self) {
        self.commit();
    }
}
