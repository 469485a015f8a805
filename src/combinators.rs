// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Awaiter adapters: joint waiting over several tokens, and the
//! cancellation-softening wrappers used by reverse-mode accumulation.
//!
//! Grounded on `awaiters.hpp`'s `AllAwaiter`/`all`/`TryAwaiter`/`try_await`.
//! The original needs an N-way refcounted task share because a C++
//! coroutine frame is a single fixed resumption point that every
//! sub-awaiter must agree on resuming exactly once. A Rust `Future::poll`
//! has no such constraint: the surrounding task owns one `Waker` it is
//! free to clone and hand to every sub-future, and re-polls all of them
//! whenever any one fires. `all2`/`all3`/`all_vec` below therefore need no
//! refcount bookkeeping at all — a direct, mechanical consequence of the
//! ownership-disciplined futures model, not an invented simplification.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::Error;
use crate::task::cancel_current_task;
use crate::token::ReadToken;

/// Joins two futures, resolving once both have.
pub struct All2<A: Future, B: Future> {
    a: MaybeDone<A>,
    b: MaybeDone<B>,
}

enum MaybeDone<F: Future> {
    Polling(F),
    Done(F::Output),
    Taken,
}

impl<F: Future> MaybeDone<F> {
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> bool {
        // SAFETY: we never move out of `self` except via `Taken`, which is
        // only constructed after the original value is taken by value.
        let this = unsafe { self.get_unchecked_mut() };
        match this {
            MaybeDone::Polling(fut) => {
                let fut = unsafe { Pin::new_unchecked(fut) };
                match fut.poll(cx) {
                    Poll::Ready(out) => {
                        *this = MaybeDone::Done(out);
                        true
                    }
                    Poll::Pending => false,
                }
            }
            MaybeDone::Done(_) => true,
            MaybeDone::Taken => true,
        }
    }

    fn take(&mut self) -> F::Output {
        match std::mem::replace(self, MaybeDone::Taken) {
            MaybeDone::Done(out) => out,
            _ => panic!("MaybeDone::take called before completion"),
        }
    }
}

/// Awaits `a` and `b` concurrently, returning once both are ready.
pub fn all2<A: Future, B: Future>(a: A, b: B) -> All2<A, B> {
    All2 {
        a: MaybeDone::Polling(a),
        b: MaybeDone::Polling(b),
    }
}

impl<A: Future, B: Future> Future for All2<A, B> {
    type Output = (A::Output, B::Output);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };
        let a_ready = unsafe { Pin::new_unchecked(&mut this.a) }.poll(cx);
        let b_ready = unsafe { Pin::new_unchecked(&mut this.b) }.poll(cx);
        if a_ready && b_ready {
            Poll::Ready((this.a.take(), this.b.take()))
        } else {
            Poll::Pending
        }
    }
}

/// Joins three futures, resolving once all three have.
pub struct All3<A: Future, B: Future, C: Future> {
    a: MaybeDone<A>,
    b: MaybeDone<B>,
    c: MaybeDone<C>,
}

pub fn all3<A: Future, B: Future, C: Future>(a: A, b: B, c: C) -> All3<A, B, C> {
    All3 {
        a: MaybeDone::Polling(a),
        b: MaybeDone::Polling(b),
        c: MaybeDone::Polling(c),
    }
}

impl<A: Future, B: Future, C: Future> Future for All3<A, B, C> {
    type Output = (A::Output, B::Output, C::Output);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };
        let a_ready = unsafe { Pin::new_unchecked(&mut this.a) }.poll(cx);
        let b_ready = unsafe { Pin::new_unchecked(&mut this.b) }.poll(cx);
        let c_ready = unsafe { Pin::new_unchecked(&mut this.c) }.poll(cx);
        if a_ready && b_ready && c_ready {
            Poll::Ready((this.a.take(), this.b.take(), this.c.take()))
        } else {
            Poll::Pending
        }
    }
}

/// Awaits every future in `futures` concurrently. Immediately ready for an
/// empty input, matching the "zero operands" boundary case.
pub async fn all_vec<F: Future>(futures: Vec<F>) -> Vec<F::Output> {
    let mut slots: Vec<MaybeDone<F>> = futures.into_iter().map(MaybeDone::Polling).collect();
    std::future::poll_fn(move |cx| {
        let mut all_ready = true;
        for slot in &mut slots {
            let ready = unsafe { Pin::new_unchecked(slot) }.poll(cx);
            all_ready &= ready;
        }
        if all_ready {
            Poll::Ready(slots.iter_mut().map(MaybeDone::take).collect())
        } else {
            Poll::Pending
        }
    })
    .await
}

/// Wraps a read so that an epoch failure (cancellation or panic) resolves
/// to `None` instead of suspending the reader's task forever or
/// propagating an error.
pub struct Maybe<T> {
    inner: ReadToken<T>,
}

/// Converts a strict read into one that silently sees `None` on failure.
pub fn maybe<T>(read: ReadToken<T>) -> Maybe<T> {
    Maybe { inner: read }
}

impl<T: Clone> Future for Maybe<T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll(cx).map(|res| match res {
            Ok(guard) => Some(guard.get()),
            Err(_) => None,
        })
    }
}

/// Wraps a read so that an epoch failure cancels the *reader's task*
/// instead of surfacing an error: the task is flagged `cancel_on_resume`
/// and its frame is dropped the moment this awaiter would otherwise
/// return an error.
pub struct OrCancel<T> {
    inner: ReadToken<T>,
}

/// Converts a strict read into one whose failure cancels the awaiting
/// task.
pub fn or_cancel<T>(read: ReadToken<T>) -> OrCancel<T> {
    OrCancel { inner: read }
}

impl<T: Clone> Future for OrCancel<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll(cx) {
            Poll::Ready(Ok(guard)) => Poll::Ready(guard.get()),
            Poll::Ready(Err(_)) => {
                cancel_current_task();
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Computes `f()` and writes it directly into `target` in one step,
/// avoiding a separate bind between "compute" and "commit" at call sites.
/// Mirrors `awaiters.hpp`'s `write_to` helper.
pub async fn write_to<T>(target: &crate::value::Async<T>, value: T) {
    target.write().await.write(value);
}

/// Strict accessor error alias used by combinators that do not soften
/// failures (kept distinct from `Error` only to document intent at call
/// sites).
pub type StrictResult<T> = Result<T, Error>;
