// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A single-value, single-consumer channel used to deliver a task's output
//! to its [`crate::task::JoinHandle`].
//!
//! Adapted from `async-exec`'s lock-free `oneshot` channel, but backed
//! by a plain `Mutex<State<T>>` instead of an intrusive atomic `WaitCell`:
//! outputs are delivered at most once per task, so there is no hot path to
//! protect, and a mutex keeps this honest about what the C++ original's
//! own task-result plumbing actually synchronizes with (`std::mutex`, not
//! lock-free atomics).

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

pub(crate) fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let inner = Arc::new(Inner {
        state: Mutex::new(State::Empty),
    });
    (
        Sender {
            inner: Some(Arc::clone(&inner)),
        },
        Receiver { inner },
    )
}

enum State<T> {
    Empty,
    Waiting(Waker),
    Ready(T),
    Closed,
}

struct Inner<T> {
    state: Mutex<State<T>>,
}

/// The closed-channel error: the sender was dropped without sending.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub(crate) struct RecvError;

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("sender dropped without sending a value")
    }
}

pub(crate) struct Sender<T> {
    inner: Option<Arc<Inner<T>>>,
}

pub(crate) struct Receiver<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Sender<T> {
    pub(crate) fn send(mut self, value: T) {
        let inner = self.inner.take().expect("Sender used after send");
        let mut guard = inner.state.lock().unwrap_or_else(|p| p.into_inner());
        match std::mem::replace(&mut *guard, State::Ready(value)) {
            State::Waiting(waker) => {
                drop(guard);
                waker.wake();
            }
            State::Empty => {}
            State::Ready(_) | State::Closed => unreachable!("send called twice"),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            let mut guard = inner.state.lock().unwrap_or_else(|p| p.into_inner());
            if let State::Waiting(waker) = std::mem::replace(&mut *guard, State::Closed) {
                drop(guard);
                waker.wake();
            }
        }
    }
}

impl<T> Future for Receiver<T> {
    type Output = Result<T, RecvError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut guard = self.inner.state.lock().unwrap_or_else(|p| p.into_inner());
        match &*guard {
            State::Ready(_) => {
                let State::Ready(value) = std::mem::replace(&mut *guard, State::Closed) else {
                    unreachable!()
                };
                Poll::Ready(Ok(value))
            }
            State::Closed => Poll::Ready(Err(RecvError)),
            State::Empty | State::Waiting(_) => {
                *guard = State::Waiting(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::poll_once;

    #[test]
    fn send_then_recv_is_immediately_ready() {
        let (tx, rx) = channel();
        tx.send(42);
        let got = poll_once(&mut Box::pin(rx));
        assert!(matches!(got, Poll::Ready(Ok(42))));
    }

    #[test]
    fn dropping_sender_closes_receiver() {
        let (tx, rx) = channel::<i32>();
        drop(tx);
        let got = poll_once(&mut Box::pin(rx));
        assert!(matches!(got, Poll::Ready(Err(RecvError))));
    }
}
