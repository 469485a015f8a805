// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Typed errors surfaced by the dataflow runtime.
//!
//! Internal invariant violations (double-use of a single-shot token,
//! polling an already-polling task) are programming errors and panic
//! rather than appearing here, matching the `CHECK`/`DEBUG_CHECK`
//! assertions the C++ original aborts on.

use std::fmt;

/// Errors surfaced by strict accessors over [`crate::Async`] values.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A reader reached a committed epoch whose cell was never constructed,
    /// e.g. because a write token was dropped without committing.
    #[error("read observed an epoch whose value was never constructed")]
    NotConstructed,

    /// A [`crate::task::JoinHandle`] was polled after its task was dropped
    /// (or otherwise never ran to completion) without ever sending a
    /// result.
    #[error("task was cancelled before it produced a result")]
    Cancelled,

    /// A task's future panicked while being polled. The payload is not
    /// `Send + 'static` in general, so only a human-readable message is
    /// retained.
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    /// A single-shot token (e.g. an emplace token) was used more than once,
    /// or a token was otherwise misused in a way the type system cannot
    /// prevent.
    #[error("token misuse: {0}")]
    TokenMisuse(&'static str),
}

impl Error {
    pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Error::TaskPanicked(msg)
    }
}

/// Convenience alias used throughout the crate's fallible entry points.
pub type Result<T> = std::result::Result<T, Error>;

/// An epoch's terminal condition once its writer has finished without
/// committing a value: either a plain cancellation, or a task panic that
/// should be re-surfaced to strict readers.
#[derive(Debug, Clone)]
pub(crate) enum EpochFailure {
    Cancelled,
    Panicked(String),
}

impl EpochFailure {
    pub(crate) fn into_error(self) -> Error {
        match self {
            EpochFailure::Cancelled => Error::NotConstructed,
            EpochFailure::Panicked(msg) => Error::TaskPanicked(msg),
        }
    }
}

impl fmt::Display for EpochFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpochFailure::Cancelled => write!(f, "cancelled"),
            EpochFailure::Panicked(msg) => write!(f, "panicked: {msg}"),
        }
    }
}
