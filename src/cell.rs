// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Shared, possibly-uninitialized storage for one value of type `T`.
//!
//! Mirrors `shared_storage.hpp`'s `shared_storage<T>`: unlike a plain
//! `Arc<Mutex<T>>`, a [`SharedCell`] can exist before `T` has been
//! constructed, so that [`crate::value::Async`] can be default-constructed
//! without requiring `T: Default`. Strong/weak reference counting is
//! provided by `Arc`/`Weak` rather than a hand-rolled atomic control block;
//! the three-state `CellState` sum type replaces `shared_storage<T>`'s raw
//! `alignas(T) unsigned char storage[sizeof(T)]` buffer plus `constructed`
//! flag.

use std::sync::{Arc, Mutex, Weak};

use crate::error::Error;

/// The three states a cell's storage can be in.
#[derive(Debug)]
enum CellState<T> {
    /// Never constructed, or destroyed and not reconstructed.
    Empty,
    /// Holds a live value.
    Ready(T),
    /// Explicitly destroyed; distinguished from `Empty` only for clarity in
    /// debugging/tracing output.
    Destroyed,
}

#[derive(Debug)]
struct Inner<T> {
    state: Mutex<CellState<T>>,
}

/// A strong, shared reference to a cell of type `T`.
///
/// Cloning a `SharedCell` is cheap (an `Arc` clone) and does not copy `T`.
#[derive(Debug)]
pub struct SharedCell<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SharedCell<T> {
    fn clone(&self) -> Self {
        SharedCell {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A non-owning reference to a cell, upgradeable back to a [`SharedCell`]
/// as long as at least one strong reference remains alive.
#[derive(Debug)]
pub struct WeakCell<T> {
    inner: Weak<Inner<T>>,
}

impl<T> Clone for WeakCell<T> {
    fn clone(&self) -> Self {
        WeakCell {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> SharedCell<T> {
    /// Creates an empty, unconstructed cell.
    pub fn empty() -> Self {
        SharedCell {
            inner: Arc::new(Inner {
                state: Mutex::new(CellState::Empty),
            }),
        }
    }

    /// Creates a cell already holding `value`.
    pub fn new(value: T) -> Self {
        SharedCell {
            inner: Arc::new(Inner {
                state: Mutex::new(CellState::Ready(value)),
            }),
        }
    }

    /// Downgrades to a [`WeakCell`].
    pub fn downgrade(&self) -> WeakCell<T> {
        WeakCell {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns `true` if the cell currently holds a constructed value.
    pub fn is_constructed(&self) -> bool {
        matches!(&*self.lock(), CellState::Ready(_))
    }

    /// Constructs the value in place.
    ///
    /// # Panics
    ///
    /// Panics if the cell already holds a constructed value; emplace is a
    /// single-shot operation per epoch by construction (see
    /// [`crate::token::EmplaceToken`]).
    pub fn emplace(&self, value: T) {
        let mut guard = self.lock();
        assert!(
            !matches!(&*guard, CellState::Ready(_)),
            "SharedCell::emplace called on an already-constructed cell"
        );
        *guard = CellState::Ready(value);
    }

    /// Overwrites the cell's value, constructing it if necessary.
    pub fn store(&self, value: T) {
        let mut guard = self.lock();
        *guard = CellState::Ready(value);
    }

    /// Destroys the contained value, if any.
    pub fn destroy(&self) {
        let mut guard = self.lock();
        *guard = CellState::Destroyed;
    }

    /// Reads the cell's current value by cloning it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConstructed`] if the cell has no value.
    pub fn read_cloned(&self) -> Result<T, Error>
    where
        T: Clone,
    {
        match &*self.lock() {
            CellState::Ready(v) => Ok(v.clone()),
            CellState::Empty | CellState::Destroyed => Err(Error::NotConstructed),
        }
    }

    /// Runs `f` with a shared reference to the value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConstructed`] if the cell has no value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, Error> {
        match &*self.lock() {
            CellState::Ready(v) => Ok(f(v)),
            CellState::Empty | CellState::Destroyed => Err(Error::NotConstructed),
        }
    }

    /// Runs `f` with a mutable reference to the value, constructing a
    /// default value first if the cell was empty.
    pub fn with_mut_or_default<R>(&self, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Default,
    {
        let mut guard = self.lock();
        if !matches!(&*guard, CellState::Ready(_)) {
            *guard = CellState::Ready(T::default());
        }
        match &mut *guard {
            CellState::Ready(v) => f(v),
            _ => unreachable!("just constructed"),
        }
    }

    /// Runs `f` with a mutable reference to the value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConstructed`] if the cell has no value.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, Error> {
        match &mut *self.lock() {
            CellState::Ready(v) => Ok(f(v)),
            CellState::Empty | CellState::Destroyed => Err(Error::NotConstructed),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CellState<T>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl<T> WeakCell<T> {
    /// Attempts to upgrade to a strong [`SharedCell`].
    pub fn upgrade(&self) -> Option<SharedCell<T>> {
        self.inner.upgrade().map(|inner| SharedCell { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cell_reads_fail() {
        let cell: SharedCell<i32> = SharedCell::empty();
        assert!(!cell.is_constructed());
        assert_eq!(cell.with(|v| *v).unwrap_err(), Error::NotConstructed);
    }

    #[test]
    fn emplace_then_read() {
        let cell = SharedCell::empty();
        cell.emplace(42);
        assert!(cell.is_constructed());
        assert_eq!(cell.with(|v| *v).unwrap(), 42);
    }

    #[test]
    #[should_panic(expected = "already-constructed")]
    fn double_emplace_panics() {
        let cell = SharedCell::new(1);
        cell.emplace(2);
    }

    #[test]
    fn destroy_clears_value() {
        let cell = SharedCell::new(7);
        cell.destroy();
        assert!(!cell.is_constructed());
    }

    #[test]
    fn weak_upgrade_after_drop() {
        let cell = SharedCell::new(1);
        let weak = cell.downgrade();
        assert!(weak.upgrade().is_some());
        drop(cell);
        assert!(weak.upgrade().is_none());
    }
}
