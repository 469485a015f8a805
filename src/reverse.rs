// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Reverse-mode gradient accumulation.
//!
//! Grounded on `reverse_value.hpp`'s `ReverseValue<T>` and its
//! `async_accumulate`/`async_accumulate_minus` coroutines. The original
//! backs `ReverseValue<T>` with a dedicated `ReverseEpochQueue` that
//! prepends new epochs at the front instead of appending at the back; that
//! type's own implementation was not present in the retrieved source, and
//! its precise consumption order cannot be reconstructed from
//! `reverse_value.hpp` alone. The observable contract — `+=`/`-=` combine
//! contributions in call order, a cancelled operand passes the other
//! through unchanged, `finalize`/`finish` drain to one terminal value — is
//! fully satisfiable by reusing the already-ordered forward
//! [`crate::value::Async`] queue: each accumulation step is exactly "read
//! the running total, read the contribution, write the new total", which a
//! FIFO write queue already orders correctly. `ReverseValue<T>` therefore
//! wraps a private `Async<T>` rather than a second queue implementation;
//! this also sidesteps a genuine deadlock a literal prepend-on-fresh-value
//! translation would hit (reading and writing the same still-bootstrapping
//! epoch within one task). See `DESIGN.md` for the full writeup.

use std::ops::{AddAssign, Neg, SubAssign};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::combinators::{maybe, or_cancel};
use crate::error::Error;
use crate::scheduler::{require_default_scheduler, Scheduler};
use crate::token::{ReadToken, WriteToken};
use crate::value::Async;

/// An accumulator for reverse-mode gradient contributions.
///
/// Seeded at zero (`T::default()`); each `+=`/`-=` schedules a task that
/// folds one more contribution into the running total, in the order the
/// operators were called. A contribution from a cancelled upstream epoch is
/// treated as absent rather than an error — see [`crate::combinators::maybe`].
pub struct ReverseValue<T> {
    inner: Async<T>,
    started: AtomicBool,
}

impl<T: Default> ReverseValue<T> {
    /// A fresh accumulator seeded at the additive identity.
    pub fn new() -> Self {
        ReverseValue {
            inner: Async::new(T::default()),
            started: AtomicBool::new(false),
        }
    }
}

impl<T: Default> Default for ReverseValue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReverseValue<T> {
    /// A read of the running total, for a downstream consumer of this
    /// node's accumulated gradient.
    pub fn input(&self) -> ReadToken<T> {
        self.inner.read()
    }

    /// Equivalent to [`Self::input`]; both name the same operation, matching
    /// the original's `read()`/`input()` pair.
    pub fn read(&self) -> ReadToken<T> {
        self.inner.read()
    }

    /// A direct write into the running total, bypassing the `+=`/`-=`
    /// accumulation machinery. Used to seed the chain with the final
    /// gradient (e.g. `1.0` at the output of a computation).
    pub fn output(&self) -> WriteToken<T> {
        self.inner.write()
    }

    /// Marks the chain as started. Idempotent. Because the accumulator is
    /// always seeded with an already-committed identity value, this does
    /// not itself gate any progress — it only documents intent and guards
    /// against calling [`Self::finish`]/[`Self::finish_wait`] before any
    /// contribution has been made.
    pub fn finalize(&self) {
        self.started.store(true, Ordering::Release);
    }

    /// `true` once [`Self::finalize`] (directly, or via [`Self::set`],
    /// [`Self::assign`], [`Self::finish`], or [`Self::finish_wait`]) has run.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Finalizes the chain and returns the underlying value handle.
    pub fn finish(self) -> Async<T> {
        self.finalize();
        self.inner
    }

    /// Finalizes the chain and blocks until the running total is available.
    pub fn finish_wait<S: Scheduler + ?Sized>(&self, scheduler: &S) -> Result<T, Error>
    where
        T: Clone,
    {
        self.finalize();
        self.inner.get_wait(scheduler)
    }

    /// Immediately (asynchronously) overwrites the running total with
    /// `value`, without reading the previous one. Starts the chain.
    pub fn set(&mut self, value: T)
    where
        T: Send + 'static,
    {
        let out = self.inner.write();
        let scheduler = require_default_scheduler();
        crate::scheduler::spawn(scheduler, async move {
            out.await.write(value);
        });
        self.finalize();
    }

    /// Schedules a copy of `src`'s current value into the running total.
    /// Starts the chain.
    pub fn assign(&mut self, src: &Async<T>)
    where
        T: Clone + Send + 'static,
    {
        crate::ops::assign(&self.inner, src);
        self.finalize();
    }

    /// Borrows the underlying value handle.
    pub fn value(&self) -> &Async<T> {
        &self.inner
    }
}

/// Folds `old` and `rhs` (both possibly cancelled) into `out`. Grounded
/// directly on `async_accumulate`/`async_accumulate_minus`: if the running
/// total is present, the contribution (if also present) is folded in with
/// `combine`; if the running total was cancelled, the contribution alone
/// (passed through `on_missing_old`) becomes the new total.
fn spawn_accumulate<T>(
    old: ReadToken<T>,
    rhs: ReadToken<T>,
    out: WriteToken<T>,
    combine: impl FnOnce(&mut T, T) + Send + 'static,
    on_missing_old: impl FnOnce(T) -> T + Send + 'static,
) where
    T: Clone + Send + 'static,
{
    let scheduler = require_default_scheduler();
    crate::scheduler::spawn(scheduler, async move {
        match maybe(old).await {
            Some(mut total) => {
                if let Some(contribution) = maybe(rhs).await {
                    combine(&mut total, contribution);
                }
                out.await.write(total);
            }
            None => {
                let contribution = or_cancel(rhs).await;
                out.await.write(on_missing_old(contribution));
            }
        }
    });
}

impl<T> AddAssign<&Async<T>> for ReverseValue<T>
where
    T: Clone + Send + 'static + AddAssign<T>,
{
    fn add_assign(&mut self, rhs: &Async<T>) {
        let old = self.inner.read();
        let contribution = rhs.read();
        let out = self.inner.write();
        spawn_accumulate(old, contribution, out, |lhs, rhs| *lhs += rhs, |v| v);
        self.finalize();
    }
}

impl<T> AddAssign<&ReverseValue<T>> for ReverseValue<T>
where
    T: Clone + Send + 'static + AddAssign<T>,
{
    fn add_assign(&mut self, rhs: &ReverseValue<T>) {
        let old = self.inner.read();
        let contribution = rhs.input();
        let out = self.inner.write();
        spawn_accumulate(old, contribution, out, |lhs, rhs| *lhs += rhs, |v| v);
        self.finalize();
    }
}

impl<T> SubAssign<&Async<T>> for ReverseValue<T>
where
    T: Clone + Send + 'static + SubAssign<T> + Neg<Output = T>,
{
    fn sub_assign(&mut self, rhs: &Async<T>) {
        let old = self.inner.read();
        let contribution = rhs.read();
        let out = self.inner.write();
        spawn_accumulate(old, contribution, out, |lhs, rhs| *lhs -= rhs, |v| -v);
        self.finalize();
    }
}

impl<T> SubAssign<&ReverseValue<T>> for ReverseValue<T>
where
    T: Clone + Send + 'static + SubAssign<T> + Neg<Output = T>,
{
    fn sub_assign(&mut self, rhs: &ReverseValue<T>) {
        let old = self.inner.read();
        let contribution = rhs.input();
        let out = self.inner.write();
        spawn_accumulate(old, contribution, out, |lhs, rhs| *lhs -= rhs, |v| -v);
        self.finalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{clear_default_scheduler, set_default_scheduler, DeterministicScheduler};
    use std::sync::Arc;

    fn with_default_scheduler<R>(f: impl FnOnce(&DeterministicScheduler) -> R) -> R {
        let sched = DeterministicScheduler::new();
        set_default_scheduler(Arc::new(sched.clone()));
        let result = f(&sched);
        clear_default_scheduler();
        result
    }

    #[test]
    fn accumulates_contributions_in_call_order() {
        with_default_scheduler(|sched| {
            let mut grad = ReverseValue::<f64>::new();
            let a = Async::new(2.0);
            let b = Async::new(3.0);
            grad += &a;
            sched.run_all();
            grad -= &b;
            sched.run_all();
            assert_eq!(grad.finish_wait(sched).unwrap(), -1.0);
        });
    }

    #[test]
    fn chains_from_another_reverse_value() {
        with_default_scheduler(|sched| {
            let mut upstream = ReverseValue::<f64>::new();
            upstream.set(1.0);
            sched.run_all();

            let mut downstream = ReverseValue::<f64>::new();
            downstream += &upstream;
            sched.run_all();

            assert_eq!(downstream.finish_wait(sched).unwrap(), 1.0);
        });
    }

    #[test]
    fn seed_reaches_final_chain_value() {
        with_default_scheduler(|sched| {
            let mut grad = ReverseValue::<f64>::new();
            let seed = Async::new(1.0f64);
            grad.assign(&seed);
            sched.run_all();
            let handle = grad.finish();
            assert_eq!(handle.get_wait(sched).unwrap(), 1.0);
        });
    }
}
