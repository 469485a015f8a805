// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Operator overloads that construct tasks from binary/unary/compound ops.
//!
//! Grounded on `async_ops.hpp`'s `async_binary_op`/`async_compound_op`/
//! `async_negate` and the `UNI20_DEFINE_BINARY_OP`/
//! `UNI20_DEFINE_ASYNC_COMPOUND_OPERATOR` macros: every operator reduces to
//! "acquire read tokens for operands (a write or mutate token for the
//! result), submit a task that awaits operands, computes the op, commits".
//! Rust has no operator-overload resolution on "either side may be the
//! async one", so the free-standing `async_binary_op`/`async_compound_op`
//! helpers are exposed directly as the basis for the `core::ops` impls
//! below, mirroring how `async_ops.hpp` exposes both the named functions
//! and the operator sugar built on top of them.
//!
//! A binary op needs somewhere to run its task without every call site
//! threading a scheduler through; like `async_ops.hpp`'s global `schedule`
//! free function, this reads a process-wide default installed via
//! [`crate::scheduler::set_default_scheduler`].

use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::combinators::all2;
use crate::scheduler::require_default_scheduler;
use crate::value::Async;

/// Schedules `result = op(a, b)`, reading both operands and committing the
/// result on a task run by the process-wide default scheduler.
///
/// Mirrors `async_binary_op`: read tokens for both operands are acquired
/// eagerly (ordering the new epochs before the task ever runs), but the
/// task itself only awaits them, releasing each reader immediately after
/// the value is copied out and before the write is awaited — so the write
/// never waits on its own reads.
pub fn async_binary_op<A, B, R, Op>(a: &Async<A>, b: &Async<B>, out: &Async<R>, op: Op)
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    R: Send + 'static,
    Op: FnOnce(A, B) -> R + Send + 'static,
{
    let a_buf = a.read();
    let b_buf = b.read();
    let out_buf = out.write();
    let scheduler = require_default_scheduler();
    crate::scheduler::spawn(scheduler, async move {
        let (va, vb) = all2(a_buf, b_buf).await;
        let (va, vb) = match (va, vb) {
            (Ok(va), Ok(vb)) => (va.get(), vb.get()),
            _ => {
                // An operand was cancelled: drop the write token without
                // committing, propagating the cancellation downstream.
                return;
            }
        };
        let result = op(va, vb);
        out_buf.await.write(result);
    });
}

/// Schedules `op(lhs, rhs)` in place: `lhs` is read-modified-written via a
/// mutate token, `rhs` is read. Mirrors `async_compound_op`.
pub fn async_compound_op<T, U, Op>(lhs: &Async<T>, rhs: &Async<U>, op: Op)
where
    T: Send + 'static,
    U: Clone + Send + 'static,
    Op: FnOnce(&mut T, U) + Send + 'static,
{
    let rhs_buf = rhs.read();
    let lhs_buf = lhs.mutate();
    let scheduler = require_default_scheduler();
    crate::scheduler::spawn(scheduler, async move {
        let (rhs_val, mut lhs_guard) = all2(rhs_buf, lhs_buf).await;
        let rhs_val = match rhs_val {
            Ok(guard) => guard.get(),
            // Mutate never cancels: fall through and commit the existing
            // value unchanged, matching the reverse-chain cancellation rule.
            Err(_) => return,
        };
        let _ = lhs_guard.with_mut(|lhs| op(lhs, rhs_val));
    });
}

/// Schedules `result = -a`. Mirrors `async_negate`.
pub fn async_negate<A, R, Op>(a: &Async<A>, out: &Async<R>, op: Op)
where
    A: Clone + Send + 'static,
    R: Send + 'static,
    Op: FnOnce(A) -> R + Send + 'static,
{
    let a_buf = a.read();
    let out_buf = out.write();
    let scheduler = require_default_scheduler();
    crate::scheduler::spawn(scheduler, async move {
        let value = match a_buf.await {
            Ok(guard) => guard.get(),
            Err(_) => return,
        };
        let result = op(value);
        out_buf.await.write(result);
    });
}

/// Schedules a copy of `src`'s current value into `dst`.
///
/// Rust cannot overload `operator=`, so this stands in for the original's
/// `async_assign`: a handle-level `let a = b;` is a plain Rust move (no
/// task), but copying the *value one async handle currently holds* into
/// another is itself an asynchronous operation and needs a name.
pub fn assign<T>(dst: &Async<T>, src: &Async<T>)
where
    T: Clone + Send + 'static,
{
    let src_buf = src.read();
    let dst_buf = dst.write();
    let scheduler = require_default_scheduler();
    crate::scheduler::spawn(scheduler, async move {
        let value = match src_buf.await {
            Ok(guard) => guard.get(),
            Err(_) => return,
        };
        dst_buf.await.write(value);
    });
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl<T> $trait<&Async<T>> for &Async<T>
        where
            T: Clone + Send + 'static + $trait<T, Output = T>,
        {
            type Output = Async<T>;

            fn $method(self, rhs: &Async<T>) -> Async<T> {
                let result = Async::uninitialized();
                async_binary_op(self, rhs, &result, |a, b| a $op b);
                result
            }
        }

        impl<T> $trait<T> for &Async<T>
        where
            T: Clone + Send + 'static + $trait<T, Output = T>,
        {
            type Output = Async<T>;

            fn $method(self, rhs: T) -> Async<T> {
                let scalar = Async::new(rhs);
                let result = Async::uninitialized();
                async_binary_op(self, &scalar, &result, |a, b| a $op b);
                result
            }
        }
    };
}

impl_binary_op!(Add, add, +);
impl_binary_op!(Sub, sub, -);
impl_binary_op!(Mul, mul, *);
impl_binary_op!(Div, div, /);

impl<T> Neg for &Async<T>
where
    T: Clone + Send + 'static + Neg<Output = T>,
{
    type Output = Async<T>;

    fn neg(self) -> Async<T> {
        let result = Async::uninitialized();
        async_negate(self, &result, |a| -a);
        result
    }
}

macro_rules! impl_compound_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl<T> std::ops::$trait<&Async<T>> for Async<T>
        where
            T: Clone + Send + 'static + std::ops::$trait<T>,
        {
            fn $method(&mut self, rhs: &Async<T>) {
                async_compound_op(self, rhs, |lhs, rhs| *lhs $op rhs);
            }
        }

        impl<T> std::ops::$trait<T> for Async<T>
        where
            T: Clone + Send + 'static + std::ops::$trait<T>,
        {
            fn $method(&mut self, rhs: T) {
                let scalar = Async::new(rhs);
                async_compound_op(self, &scalar, |lhs, rhs| *lhs $op rhs);
            }
        }
    };
}

impl_compound_op!(AddAssign, add_assign, +=);
impl_compound_op!(SubAssign, sub_assign, -=);

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
    fn add_produces_sum_once_scheduler_runs() {
        with_default_scheduler(|sched| {
            let a = Async::new(2);
            let b = Async::new(3);
            let sum = &a + &b;
            sched.run_all();
            assert_eq!(sum.get_wait(sched).unwrap(), 5);
        });
    }

    #[test]
    fn scalar_rhs_participates_in_binary_op() {
        with_default_scheduler(|sched| {
            let a = Async::new(10);
            let result = &a - 4;
            sched.run_all();
            assert_eq!(result.get_wait(sched).unwrap(), 6);
        });
    }

    #[test]
    fn compound_assign_mutates_in_place() {
        with_default_scheduler(|sched| {
            let mut a = Async::new(1);
            let b = Async::new(41);
            a += &b;
            sched.run_all();
            assert_eq!(a.get_wait(sched).unwrap(), 42);
        });
    }

    #[test]
    fn negate_produces_negative() {
        with_default_scheduler(|sched| {
            let a = Async::new(7);
            let neg = -&a;
            sched.run_all();
            assert_eq!(neg.get_wait(sched).unwrap(), -7);
        });
    }

    #[test]
    fn assign_copies_value_into_destination() {
        with_default_scheduler(|sched| {
            let src = Async::new(9);
            let dst = Async::uninitialized();
            assign(&dst, &src);
            sched.run_all();
            assert_eq!(dst.get_wait(sched).unwrap(), 9);
        });
    }
}
