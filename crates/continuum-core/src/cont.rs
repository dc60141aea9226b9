//! The continuation descriptor and its constructors (components C4, C5).

use std::sync::Arc;

use crate::error::ContCrash;
use crate::observer::Observer;
use crate::outcome::Outcome;
use crate::runtime::Runtime;

type Runner<E, F, A> = Arc<dyn Fn(&Runtime<E>, Observer<F, A>) + Send + Sync>;

/// An opaque descriptor wrapping a runner `(Runtime<E>, Observer<F, A>) -> ()`.
///
/// A `Continuation` does nothing on its own: it only runs when
/// [`Continuation::invoke`] (or the top-level [`crate::run`]) is called.
/// The runner is held behind an `Arc` rather than a `Box` so that a
/// continuation is **restartable** — it may be invoked any number of times,
/// and can be captured by multiple parallel-combinator children without
/// requiring `F`/`A` themselves to be `Clone`.
pub struct Continuation<E, F, A> {
    runner: Runner<E, F, A>,
}

impl<E, F, A> Clone for Continuation<E, F, A> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
        }
    }
}

impl<E, F, A> Continuation<E, F, A> {
    /// Wrap a raw runner directly (spec constructor `fromRun`).
    pub fn from_run(
        runner: impl Fn(&Runtime<E>, Observer<F, A>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            runner: Arc::new(runner),
        }
    }

    /// Invoke this continuation's runner against a runtime and observer.
    ///
    /// Does not itself enforce exactly-once delivery beyond what
    /// [`Observer`] already guards; calling this directly (rather than via
    /// [`crate::run`]) is how combinators delegate to their inner
    /// continuations.
    pub fn invoke(&self, runtime: &Runtime<E>, observer: Observer<F, A>) {
        (self.runner)(runtime, observer);
    }
}

impl<E, F, A> Continuation<E, F, A>
where
    E: 'static,
    F: 'static,
    A: Clone + Send + Sync + 'static,
{
    /// `of(a)`: immediately succeeds with `a`.
    pub fn of(value: A) -> Self {
        Self::from_run(move |_runtime, observer| {
            observer.notify_then(value.clone());
        })
    }
}

impl<E, F, A> Continuation<E, F, A>
where
    E: 'static,
    F: Clone + Send + Sync + 'static,
    A: 'static,
{
    /// `error(f)`: immediately fails on the else channel with `f`.
    pub fn error(value: F) -> Self {
        Self::from_run(move |_runtime, observer| {
            observer.notify_else(value.clone());
        })
    }
}

impl<E, F, A> Continuation<E, F, A>
where
    E: 'static,
    F: 'static,
    A: 'static,
{
    /// `crash(c)`: immediately crashes with `c`.
    pub fn crash(crash: ContCrash) -> Self
    where
        ContCrash: Clone,
    {
        Self::from_run(move |_runtime, observer| {
            observer.notify_crash(crash.clone());
        })
    }

    /// `fromDeferred(thunk)`: calls `thunk()` at run time to produce a
    /// continuation, then delegates to it. A panic inside `thunk` becomes
    /// `onCrash(Normal(...))` for the surrounding continuation.
    pub fn from_deferred(
        thunk: impl Fn() -> Continuation<E, F, A> + Send + Sync + 'static,
    ) -> Self {
        Self::from_run(move |runtime, observer| {
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(&thunk)) {
                Ok(cont) => cont.invoke(runtime, observer),
                Err(payload) => observer.notify_crash(ContCrash::from_panic_payload(payload)),
            }
        })
    }

    /// `ask()`: succeeds with a clone of the runtime's environment.
    pub fn ask() -> Self
    where
        E: Clone + Send + Sync,
        A: From<E>,
    {
        Self::from_run(move |runtime, observer| {
            observer.notify_then(A::from(runtime.env().clone()));
        })
    }
}
