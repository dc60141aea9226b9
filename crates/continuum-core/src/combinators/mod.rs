//! Shared dispatch helpers used by the three channel combinator families
//! (component C6): [`then`], [`else_`], [`crash`].
//!
//! Each channel's combinators share one shape (spec §4.4's "tiny finite
//! automaton with two real states"): wait for the inner outcome, then either
//! pass it through unchanged or hand its payload to a user callback. What
//! differs between `Do`/`Do0`/`DoWithEnv`/`DoWithEnv0` is only how much of
//! `(Runtime<E>, payload)` the user callback wants, so each channel module
//! implements one `_with_rt` primitive per combinator and derives the four
//! public variants from it.

use std::sync::Arc;

use crate::error::{ContCrash, NormalCrash};

pub mod crash;
pub mod else_;
pub mod then;

/// Optional sinks a `fork` combinator routes its fire-and-forget side
/// effect's outcome to (spec §4.4: "Side-effect outcomes are routed to the
/// explicit sinks (defaults: panic rethrows, others ignore)").
///
/// Unlike [`crate::Observer`] this is not consumed by the dispatch — it is
/// cloned once per invocation of the combinator it is attached to, since a
/// continuation built with `fork` is itself restartable.
pub struct ForkSinks<F, A> {
    pub(crate) on_then: Arc<dyn Fn(A) + Send + Sync>,
    pub(crate) on_else: Arc<dyn Fn(F) + Send + Sync>,
    pub(crate) on_crash: Arc<dyn Fn(ContCrash) + Send + Sync>,
    pub(crate) on_panic: Arc<dyn Fn(NormalCrash) + Send + Sync>,
}

impl<F, A> Clone for ForkSinks<F, A> {
    fn clone(&self) -> Self {
        Self {
            on_then: Arc::clone(&self.on_then),
            on_else: Arc::clone(&self.on_else),
            on_crash: Arc::clone(&self.on_crash),
            on_panic: Arc::clone(&self.on_panic),
        }
    }
}

impl<F, A> Default for ForkSinks<F, A>
where
    F: 'static,
    A: 'static,
{
    fn default() -> Self {
        Self {
            on_then: Arc::new(|_| {}),
            on_else: Arc::new(|_| {}),
            on_crash: Arc::new(|_| {}),
            on_panic: Arc::new(|panic| std::panic::resume_unwind(Box::new(panic.message))),
        }
    }
}

impl<F, A> ForkSinks<F, A>
where
    F: 'static,
    A: 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_then(mut self, f: impl Fn(A) + Send + Sync + 'static) -> Self {
        self.on_then = Arc::new(f);
        self
    }

    #[must_use]
    pub fn on_else(mut self, f: impl Fn(F) + Send + Sync + 'static) -> Self {
        self.on_else = Arc::new(f);
        self
    }

    #[must_use]
    pub fn on_crash(mut self, f: impl Fn(ContCrash) + Send + Sync + 'static) -> Self {
        self.on_crash = Arc::new(f);
        self
    }

    #[must_use]
    pub fn on_panic(mut self, f: impl Fn(NormalCrash) + Send + Sync + 'static) -> Self {
        self.on_panic = Arc::new(f);
        self
    }

    pub(crate) fn into_observer(self) -> crate::observer::Observer<F, A> {
        let ForkSinks {
            on_then,
            on_else,
            on_crash,
            on_panic,
        } = self;
        crate::observer::Observer::new()
            .with_on_then(move |v| on_then(v))
            .with_on_else(move |v| on_else(v))
            .with_on_crash(move |v| on_crash(v))
            .with_on_panic(move |v| on_panic(v))
    }
}

/// Run `f`, converting a caught panic into a [`ContCrash`].
///
/// This is the one idiom every user-supplied callback passed to a
/// combinator is invoked through (spec §4.4: "User callbacks invoked inside
/// a combinator must be wrapped so that any thrown exception becomes a
/// `Crash(Normal(error, stack))`").
pub(crate) fn guard_panic<R>(f: impl FnOnce() -> R) -> Result<R, ContCrash> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).map_err(ContCrash::from_panic_payload)
}
