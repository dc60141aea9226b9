//! Observer: the callback sink a continuation notifies exactly once per run
//! (component C2).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ContCrash, NormalCrash};

type ThenFn<A> = Arc<dyn Fn(A) + Send + Sync>;
type ElseFn<F> = Arc<dyn Fn(F) + Send + Sync>;
type CrashFn = Arc<dyn Fn(ContCrash) + Send + Sync>;
type PanicFn = Arc<dyn Fn(NormalCrash) + Send + Sync>;

fn default_rethrow(panic: NormalCrash) {
    tracing::error!(message = %panic.message, "unhandled panic in observer callback");
    std::panic::resume_unwind(Box::new(panic.message));
}

fn noop_then<A>(_: A) {}
fn noop_else<F>(_: F) {}
fn noop_crash(_: ContCrash) {}

/// An immutable record of the four callbacks a run may invoke, plus a guard
/// enforcing the exactly-once contract from spec §4.1.
///
/// Cloning an `Observer` shares the same fired-guard: clones are meant to be
/// handed to combinators that need to pass the same logical sink down
/// through several layers of dispatch, not to create independently-firing
/// copies.
pub struct Observer<F, A> {
    on_then: ThenFn<A>,
    on_else: ElseFn<F>,
    on_crash: CrashFn,
    on_panic: PanicFn,
    fired: Arc<AtomicBool>,
}

impl<F, A> Clone for Observer<F, A> {
    fn clone(&self) -> Self {
        Self {
            on_then: Arc::clone(&self.on_then),
            on_else: Arc::clone(&self.on_else),
            on_crash: Arc::clone(&self.on_crash),
            on_panic: Arc::clone(&self.on_panic),
            fired: Arc::clone(&self.fired),
        }
    }
}

impl<F, A> fmt::Debug for Observer<F, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("fired", &self.fired.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<F, A> Default for Observer<F, A>
where
    F: 'static,
    A: 'static,
{
    /// All callbacks default to no-ops, except `on_panic`, which rethrows
    /// to the host (spec §4.1/§4.8).
    fn default() -> Self {
        Self {
            on_then: Arc::new(noop_then),
            on_else: Arc::new(noop_else),
            on_crash: Arc::new(noop_crash),
            on_panic: Arc::new(default_rethrow),
            fired: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl<F, A> Observer<F, A>
where
    F: 'static,
    A: 'static,
{
    /// An observer with every callback defaulted (see [`Observer::default`]).
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the success callback, keeping the others and the fired-guard.
    #[must_use]
    pub fn with_on_then(mut self, f: impl Fn(A) + Send + Sync + 'static) -> Self {
        self.on_then = Arc::new(f);
        self
    }

    /// Replace the expected-error callback.
    #[must_use]
    pub fn with_on_else(mut self, f: impl Fn(F) + Send + Sync + 'static) -> Self {
        self.on_else = Arc::new(f);
        self
    }

    /// Replace the crash callback.
    #[must_use]
    pub fn with_on_crash(mut self, f: impl Fn(ContCrash) + Send + Sync + 'static) -> Self {
        self.on_crash = Arc::new(f);
        self
    }

    /// Replace the panic callback.
    #[must_use]
    pub fn with_on_panic(mut self, f: impl Fn(NormalCrash) + Send + Sync + 'static) -> Self {
        self.on_panic = Arc::new(f);
        self
    }

    /// Notify success. Panics if this observer (or a clone sharing its
    /// fired-guard) has already delivered a terminal notification —
    /// spec §4.1's exactly-once contract is a programming error to violate,
    /// not a recoverable condition.
    pub fn notify_then(&self, value: A) {
        self.mark_fired("onThen");
        (self.on_then)(value);
    }

    /// Notify an expected failure.
    pub fn notify_else(&self, value: F) {
        self.mark_fired("onElse");
        (self.on_else)(value);
    }

    /// Notify an unexpected failure.
    pub fn notify_crash(&self, crash: ContCrash) {
        self.mark_fired("onCrash");
        tracing::warn!(crash = %crash, "continuation crashed");
        (self.on_crash)(crash);
    }

    /// Notify a panic that escaped an observer callback. Does not itself
    /// take part in the exactly-once guard: `onPanic` is a side channel,
    /// invoked only after one of the three primary callbacks has already
    /// thrown.
    pub fn notify_panic(&self, panic: NormalCrash) {
        tracing::error!(message = %panic.message, "observer panic routed to onPanic");
        (self.on_panic)(panic);
    }

    fn mark_fired(&self, which: &'static str) {
        if self.fired.swap(true, Ordering::AcqRel) {
            panic!(
                "Observer received a second terminal notification ({which}); \
                 a continuation must invoke its observer at most once per run"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn default_then_else_crash_are_noops() {
        let obs: Observer<String, i32> = Observer::new();
        obs.notify_then(1);
    }

    #[test]
    fn default_on_panic_rethrows() {
        let obs: Observer<String, i32> = Observer::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            obs.notify_panic(NormalCrash::from_panic_payload(Box::new("boom")));
        }));
        assert!(result.is_err());
    }

    #[test]
    fn with_on_then_replaces_callback() {
        let seen = Arc::new(Mutex::new(None));
        let seen2 = Arc::clone(&seen);
        let obs: Observer<String, i32> = Observer::new().with_on_then(move |v| {
            *seen2.lock().unwrap() = Some(v);
        });
        obs.notify_then(42);
        assert_eq!(*seen.lock().unwrap(), Some(42));
    }

    #[test]
    fn with_on_else_replaces_callback() {
        let seen = Arc::new(Mutex::new(None));
        let seen2 = Arc::clone(&seen);
        let obs: Observer<String, i32> = Observer::new().with_on_else(move |v| {
            *seen2.lock().unwrap() = Some(v);
        });
        obs.notify_else("bad".to_string());
        assert_eq!(*seen.lock().unwrap(), Some("bad".to_string()));
    }

    #[test]
    #[should_panic(expected = "second terminal notification")]
    fn second_notification_panics() {
        let obs: Observer<String, i32> = Observer::new();
        obs.notify_then(1);
        obs.notify_then(2);
    }

    #[test]
    #[should_panic(expected = "second terminal notification")]
    fn cloned_observer_shares_fired_guard() {
        let obs: Observer<String, i32> = Observer::new();
        let clone = obs.clone();
        obs.notify_then(1);
        clone.notify_then(2);
    }

    #[test]
    fn mixed_channels_still_enforce_exactly_once() {
        let obs: Observer<String, i32> = Observer::new();
        obs.notify_else("first".to_string());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            obs.notify_then(1);
        }));
        assert!(result.is_err());
    }
}
