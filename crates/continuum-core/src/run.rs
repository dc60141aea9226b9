//! User-facing run entry point (component C10): the only place a
//! composition actually executes.
//!
//! `run` is deliberately thin. It does three things spec §4.8 asks of it:
//! build a [`Runtime`] bound to `env` with a fresh cancellation source,
//! build an [`Observer`] from the caller's callbacks (defaults applied),
//! and invoke the continuation's runner exactly once with that pair,
//! returning the token so the caller can cancel a still-running
//! composition. Everything upstream of this call (sequencing, parallels,
//! looping) is just building the closure `run` eventually calls.

use std::sync::Arc;

use crate::cont::Continuation;
use crate::error::{ContCrash, NormalCrash};
use crate::observer::Observer;
use crate::runtime::{CancellationToken, CancellationTokenSource, Runtime};

/// Builder for the four callbacks [`run`] dispatches to, mirroring
/// [`crate::combinators::ForkSinks`]'s shape but named for its own
/// component: a `fork` sink is cloned and reused across child invocations
/// of a restartable continuation, while these callbacks are consumed once,
/// by the single top-level run they were built for.
pub struct RunCallbacks<F, A> {
    on_then: Arc<dyn Fn(A) + Send + Sync>,
    on_else: Arc<dyn Fn(F) + Send + Sync>,
    on_crash: Arc<dyn Fn(ContCrash) + Send + Sync>,
    on_panic: Arc<dyn Fn(NormalCrash) + Send + Sync>,
}

impl<F, A> Default for RunCallbacks<F, A>
where
    F: 'static,
    A: 'static,
{
    /// `onThen`/`onElse`/`onCrash` default to no-ops; `onPanic` defaults to
    /// rethrowing to the host (spec §6: "Default callback behaviors").
    fn default() -> Self {
        Self {
            on_then: Arc::new(|_| {}),
            on_else: Arc::new(|_| {}),
            on_crash: Arc::new(|_| {}),
            on_panic: Arc::new(|panic: NormalCrash| {
                tracing::error!(message = %panic.message, "unhandled panic escaped run callbacks");
                std::panic::resume_unwind(Box::new(panic.message));
            }),
        }
    }
}

impl<F, A> RunCallbacks<F, A>
where
    F: 'static,
    A: 'static,
{
    /// All callbacks defaulted; build up the ones you need with the
    /// `on_*` setters.
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
}

/// Run `cont` against `env`, dispatching to `callbacks`, and return the
/// [`CancellationToken`] for this run.
///
/// The continuation's runner is invoked exactly once. If any of
/// `on_then`/`on_else`/`on_crash` panics, the panic is caught here (not
/// inside the composition — every combinator propagates a terminal
/// notification as a direct call, so a throw in the outermost callback
/// surfaces as a raw unwind out of [`Continuation::invoke`]) and handed to
/// `on_panic` as a [`NormalCrash`]. `on_panic` itself is never wrapped: if
/// it panics too, that unwind is the caller's problem, same as the host
/// language's "the error handler must not itself throw" rule (spec §4.8).
pub fn run<E, F, A>(cont: Continuation<E, F, A>, env: E, callbacks: RunCallbacks<F, A>) -> CancellationToken
where
    E: Send + Sync + 'static,
    F: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    let span = tracing::debug_span!("continuum::run");
    let _enter = span.enter();

    let source = CancellationTokenSource::new();
    let runtime = Runtime::with_cancellation(env, source.token());
    let token = source.token();

    let RunCallbacks {
        on_then,
        on_else,
        on_crash,
        on_panic,
    } = callbacks;

    let observer = Observer::new()
        .with_on_then(move |value| on_then(value))
        .with_on_else(move |err| on_else(err))
        .with_on_crash(move |crash| on_crash(crash));

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        cont.invoke(&runtime, observer);
    }));
    if let Err(payload) = result {
        on_panic(NormalCrash::from_panic_payload(payload));
    }

    token
}
