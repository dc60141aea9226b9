//! Cooperative cancellation and the per-run environment handle (component C3).
//!
//! Grounded in the token/source split of `dbt_common::cancellation` (see
//! `other_examples/f42c2946_...dbt-cancel-src-lib.rs.rs`), simplified to the
//! single monotonic flag spec's cancellation model calls for: there is no
//! request-id versioning or child-token composition here, just "has
//! cancellation been requested, yes or no, forever."

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cooperative, monotonic cancellation flag.
///
/// `CancellationToken` is the read side: cloning it shares the same
/// underlying flag. Combinators and leaves poll [`CancellationToken::is_cancelled`]
/// at their async suspension points (spec §4.2: "every deferred callback
/// must check `isCancelled()`"). There is no way to un-cancel a token —
/// once the flag flips to `true` it stays `true`.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that can never be cancelled (no [`CancellationTokenSource`]
    /// holds the other half of its flag).
    pub fn never_cancelled() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// The write side of a [`CancellationToken`]: creates tokens and can flip
/// them to the cancelled state.
///
/// Dropping a `CancellationTokenSource` does not cancel tokens it issued —
/// unlike the weak-pointer source in the grounding example, this crate's
/// tokens hold a strong reference to the shared flag, since spec's model has
/// no notion of "source went away therefore cancelled."
#[derive(Clone, Debug, Default)]
pub struct CancellationTokenSource {
    flag: Arc<AtomicBool>,
}

impl CancellationTokenSource {
    /// A fresh, not-yet-cancelled source.
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Issue a token sharing this source's flag.
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            flag: Arc::clone(&self.flag),
        }
    }

    /// Request cancellation. Idempotent; safe to call more than once or
    /// from multiple threads.
    pub fn cancel(&self) {
        if !self.flag.swap(true, Ordering::AcqRel) {
            tracing::debug!("cancellation requested");
        }
    }

    /// Whether this source has already been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// The read-only environment threaded through a run: the ambient value `E`
/// combinators with an env parameter can read, plus the cancellation token
/// for this run.
///
/// `Runtime` is cheap to clone (an `Arc` around the env, plus a token that is
/// itself a cheap clone) since parallel combinators hand a copy to every
/// branch they fan out to.
#[derive(Debug)]
pub struct Runtime<E> {
    env: Arc<E>,
    cancellation: CancellationToken,
}

// Written by hand rather than `#[derive(Clone)]`: the derive would add an
// `E: Clone` bound even though only the `Arc<E>` handle is actually cloned.
impl<E> Clone for Runtime<E> {
    fn clone(&self) -> Self {
        Self {
            env: Arc::clone(&self.env),
            cancellation: self.cancellation.clone(),
        }
    }
}

impl<E> Runtime<E> {
    /// A runtime carrying `env`, with a fresh, never-cancelled token.
    pub fn new(env: E) -> Self {
        Self {
            env: Arc::new(env),
            cancellation: CancellationToken::never_cancelled(),
        }
    }

    /// A runtime carrying `env` and an explicit cancellation token, for
    /// composing a child run under a parent's cancellation scope.
    pub fn with_cancellation(env: E, cancellation: CancellationToken) -> Self {
        Self {
            env: Arc::new(env),
            cancellation,
        }
    }

    /// The ambient environment value.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// This runtime's cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Shorthand for `self.cancellation().is_cancelled()`.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// A new `Runtime` sharing this one's env but swapped to a different
    /// token, used when a combinator derives a child runtime under a
    /// narrower cancellation scope.
    pub fn with_token(&self, cancellation: CancellationToken) -> Self {
        Self {
            env: Arc::clone(&self.env),
            cancellation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let source = CancellationTokenSource::new();
        assert!(!source.token().is_cancelled());
    }

    #[test]
    fn cancel_flips_all_issued_tokens() {
        let source = CancellationTokenSource::new();
        let a = source.token();
        let b = source.token();
        source.cancel();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    #[test]
    fn tokens_issued_after_cancel_are_also_cancelled() {
        let source = CancellationTokenSource::new();
        source.cancel();
        let token = source.token();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_is_idempotent() {
        let source = CancellationTokenSource::new();
        source.cancel();
        source.cancel();
        assert!(source.is_cancelled());
    }

    #[test]
    fn never_cancelled_token_stays_uncancelled() {
        let token = CancellationToken::never_cancelled();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn runtime_exposes_env_and_cancellation() {
        let runtime = Runtime::new(42i32);
        assert_eq!(*runtime.env(), 42);
        assert!(!runtime.is_cancelled());
    }

    #[test]
    fn with_token_swaps_cancellation_but_keeps_env() {
        let source = CancellationTokenSource::new();
        let runtime = Runtime::new("env".to_string());
        let child = runtime.with_token(source.token());
        source.cancel();
        assert!(child.is_cancelled());
        assert_eq!(child.env(), "env");
    }

    #[test]
    fn runtime_clone_shares_cancellation_state() {
        let source = CancellationTokenSource::new();
        let runtime = Runtime::with_cancellation(1i32, source.token());
        let clone = runtime.clone();
        source.cancel();
        assert!(clone.is_cancelled());
    }
}
