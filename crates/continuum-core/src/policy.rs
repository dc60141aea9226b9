//! Policy descriptors (component C9): pure tagged data read by the parallel
//! orchestrators in [`crate::parallel`] to pick how children are started and
//! how their outcomes are combined. No behavior lives here beyond the
//! combine functions callers attach to `RunAll` — spec §4.7: "pure tagged
//! variants."

use std::fmt;
use std::sync::Arc;

/// Policy for the success/error plane shared by `both`/`all`.
///
/// `T` is the payload type being combined — the success type for `both`'s
/// success side, or the error type for its failure side, depending on which
/// half of the outcome a given `OkPolicy` instance governs.
pub enum OkPolicy<T> {
    /// Execute children in input order, one after the next; stop at the
    /// first failure.
    Sequence,
    /// Start every child; the first outcome that determines the result
    /// short-circuits the rest.
    QuitFast,
    /// Start every child; wait for all of them, then combine.
    RunAll {
        combine: Arc<dyn Fn(T, T) -> T + Send + Sync>,
        should_favor_crash: bool,
    },
}

impl<T> OkPolicy<T> {
    #[must_use]
    pub fn sequence() -> Self {
        OkPolicy::Sequence
    }

    #[must_use]
    pub fn quit_fast() -> Self {
        OkPolicy::QuitFast
    }

    #[must_use]
    pub fn run_all(
        combine: impl Fn(T, T) -> T + Send + Sync + 'static,
        should_favor_crash: bool,
    ) -> Self {
        OkPolicy::RunAll {
            combine: Arc::new(combine),
            should_favor_crash,
        }
    }
}

impl<T> Clone for OkPolicy<T> {
    fn clone(&self) -> Self {
        match self {
            OkPolicy::Sequence => OkPolicy::Sequence,
            OkPolicy::QuitFast => OkPolicy::QuitFast,
            OkPolicy::RunAll {
                combine,
                should_favor_crash,
            } => OkPolicy::RunAll {
                combine: Arc::clone(combine),
                should_favor_crash: *should_favor_crash,
            },
        }
    }
}

impl<T> fmt::Debug for OkPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OkPolicy::Sequence => f.write_str("OkPolicy::Sequence"),
            OkPolicy::QuitFast => f.write_str("OkPolicy::QuitFast"),
            OkPolicy::RunAll { should_favor_crash, .. } => f
                .debug_struct("OkPolicy::RunAll")
                .field("should_favor_crash", should_favor_crash)
                .finish_non_exhaustive(),
        }
    }
}

/// Policy for the crash plane shared by `merge`/`mergeAll`.
pub enum CrashPolicy<F, A> {
    Sequence,
    QuitFast,
    RunAll {
        should_favor_else: bool,
        combine_else: Arc<dyn Fn(F, F) -> F + Send + Sync>,
        combine_then: Arc<dyn Fn(A, A) -> A + Send + Sync>,
    },
}

impl<F, A> CrashPolicy<F, A> {
    #[must_use]
    pub fn sequence() -> Self {
        CrashPolicy::Sequence
    }

    #[must_use]
    pub fn quit_fast() -> Self {
        CrashPolicy::QuitFast
    }

    #[must_use]
    pub fn run_all(
        should_favor_else: bool,
        combine_else: impl Fn(F, F) -> F + Send + Sync + 'static,
        combine_then: impl Fn(A, A) -> A + Send + Sync + 'static,
    ) -> Self {
        CrashPolicy::RunAll {
            should_favor_else,
            combine_else: Arc::new(combine_else),
            combine_then: Arc::new(combine_then),
        }
    }
}

impl<F, A> Clone for CrashPolicy<F, A> {
    fn clone(&self) -> Self {
        match self {
            CrashPolicy::Sequence => CrashPolicy::Sequence,
            CrashPolicy::QuitFast => CrashPolicy::QuitFast,
            CrashPolicy::RunAll {
                should_favor_else,
                combine_else,
                combine_then,
            } => CrashPolicy::RunAll {
                should_favor_else: *should_favor_else,
                combine_else: Arc::clone(combine_else),
                combine_then: Arc::clone(combine_then),
            },
        }
    }
}

impl<F, A> fmt::Debug for CrashPolicy<F, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrashPolicy::Sequence => f.write_str("CrashPolicy::Sequence"),
            CrashPolicy::QuitFast => f.write_str("CrashPolicy::QuitFast"),
            CrashPolicy::RunAll { should_favor_else, .. } => f
                .debug_struct("CrashPolicy::RunAll")
                .field("should_favor_else", should_favor_else)
                .finish_non_exhaustive(),
        }
    }
}

/// Legacy policy variant (spec §3: "used when combined error accumulation is
/// implicit via list-concatenation"). Carried forward because spec.md names
/// it explicitly in the external surface (§6), not because new code should
/// prefer it over [`OkPolicy`]/[`CrashPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BothPolicy {
    Sequence,
    MergeWhenAll,
    QuitFast,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_policy_run_all_clone_shares_combine() {
        let policy: OkPolicy<i32> = OkPolicy::run_all(|a, b| a + b, false);
        let cloned = policy.clone();
        if let (OkPolicy::RunAll { combine, .. }, OkPolicy::RunAll { combine: combine2, .. }) =
            (&policy, &cloned)
        {
            assert_eq!(combine(2, 3), 5);
            assert_eq!(combine2(2, 3), 5);
        } else {
            panic!("expected RunAll");
        }
    }

    #[test]
    fn both_policy_is_a_plain_enum() {
        assert_eq!(BothPolicy::Sequence, BothPolicy::Sequence);
        assert_ne!(BothPolicy::Sequence, BothPolicy::QuitFast);
    }

    #[test]
    fn crash_policy_debug_does_not_panic() {
        let policy: CrashPolicy<String, i32> = CrashPolicy::run_all(true, |a, _| a, |a, _| a);
        let rendered = format!("{policy:?}");
        assert!(rendered.contains("RunAll"));
    }
}
