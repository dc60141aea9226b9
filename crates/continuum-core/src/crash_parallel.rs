//! Crash-plane parallel combinators (spec §4.6 "Crash-channel parallels"):
//! `merge`, `merge_all`, `coalesce`.
//!
//! These mirror [`crate::parallel::both`]/[`crate::parallel::all`], but are
//! governed by [`CrashPolicy<F, A>`] instead of `OkPolicy<F>`. The two
//! policy types look similar because they share the same three variant
//! names, but `CrashPolicy::RunAll` carries *two* combine functions
//! (`combine_else`, `combine_then`) rather than one, since the crash-plane
//! primitives need to reconcile both halves of the outcome without an
//! external `combine` argument the way `both` takes one. `coalesce` is the
//! single-continuation special case: fold a crash and its recovery
//! continuation's outcome through the same reconciliation rule `merge`
//! uses for two children, rather than racing two continuations.

use std::sync::{Arc, Mutex};

use crate::combinators::guard_panic;
use crate::cont::Continuation;
use crate::error::ContCrash;
use crate::observer::Observer;
use crate::policy::CrashPolicy;

enum Failure<F> {
    Else(F),
    Crash(ContCrash),
}

fn merge_failures<F>(
    left: Failure<F>,
    right: Failure<F>,
    combine_else: &Arc<dyn Fn(F, F) -> F + Send + Sync>,
    should_favor_else: bool,
) -> Failure<F> {
    match (left, right) {
        (Failure::Else(a), Failure::Else(b)) => {
            let combine_else = Arc::clone(combine_else);
            match guard_panic(move || combine_else(a, b)) {
                Ok(merged) => Failure::Else(merged),
                Err(crash) => Failure::Crash(crash),
            }
        }
        (Failure::Crash(a), Failure::Crash(b)) => Failure::Crash(ContCrash::merge(a, b)),
        (Failure::Else(e), Failure::Crash(c)) | (Failure::Crash(c), Failure::Else(e)) => {
            if should_favor_else {
                Failure::Else(e)
            } else {
                Failure::Crash(c)
            }
        }
    }
}

fn notify_failure<F, A>(observer: &Observer<F, A>, failure: Failure<F>) {
    match failure {
        Failure::Else(e) => observer.notify_else(e),
        Failure::Crash(c) => observer.notify_crash(c),
    }
}

enum Landed<A> {
    Then(A),
    Else,
    Crash,
}

struct MergeState<F, A> {
    left: Option<Landed<A>>,
    right: Option<Landed<A>>,
    left_failure: Option<Failure<F>>,
    right_failure: Option<Failure<F>>,
}

/// `merge(left, right, combine, policy)`: both children must succeed.
///
/// Takes an explicit `combine` for the two-successes case, the same way
/// [`crate::parallel::both`] does — `policy`'s own `combine_then` field
/// exists for signature fidelity with spec.md's `CrashPolicy`, but only the
/// `RunAll` path actually has a use for a *second*, policy-driven combine
/// function (reconciling two failures); `Sequence`/`QuitFast` read no
/// fields off `policy` beyond which variant it is.
///
/// - `Sequence`: run `left`; only if it lands on `Then` is `right` ever
///   invoked; any other outcome (`Else` or `Crash`) from `left` propagates
///   immediately, without running `right`.
/// - `QuitFast`: start both immediately; the first non-`Then` outcome
///   short-circuits the result, whether it's an `Else` or a `Crash`.
/// - `RunAll`: start both immediately; wait for both; if both succeed,
///   `combine` them; if either fails, merge the failures via
///   `combine_else`/`should_favor_else`.
pub fn merge<E, F, A>(
    left: Continuation<E, F, A>,
    right: Continuation<E, F, A>,
    combine: impl Fn(A, A) -> A + Send + Sync + 'static,
    policy: CrashPolicy<F, A>,
) -> Continuation<E, F, A>
where
    E: Send + Sync + 'static,
    F: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    match policy {
        CrashPolicy::Sequence => merge_sequence(left, right, combine),
        CrashPolicy::QuitFast => merge_quit_fast(left, right, combine),
        CrashPolicy::RunAll { should_favor_else, combine_else, .. } => {
            merge_run_all(left, right, combine, combine_else, should_favor_else)
        }
    }
}

fn merge_sequence<E, F, A>(
    left: Continuation<E, F, A>,
    right: Continuation<E, F, A>,
    combine: impl Fn(A, A) -> A + Send + Sync + 'static,
) -> Continuation<E, F, A>
where
    E: Send + Sync + 'static,
    F: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    Continuation::from_run(move |runtime, observer: Observer<F, A>| {
        if runtime.is_cancelled() {
            return;
        }
        let runtime_for_right = runtime.clone();
        let right = right.clone();
        let observer_else = observer.clone();
        let observer_crash = observer.clone();
        left.invoke(
            runtime,
            Observer::new()
                .with_on_then(move |a| {
                    let observer_then2 = observer.clone();
                    let observer_else2 = observer.clone();
                    let observer_crash2 = observer.clone();
                    right.invoke(
                        &runtime_for_right,
                        Observer::new()
                            .with_on_then(move |b| match guard_panic(|| combine(a, b)) {
                                Ok(combined) => observer_then2.notify_then(combined),
                                Err(crash) => observer_then2.notify_crash(crash),
                            })
                            .with_on_else(move |e| observer_else2.notify_else(e))
                            .with_on_crash(move |c| observer_crash2.notify_crash(c))
                            .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
                    );
                })
                .with_on_else(move |e| observer_else.notify_else(e))
                .with_on_crash(move |c| observer_crash.notify_crash(c))
                .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
        );
    })
}

struct QuitFastState<A> {
    left: Option<A>,
    right: Option<A>,
    settled: bool,
}

fn merge_quit_fast<E, F, A>(
    left: Continuation<E, F, A>,
    right: Continuation<E, F, A>,
    combine: impl Fn(A, A) -> A + Send + Sync + 'static,
) -> Continuation<E, F, A>
where
    E: Send + Sync + 'static,
    F: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    let combine = Arc::new(combine);
    Continuation::from_run(move |runtime, observer: Observer<F, A>| {
        if runtime.is_cancelled() {
            return;
        }
        let state: Arc<Mutex<QuitFastState<A>>> =
            Arc::new(Mutex::new(QuitFastState { left: None, right: None, settled: false }));

        for (side, pick_left) in [(left.clone(), true), (right.clone(), false)] {
            let state = Arc::clone(&state);
            let observer = observer.clone();
            let combine = Arc::clone(&combine);
            let state_fail = Arc::clone(&state);
            let observer_fail = observer.clone();
            side.invoke(
                runtime,
                Observer::new()
                    .with_on_then(move |value| {
                        let mut guard = state.lock().unwrap();
                        if guard.settled {
                            return;
                        }
                        let other = if pick_left { guard.right.take() } else { guard.left.take() };
                        if let Some(other) = other {
                            guard.settled = true;
                            drop(guard);
                            let (a, b) = if pick_left { (value, other) } else { (other, value) };
                            match guard_panic(|| combine(a, b)) {
                                Ok(combined) => observer.notify_then(combined),
                                Err(crash) => observer.notify_crash(crash),
                            }
                        } else if pick_left {
                            guard.left = Some(value);
                        } else {
                            guard.right = Some(value);
                        }
                    })
                    .with_on_else(move |e| {
                        let mut guard = state_fail.lock().unwrap();
                        if guard.settled {
                            return;
                        }
                        guard.settled = true;
                        drop(guard);
                        observer_fail.notify_else(e);
                    })
                    .with_on_crash({
                        let state = Arc::clone(&state_fail);
                        let observer = observer_fail.clone();
                        move |c| {
                            let mut guard = state.lock().unwrap();
                            if guard.settled {
                                return;
                            }
                            guard.settled = true;
                            drop(guard);
                            observer.notify_crash(c);
                        }
                    })
                    .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
            );
        }
    })
}

fn merge_run_all<E, F, A>(
    left: Continuation<E, F, A>,
    right: Continuation<E, F, A>,
    combine: impl Fn(A, A) -> A + Send + Sync + 'static,
    combine_else: Arc<dyn Fn(F, F) -> F + Send + Sync>,
    should_favor_else: bool,
) -> Continuation<E, F, A>
where
    E: Send + Sync + 'static,
    F: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    let combine_then = Arc::new(combine);
    Continuation::from_run(move |runtime, observer: Observer<F, A>| {
        if runtime.is_cancelled() {
            return;
        }
        let state: Arc<Mutex<MergeState<F, A>>> = Arc::new(Mutex::new(MergeState {
            left: None,
            right: None,
            left_failure: None,
            right_failure: None,
        }));

        fn maybe_finish<F, A>(
            state: &Arc<Mutex<MergeState<F, A>>>,
            observer: &Observer<F, A>,
            combine_then: &Arc<dyn Fn(A, A) -> A + Send + Sync>,
            combine_else: &Arc<dyn Fn(F, F) -> F + Send + Sync>,
            should_favor_else: bool,
        ) where
            F: Send + Sync + 'static,
            A: Send + Sync + 'static,
        {
            let mut guard = state.lock().unwrap();
            if guard.left.is_none() || guard.right.is_none() {
                return;
            }
            let left = guard.left.take().unwrap();
            let right = guard.right.take().unwrap();
            let left_failure = guard.left_failure.take();
            let right_failure = guard.right_failure.take();
            drop(guard);
            match (left, right) {
                (Landed::Then(a), Landed::Then(b)) => match guard_panic(|| combine_then(a, b)) {
                    Ok(combined) => observer.notify_then(combined),
                    Err(crash) => observer.notify_crash(crash),
                },
                (Landed::Then(_), _) => notify_failure(observer, right_failure.unwrap()),
                (_, Landed::Then(_)) => notify_failure(observer, left_failure.unwrap()),
                (_, _) => {
                    let merged = merge_failures(
                        left_failure.unwrap(),
                        right_failure.unwrap(),
                        combine_else,
                        should_favor_else,
                    );
                    notify_failure(observer, merged);
                }
            }
        }

        for (side, pick_left) in [(left.clone(), true), (right.clone(), false)] {
            let state = Arc::clone(&state);
            let observer = observer.clone();
            let combine_then = Arc::clone(&combine_then);
            let combine_else = Arc::clone(&combine_else);
            side.invoke(
                runtime,
                Observer::new()
                    .with_on_then({
                        let state = Arc::clone(&state);
                        let observer = observer.clone();
                        let combine_then = Arc::clone(&combine_then);
                        let combine_else = Arc::clone(&combine_else);
                        move |a| {
                            {
                                let mut guard = state.lock().unwrap();
                                if pick_left {
                                    guard.left = Some(Landed::Then(a));
                                } else {
                                    guard.right = Some(Landed::Then(a));
                                }
                            }
                            maybe_finish(&state, &observer, &combine_then, &combine_else, should_favor_else);
                        }
                    })
                    .with_on_else({
                        let state = Arc::clone(&state);
                        let observer = observer.clone();
                        let combine_then = Arc::clone(&combine_then);
                        let combine_else = Arc::clone(&combine_else);
                        move |e| {
                            {
                                let mut guard = state.lock().unwrap();
                                if pick_left {
                                    guard.left = Some(Landed::Else);
                                    guard.left_failure = Some(Failure::Else(e));
                                } else {
                                    guard.right = Some(Landed::Else);
                                    guard.right_failure = Some(Failure::Else(e));
                                }
                            }
                            maybe_finish(&state, &observer, &combine_then, &combine_else, should_favor_else);
                        }
                    })
                    .with_on_crash({
                        let observer = observer.clone();
                        move |c| {
                            {
                                let mut guard = state.lock().unwrap();
                                if pick_left {
                                    guard.left = Some(Landed::Crash);
                                    guard.left_failure = Some(Failure::Crash(c));
                                } else {
                                    guard.right = Some(Landed::Crash);
                                    guard.right_failure = Some(Failure::Crash(c));
                                }
                            }
                            maybe_finish(&state, &observer, &combine_then, &combine_else, should_favor_else);
                        }
                    })
                    .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
            );
        }
    })
}

/// `merge_all(items, combine, policy)`: N-ary [`merge`], folding left to
/// right.
///
/// `combine` is reused at every fold step, the same way [`merge`] takes one
/// explicit `combine` for a single pair — there is no `A: Default` bound
/// here to synthesize an identity, so unlike [`crate::parallel::all`] (whose
/// identity is always `vec![]`) an empty crash-plane merge has no canonical
/// result and is rejected: callers fold over a non-empty `items` list.
pub fn merge_all<E, F, A>(
    mut items: Vec<Continuation<E, F, A>>,
    combine: impl Fn(A, A) -> A + Send + Sync + 'static,
    policy: CrashPolicy<F, A>,
) -> Option<Continuation<E, F, A>>
where
    E: Send + Sync + 'static,
    F: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    if items.is_empty() {
        return None;
    }
    let combine = Arc::new(combine);
    let first = items.remove(0);
    Some(items.into_iter().fold(first, |acc, item| {
        let combine = Arc::clone(&combine);
        merge(acc, item, move |a, b| combine(a, b), policy.clone())
    }))
}

/// `coalesce(primary, fallback, policy)`: if `primary` crashes, reconcile
/// its crash with `fallback`'s outcome via the same rule [`merge`]'s
/// `RunAll` uses; any other outcome from `primary` passes through
/// unchanged and `fallback` is never invoked (spec §4.6: crash-plane
/// recovery only engages on an actual crash, not on `Else`).
pub fn coalesce<E, F, A>(
    primary: Continuation<E, F, A>,
    fallback: Continuation<E, F, A>,
    policy: CrashPolicy<F, A>,
) -> Continuation<E, F, A>
where
    E: Send + Sync + 'static,
    F: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    // `combine_then` goes unused here: coalesce only reconciles a crash from
    // `primary` against whatever `fallback` lands on, and a crash can never
    // be the `Then` side of that reconciliation, so there is no
    // two-successes case to combine.
    let (should_favor_else, combine_else) = match policy {
        CrashPolicy::RunAll { should_favor_else, combine_else, .. } => (should_favor_else, combine_else),
        CrashPolicy::Sequence | CrashPolicy::QuitFast => {
            return coalesce_first_wins(primary, fallback);
        }
    };
    Continuation::from_run(move |runtime, observer: Observer<F, A>| {
        if runtime.is_cancelled() {
            return;
        }
        let runtime_for_fallback = runtime.clone();
        let fallback = fallback.clone();
        let combine_else = Arc::clone(&combine_else);
        let observer_then = observer.clone();
        let observer_else = observer.clone();
        primary.invoke(
            runtime,
            Observer::new()
                .with_on_then(move |a| observer_then.notify_then(a))
                .with_on_else(move |e| observer_else.notify_else(e))
                .with_on_crash(move |primary_crash| {
                    let observer_inner_then = observer.clone();
                    let observer_inner_else = observer.clone();
                    let combine_else = Arc::clone(&combine_else);
                    fallback.invoke(
                        &runtime_for_fallback,
                        Observer::new()
                            .with_on_then(move |b| observer_inner_then.notify_then(b))
                            .with_on_else(move |e| {
                                let merged = merge_failures(
                                    Failure::Crash(primary_crash),
                                    Failure::Else(e),
                                    &combine_else,
                                    should_favor_else,
                                );
                                notify_failure(&observer_inner_else, merged);
                            })
                            .with_on_crash(move |fallback_crash| {
                                observer.notify_crash(ContCrash::merge(primary_crash, fallback_crash));
                            })
                            .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
                    );
                })
                .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
        );
    })
}

fn coalesce_first_wins<E, F, A>(
    primary: Continuation<E, F, A>,
    fallback: Continuation<E, F, A>,
) -> Continuation<E, F, A>
where
    E: Send + Sync + 'static,
    F: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    Continuation::from_run(move |runtime, observer: Observer<F, A>| {
        if runtime.is_cancelled() {
            return;
        }
        let runtime_for_fallback = runtime.clone();
        let fallback = fallback.clone();
        let observer_then = observer.clone();
        let observer_else = observer.clone();
        primary.invoke(
            runtime,
            Observer::new()
                .with_on_then(move |a| observer_then.notify_then(a))
                .with_on_else(move |e| observer_else.notify_else(e))
                .with_on_crash(move |_primary_crash| {
                    fallback.invoke(&runtime_for_fallback, observer.clone());
                })
                .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    fn run_collect<F, A>(cont: Continuation<(), F, A>) -> Vec<String>
    where
        F: std::fmt::Debug + 'static,
        A: std::fmt::Debug + 'static,
    {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_then = Arc::clone(&log);
        let log_else = Arc::clone(&log);
        let log_crash = Arc::clone(&log);
        let observer = Observer::new()
            .with_on_then(move |v| log_then.lock().unwrap().push(format!("then:{v:?}")))
            .with_on_else(move |v| log_else.lock().unwrap().push(format!("else:{v:?}")))
            .with_on_crash(move |c| log_crash.lock().unwrap().push(format!("crash:{c}")));
        cont.invoke(&Runtime::new(()), observer);
        Arc::try_unwrap(log).unwrap().into_inner().unwrap()
    }

    #[test]
    fn merge_run_all_combines_two_successes() {
        let cont: Continuation<(), String, i32> = merge(
            Continuation::of(2),
            Continuation::of(3),
            |a: i32, b: i32| a + b,
            CrashPolicy::run_all(false, |a: String, b: String| format!("{a}+{b}"), |a: i32, b: i32| a + b),
        );
        assert_eq!(run_collect(cont), vec!["then:5".to_string()]);
    }

    #[test]
    fn merge_run_all_merges_two_crashes() {
        let a = ContCrash::from_panic_payload(Box::new("a"));
        let b = ContCrash::from_panic_payload(Box::new("b"));
        let cont: Continuation<(), String, i32> = merge(
            Continuation::crash(a),
            Continuation::crash(b),
            |x: i32, y: i32| x + y,
            CrashPolicy::run_all(false, |x: String, y: String| format!("{x}+{y}"), |x: i32, y: i32| x + y),
        );
        let logged = run_collect(cont);
        assert_eq!(logged.len(), 1);
        assert!(logged[0].starts_with("crash: merged crash"));
    }

    #[test]
    fn merge_run_all_favors_else_when_configured() {
        let crash = ContCrash::from_panic_payload(Box::new("boom"));
        let cont: Continuation<(), String, i32> = merge(
            Continuation::error("expected".to_string()),
            Continuation::crash(crash),
            |x: i32, y: i32| x + y,
            CrashPolicy::run_all(true, |x: String, y: String| format!("{x}+{y}"), |x: i32, y: i32| x + y),
        );
        assert_eq!(run_collect(cont), vec!["else:\"expected\"".to_string()]);
    }

    #[test]
    fn coalesce_passes_through_non_crash_outcomes() {
        let cont: Continuation<(), String, i32> =
            coalesce(Continuation::of(1), Continuation::of(2), CrashPolicy::sequence());
        assert_eq!(run_collect(cont), vec!["then:1".to_string()]);
    }

    #[test]
    fn coalesce_falls_back_on_crash() {
        let crash = ContCrash::from_panic_payload(Box::new("boom"));
        let cont: Continuation<(), String, i32> =
            coalesce(Continuation::crash(crash), Continuation::of(7), CrashPolicy::sequence());
        assert_eq!(run_collect(cont), vec!["then:7".to_string()]);
    }

    #[test]
    fn coalesce_merges_crash_and_fallback_else_under_run_all() {
        let crash = ContCrash::from_panic_payload(Box::new("boom"));
        let cont: Continuation<(), String, i32> = coalesce(
            Continuation::crash(crash),
            Continuation::error("fallback failed".to_string()),
            CrashPolicy::run_all(true, |a: String, b: String| format!("{a}+{b}"), |a: i32, b: i32| a + b),
        );
        assert_eq!(run_collect(cont), vec!["else:\"fallback failed\"".to_string()]);
    }

    #[test]
    fn merge_all_folds_left_to_right() {
        let items: Vec<Continuation<(), String, i32>> =
            vec![Continuation::of(1), Continuation::of(2), Continuation::of(3)];
        let cont = merge_all(
            items,
            |a: i32, b: i32| a + b,
            CrashPolicy::run_all(false, |a: String, b: String| format!("{a}+{b}"), |a: i32, b: i32| a + b),
        )
        .expect("non-empty items");
        assert_eq!(run_collect(cont), vec!["then:6".to_string()]);
    }

    #[test]
    fn merge_all_empty_is_none() {
        let items: Vec<Continuation<(), String, i32>> = Vec::new();
        assert!(merge_all(items, |a: i32, b: i32| a + b, CrashPolicy::sequence()).is_none());
    }
}
