//! Parallel combinators (component C8): `both`, `all`, `either`, `any`.
//!
//! Spec §4.6 names three policies — `Sequence`, `QuitFast`, `RunAll` —
//! shared by all four primitives, and gives each primitive its own
//! explicit success-combining function (`both`'s `combine`) or
//! error-combining function (`either`'s `combineError`), independent of
//! policy (spec scenario 4 passes `combine` positionally no matter which
//! policy is chosen). [`OkPolicy<T>`] is read by the orchestrator to
//! decide how to merge the *other* channel once more than one child lands
//! on it: the failure type for `both`/`all` (whose success side is
//! already the explicit `combine`), and the success type for
//! `either`/`any` (whose failure side is the explicit `combine_error`).
//! spec.md leaves which channel `T` ranges over ambiguous; DESIGN.md
//! records this as the resolved reading.
//!
//! Nothing here runs children on separate OS threads — "parallel" means
//! what spec §5 means: children are started without waiting on each
//! other, and each may itself defer its notification to a later
//! synchronous call (e.g. a host timer firing). `QuitFast`/`RunAll` track
//! partial results behind a `Mutex` so whichever child lands second sees
//! the first child's outcome already recorded, without true threading.

use std::sync::{Arc, Mutex};

use crate::cont::Continuation;
use crate::combinators::guard_panic;
use crate::error::ContCrash;
use crate::observer::Observer;
use crate::policy::OkPolicy;

/// Either channel a child landed on besides success, used internally to
/// merge the two non-success outcomes a `RunAll` policy must reconcile.
enum Failure<F> {
    Else(F),
    Crash(ContCrash),
}

/// Merges two non-success outcomes per spec §4.6's `RunAll` rule. A panic
/// inside `combine_fail` is caught and reported as the merged outcome's
/// crash, same as any other user callback a combinator invokes.
fn merge_failures<F>(
    left: Failure<F>,
    right: Failure<F>,
    combine_fail: &Arc<dyn Fn(F, F) -> F + Send + Sync>,
    should_favor_crash: bool,
) -> Failure<F> {
    match (left, right) {
        (Failure::Else(a), Failure::Else(b)) => {
            let combine_fail = Arc::clone(combine_fail);
            match guard_panic(move || combine_fail(a, b)) {
                Ok(merged) => Failure::Else(merged),
                Err(crash) => Failure::Crash(crash),
            }
        }
        (Failure::Crash(a), Failure::Crash(b)) => Failure::Crash(ContCrash::merge(a, b)),
        (Failure::Else(e), Failure::Crash(c)) | (Failure::Crash(c), Failure::Else(e)) => {
            if should_favor_crash {
                Failure::Crash(c)
            } else {
                Failure::Else(e)
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

/// `both(l, r, combine, policy)`: require both continuations to succeed.
///
/// - `Sequence`: run `left`; only if it lands on `Then` is `right` ever
///   invoked (spec scenario 4: "the right side is never constructed").
/// - `QuitFast`: start both immediately; the first failure observed
///   short-circuits the result.
/// - `RunAll`: start both immediately; wait for both; if both succeed,
///   `combine` the values; if either fails, merge the failures per
///   `policy` (`should_favor_crash` breaks an else-vs-crash tie).
pub fn both<E, F, A, B, C>(
    left: Continuation<E, F, A>,
    right: Continuation<E, F, B>,
    combine: impl Fn(A, B) -> C + Send + Sync + 'static,
    policy: OkPolicy<F>,
) -> Continuation<E, F, C>
where
    E: Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    match policy {
        OkPolicy::Sequence => both_sequence(left, right, combine),
        OkPolicy::QuitFast => both_quit_fast(left, right, combine),
        OkPolicy::RunAll { combine: combine_fail, should_favor_crash } => {
            both_run_all(left, right, combine, combine_fail, should_favor_crash)
        }
    }
}

fn both_sequence<E, F, A, B, C>(
    left: Continuation<E, F, A>,
    right: Continuation<E, F, B>,
    combine: impl Fn(A, B) -> C + Send + Sync + 'static,
) -> Continuation<E, F, C>
where
    E: Send + Sync + 'static,
    F: Send + Sync + 'static,
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    let combine = Arc::new(combine);
    Continuation::from_run(move |runtime, observer: Observer<F, C>| {
        if runtime.is_cancelled() {
            return;
        }
        let runtime_for_right = runtime.clone();
        let right = right.clone();
        let combine = Arc::clone(&combine);
        let observer_else = observer.clone();
        let observer_crash = observer.clone();
        left.invoke(
            runtime,
            Observer::new()
                .with_on_then(move |a| {
                    let combine = Arc::clone(&combine);
                    let observer_then = observer.clone();
                    let observer_else2 = observer.clone();
                    let observer_crash2 = observer.clone();
                    right.invoke(
                        &runtime_for_right,
                        Observer::new()
                            .with_on_then(move |b| match guard_panic(|| combine(a, b)) {
                                Ok(combined) => observer_then.notify_then(combined),
                                Err(crash) => observer_then.notify_crash(crash),
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

struct BothState<A, B> {
    left: Option<A>,
    right: Option<B>,
    settled: bool,
}

fn both_quit_fast<E, F, A, B, C>(
    left: Continuation<E, F, A>,
    right: Continuation<E, F, B>,
    combine: impl Fn(A, B) -> C + Send + Sync + 'static,
) -> Continuation<E, F, C>
where
    E: Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    let combine = Arc::new(combine);
    Continuation::from_run(move |runtime, observer: Observer<F, C>| {
        if runtime.is_cancelled() {
            return;
        }
        let state: Arc<Mutex<BothState<A, B>>> =
            Arc::new(Mutex::new(BothState { left: None, right: None, settled: false }));

        {
            let state = Arc::clone(&state);
            let observer = observer.clone();
            let combine = Arc::clone(&combine);
            let state2 = Arc::clone(&state);
            let observer2 = observer.clone();
            let state3 = Arc::clone(&state);
            let observer3 = observer.clone();
            left.invoke(
                runtime,
                Observer::new()
                    .with_on_then(move |a| {
                        let mut guard = state.lock().unwrap();
                        if guard.settled {
                            return;
                        }
                        if let Some(b) = guard.right.take() {
                            guard.settled = true;
                            drop(guard);
                            match guard_panic(|| combine(a, b)) {
                                Ok(combined) => observer.notify_then(combined),
                                Err(crash) => observer.notify_crash(crash),
                            }
                        } else {
                            guard.left = Some(a);
                        }
                    })
                    .with_on_else(move |e| {
                        let mut guard = state2.lock().unwrap();
                        if guard.settled {
                            return;
                        }
                        guard.settled = true;
                        drop(guard);
                        observer2.notify_else(e);
                    })
                    .with_on_crash(move |c| {
                        let mut guard = state3.lock().unwrap();
                        if guard.settled {
                            return;
                        }
                        guard.settled = true;
                        drop(guard);
                        observer3.notify_crash(c);
                    })
                    .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
            );
        }

        {
            let observer = observer.clone();
            let state2 = Arc::clone(&state);
            let observer2 = observer.clone();
            let state3 = Arc::clone(&state);
            let observer3 = observer.clone();
            right.invoke(
                runtime,
                Observer::new()
                    .with_on_then(move |b| {
                        let mut guard = state.lock().unwrap();
                        if guard.settled {
                            return;
                        }
                        if let Some(a) = guard.left.take() {
                            guard.settled = true;
                            drop(guard);
                            match guard_panic(|| combine(a, b)) {
                                Ok(combined) => observer.notify_then(combined),
                                Err(crash) => observer.notify_crash(crash),
                            }
                        } else {
                            guard.right = Some(b);
                        }
                    })
                    .with_on_else(move |e| {
                        let mut guard = state2.lock().unwrap();
                        if guard.settled {
                            return;
                        }
                        guard.settled = true;
                        drop(guard);
                        observer2.notify_else(e);
                    })
                    .with_on_crash(move |c| {
                        let mut guard = state3.lock().unwrap();
                        if guard.settled {
                            return;
                        }
                        guard.settled = true;
                        drop(guard);
                        observer3.notify_crash(c);
                    })
                    .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
            );
        }
    })
}

enum Landed<A> {
    Then(A),
    Else,
    Crash,
}

struct RunAllState<F, A, B> {
    left: Option<Landed<A>>,
    right: Option<Landed<B>>,
    left_failure: Option<Failure<F>>,
    right_failure: Option<Failure<F>>,
}

fn both_run_all<E, F, A, B, C>(
    left: Continuation<E, F, A>,
    right: Continuation<E, F, B>,
    combine: impl Fn(A, B) -> C + Send + Sync + 'static,
    combine_fail: Arc<dyn Fn(F, F) -> F + Send + Sync>,
    should_favor_crash: bool,
) -> Continuation<E, F, C>
where
    E: Send + Sync + 'static,
    F: Send + Sync + 'static,
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    let combine = Arc::new(combine);
    Continuation::from_run(move |runtime, observer: Observer<F, C>| {
        if runtime.is_cancelled() {
            return;
        }
        let state: Arc<Mutex<RunAllState<F, A, B>>> = Arc::new(Mutex::new(RunAllState {
            left: None,
            right: None,
            left_failure: None,
            right_failure: None,
        }));

        fn maybe_finish<F, A, B, C>(
            state: &Arc<Mutex<RunAllState<F, A, B>>>,
            observer: &Observer<F, C>,
            combine: &Arc<dyn Fn(A, B) -> C + Send + Sync>,
            combine_fail: &Arc<dyn Fn(F, F) -> F + Send + Sync>,
            should_favor_crash: bool,
        ) where
            A: Send + Sync + 'static,
            B: Send + Sync + 'static,
            C: Send + Sync + 'static,
            F: Send + Sync + 'static,
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
                (Landed::Then(a), Landed::Then(b)) => match guard_panic(|| combine(a, b)) {
                    Ok(combined) => observer.notify_then(combined),
                    Err(crash) => observer.notify_crash(crash),
                },
                (Landed::Then(_), _) => notify_failure(observer, right_failure.unwrap()),
                (_, Landed::Then(_)) => notify_failure(observer, left_failure.unwrap()),
                (_, _) => {
                    let merged =
                        merge_failures(left_failure.unwrap(), right_failure.unwrap(), combine_fail, should_favor_crash);
                    notify_failure(observer, merged);
                }
            }
        }

        {
            let state = Arc::clone(&state);
            let observer = observer.clone();
            let combine = Arc::clone(&combine);
            let combine_fail = Arc::clone(&combine_fail);
            let state_e = Arc::clone(&state);
            let observer_e = observer.clone();
            let combine_e = Arc::clone(&combine);
            let combine_fail_e = Arc::clone(&combine_fail);
            let state_c = Arc::clone(&state);
            let observer_c = observer.clone();
            let combine_c = Arc::clone(&combine);
            let combine_fail_c = Arc::clone(&combine_fail);
            left.invoke(
                runtime,
                Observer::new()
                    .with_on_then(move |a| {
                        state.lock().unwrap().left = Some(Landed::Then(a));
                        maybe_finish(&state, &observer, &combine, &combine_fail, should_favor_crash);
                    })
                    .with_on_else(move |e| {
                        {
                            let mut guard = state_e.lock().unwrap();
                            guard.left = Some(Landed::Else);
                            guard.left_failure = Some(Failure::Else(e));
                        }
                        maybe_finish(&state_e, &observer_e, &combine_e, &combine_fail_e, should_favor_crash);
                    })
                    .with_on_crash(move |c| {
                        {
                            let mut guard = state_c.lock().unwrap();
                            guard.left = Some(Landed::Crash);
                            guard.left_failure = Some(Failure::Crash(c));
                        }
                        maybe_finish(&state_c, &observer_c, &combine_c, &combine_fail_c, should_favor_crash);
                    })
                    .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
            );
        }

        {
            let observer = observer.clone();
            let state_e = Arc::clone(&state);
            let observer_e = observer.clone();
            let combine_e = Arc::clone(&combine);
            let combine_fail_e = Arc::clone(&combine_fail);
            let state_c = Arc::clone(&state);
            let observer_c = observer.clone();
            let combine_c = Arc::clone(&combine);
            let combine_fail_c = Arc::clone(&combine_fail);
            right.invoke(
                runtime,
                Observer::new()
                    .with_on_then(move |b| {
                        state.lock().unwrap().right = Some(Landed::Then(b));
                        maybe_finish(&state, &observer, &combine, &combine_fail, should_favor_crash);
                    })
                    .with_on_else(move |e| {
                        {
                            let mut guard = state_e.lock().unwrap();
                            guard.right = Some(Landed::Else);
                            guard.right_failure = Some(Failure::Else(e));
                        }
                        maybe_finish(&state_e, &observer_e, &combine_e, &combine_fail_e, should_favor_crash);
                    })
                    .with_on_crash(move |c| {
                        {
                            let mut guard = state_c.lock().unwrap();
                            guard.right = Some(Landed::Crash);
                            guard.right_failure = Some(Failure::Crash(c));
                        }
                        maybe_finish(&state_c, &observer_c, &combine_c, &combine_fail_c, should_favor_crash);
                    })
                    .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
            );
        }
    })
}

/// `all(items, policy)`: N-ary generalization of [`both`], collecting
/// successes into a `Vec` in input order.
///
/// `all([], policy) ≡ of(vec![])` regardless of policy — the fold below
/// starts from that identity and never touches `policy` when `items` is
/// empty, which gives the empty case for free.
pub fn all<E, F, A>(
    items: Vec<Continuation<E, F, A>>,
    policy: OkPolicy<F>,
) -> Continuation<E, F, Vec<A>>
where
    E: Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    items.into_iter().fold(Continuation::of(Vec::new()), |acc, item| {
        both(
            acc,
            item,
            |mut v: Vec<A>, x: A| {
                v.push(x);
                v
            },
            policy.clone(),
        )
    })
}

/// `either(l, r, combine_error, policy)`: race for the first success.
///
/// - `Sequence`: try `left`; if it lands on `Then` or `Crash`, that wins
///   outright (crash is treated as determining, not merely "try next");
///   otherwise try `right`; if both land on `Else`, concatenate with
///   `combine_error`.
/// - `QuitFast`: start both immediately; the first `Then`/`Crash` wins.
/// - `RunAll`: start both immediately; wait for both; if either succeeds,
///   combine successes via `policy`; otherwise combine the two failures
///   (crash-vs-else ties broken by `should_favor_crash`, else+else merged
///   via `combine_error`).
pub fn either<E, F, A>(
    left: Continuation<E, F, A>,
    right: Continuation<E, F, A>,
    combine_error: impl Fn(F, F) -> F + Send + Sync + 'static,
    policy: OkPolicy<A>,
) -> Continuation<E, F, A>
where
    E: Send + Sync + 'static,
    F: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    match policy {
        OkPolicy::Sequence => either_sequence(left, right, combine_error),
        OkPolicy::QuitFast => either_quit_fast(left, right, combine_error),
        OkPolicy::RunAll { combine: combine_success, should_favor_crash } => {
            either_run_all(left, right, combine_error, combine_success, should_favor_crash)
        }
    }
}

fn either_sequence<E, F, A>(
    left: Continuation<E, F, A>,
    right: Continuation<E, F, A>,
    combine_error: impl Fn(F, F) -> F + Send + Sync + 'static,
) -> Continuation<E, F, A>
where
    E: Send + Sync + 'static,
    F: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    let combine_error = Arc::new(combine_error);
    Continuation::from_run(move |runtime, observer: Observer<F, A>| {
        if runtime.is_cancelled() {
            return;
        }
        let runtime_for_right = runtime.clone();
        let right = right.clone();
        let combine_error = Arc::clone(&combine_error);
        let observer_then = observer.clone();
        let observer_crash = observer.clone();
        left.invoke(
            runtime,
            Observer::new()
                .with_on_then(move |a| observer_then.notify_then(a))
                .with_on_crash(move |c| observer_crash.notify_crash(c))
                .with_on_else(move |e1| {
                    let observer_then2 = observer.clone();
                    let observer_crash2 = observer.clone();
                    right.invoke(
                        &runtime_for_right,
                        Observer::new()
                            .with_on_then(move |b| observer_then2.notify_then(b))
                            .with_on_crash(move |c| observer_crash2.notify_crash(c))
                            .with_on_else(move |e2| match guard_panic(|| combine_error(e1, e2)) {
                                Ok(combined) => observer.notify_else(combined),
                                Err(crash) => observer.notify_crash(crash),
                            })
                            .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
                    );
                })
                .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
        );
    })
}

struct EitherQuitFastState<F> {
    left_else: Option<F>,
    right_else: Option<F>,
    settled: bool,
}

fn either_quit_fast<E, F, A>(
    left: Continuation<E, F, A>,
    right: Continuation<E, F, A>,
    combine_error: impl Fn(F, F) -> F + Send + Sync + 'static,
) -> Continuation<E, F, A>
where
    E: Send + Sync + 'static,
    F: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    let combine_error = Arc::new(combine_error);
    Continuation::from_run(move |runtime, observer: Observer<F, A>| {
        if runtime.is_cancelled() {
            return;
        }
        let state: Arc<Mutex<EitherQuitFastState<F>>> =
            Arc::new(Mutex::new(EitherQuitFastState { left_else: None, right_else: None, settled: false }));

        {
            let state = Arc::clone(&state);
            let observer = observer.clone();
            let combine_error = Arc::clone(&combine_error);
            let state2 = Arc::clone(&state);
            let observer2 = observer.clone();
            let state3 = Arc::clone(&state);
            let observer3 = observer.clone();
            left.invoke(
                runtime,
                Observer::new()
                    .with_on_then(move |a| {
                        let mut guard = state.lock().unwrap();
                        if guard.settled {
                            return;
                        }
                        guard.settled = true;
                        drop(guard);
                        observer.notify_then(a);
                    })
                    .with_on_crash(move |c| {
                        let mut guard = state2.lock().unwrap();
                        if guard.settled {
                            return;
                        }
                        guard.settled = true;
                        drop(guard);
                        observer2.notify_crash(c);
                    })
                    .with_on_else(move |e| {
                        let mut guard = state3.lock().unwrap();
                        if guard.settled {
                            return;
                        }
                        if let Some(other) = guard.right_else.take() {
                            guard.settled = true;
                            drop(guard);
                            match guard_panic(|| combine_error(e, other)) {
                                Ok(combined) => observer3.notify_else(combined),
                                Err(crash) => observer3.notify_crash(crash),
                            }
                        } else {
                            guard.left_else = Some(e);
                        }
                    })
                    .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
            );
        }

        {
            let observer = observer.clone();
            let state2 = Arc::clone(&state);
            let observer2 = observer.clone();
            let state3 = Arc::clone(&state);
            let observer3 = observer.clone();
            right.invoke(
                runtime,
                Observer::new()
                    .with_on_then(move |b| {
                        let mut guard = state.lock().unwrap();
                        if guard.settled {
                            return;
                        }
                        guard.settled = true;
                        drop(guard);
                        observer.notify_then(b);
                    })
                    .with_on_crash(move |c| {
                        let mut guard = state2.lock().unwrap();
                        if guard.settled {
                            return;
                        }
                        guard.settled = true;
                        drop(guard);
                        observer2.notify_crash(c);
                    })
                    .with_on_else(move |e| {
                        let mut guard = state3.lock().unwrap();
                        if guard.settled {
                            return;
                        }
                        if let Some(other) = guard.left_else.take() {
                            guard.settled = true;
                            drop(guard);
                            match guard_panic(|| combine_error(other, e)) {
                                Ok(combined) => observer3.notify_else(combined),
                                Err(crash) => observer3.notify_crash(crash),
                            }
                        } else {
                            guard.right_else = Some(e);
                        }
                    })
                    .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
            );
        }
    })
}

enum EitherLanded<A> {
    Then(A),
    Else,
    Crash,
}

struct EitherRunAllState<F, A> {
    left: Option<EitherLanded<A>>,
    right: Option<EitherLanded<A>>,
    left_failure: Option<Failure<F>>,
    right_failure: Option<Failure<F>>,
}

fn either_run_all<E, F, A>(
    left: Continuation<E, F, A>,
    right: Continuation<E, F, A>,
    combine_error: impl Fn(F, F) -> F + Send + Sync + 'static,
    combine_success: Arc<dyn Fn(A, A) -> A + Send + Sync>,
    should_favor_crash: bool,
) -> Continuation<E, F, A>
where
    E: Send + Sync + 'static,
    F: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    let combine_error = Arc::new(combine_error);
    Continuation::from_run(move |runtime, observer: Observer<F, A>| {
        if runtime.is_cancelled() {
            return;
        }
        let state: Arc<Mutex<EitherRunAllState<F, A>>> = Arc::new(Mutex::new(EitherRunAllState {
            left: None,
            right: None,
            left_failure: None,
            right_failure: None,
        }));

        fn maybe_finish<F, A>(
            state: &Arc<Mutex<EitherRunAllState<F, A>>>,
            observer: &Observer<F, A>,
            combine_error: &Arc<dyn Fn(F, F) -> F + Send + Sync>,
            combine_success: &Arc<dyn Fn(A, A) -> A + Send + Sync>,
            should_favor_crash: bool,
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
                (EitherLanded::Then(a), EitherLanded::Then(b)) => match guard_panic(|| combine_success(a, b)) {
                    Ok(combined) => observer.notify_then(combined),
                    Err(crash) => observer.notify_crash(crash),
                },
                (EitherLanded::Then(a), _) => observer.notify_then(a),
                (_, EitherLanded::Then(b)) => observer.notify_then(b),
                (_, _) => {
                    let merged = merge_failures(
                        left_failure.unwrap(),
                        right_failure.unwrap(),
                        combine_error,
                        should_favor_crash,
                    );
                    notify_failure(observer, merged);
                }
            }
        }

        {
            let state = Arc::clone(&state);
            let observer = observer.clone();
            let combine_error = Arc::clone(&combine_error);
            let combine_success = Arc::clone(&combine_success);
            let state_e = Arc::clone(&state);
            let observer_e = observer.clone();
            let combine_error_e = Arc::clone(&combine_error);
            let combine_success_e = Arc::clone(&combine_success);
            let state_c = Arc::clone(&state);
            let observer_c = observer.clone();
            let combine_error_c = Arc::clone(&combine_error);
            let combine_success_c = Arc::clone(&combine_success);
            left.invoke(
                runtime,
                Observer::new()
                    .with_on_then(move |a| {
                        state.lock().unwrap().left = Some(EitherLanded::Then(a));
                        maybe_finish(&state, &observer, &combine_error, &combine_success, should_favor_crash);
                    })
                    .with_on_else(move |e| {
                        {
                            let mut guard = state_e.lock().unwrap();
                            guard.left = Some(EitherLanded::Else);
                            guard.left_failure = Some(Failure::Else(e));
                        }
                        maybe_finish(&state_e, &observer_e, &combine_error_e, &combine_success_e, should_favor_crash);
                    })
                    .with_on_crash(move |c| {
                        {
                            let mut guard = state_c.lock().unwrap();
                            guard.left = Some(EitherLanded::Crash);
                            guard.left_failure = Some(Failure::Crash(c));
                        }
                        maybe_finish(&state_c, &observer_c, &combine_error_c, &combine_success_c, should_favor_crash);
                    })
                    .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
            );
        }

        {
            let observer = observer.clone();
            let state_e = Arc::clone(&state);
            let observer_e = observer.clone();
            let combine_error_e = Arc::clone(&combine_error);
            let combine_success_e = Arc::clone(&combine_success);
            let state_c = Arc::clone(&state);
            let observer_c = observer.clone();
            let combine_error_c = Arc::clone(&combine_error);
            let combine_success_c = Arc::clone(&combine_success);
            right.invoke(
                runtime,
                Observer::new()
                    .with_on_then(move |b| {
                        state.lock().unwrap().right = Some(EitherLanded::Then(b));
                        maybe_finish(&state, &observer, &combine_error, &combine_success, should_favor_crash);
                    })
                    .with_on_else(move |e| {
                        {
                            let mut guard = state_e.lock().unwrap();
                            guard.right = Some(EitherLanded::Else);
                            guard.right_failure = Some(Failure::Else(e));
                        }
                        maybe_finish(&state_e, &observer_e, &combine_error_e, &combine_success_e, should_favor_crash);
                    })
                    .with_on_crash(move |c| {
                        {
                            let mut guard = state_c.lock().unwrap();
                            guard.right = Some(EitherLanded::Crash);
                            guard.right_failure = Some(Failure::Crash(c));
                        }
                        maybe_finish(&state_c, &observer_c, &combine_error_c, &combine_success_c, should_favor_crash);
                    })
                    .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
            );
        }
    })
}

/// `any(items, combine_error, empty_error, policy)`: N-ary generalization
/// of [`either`].
///
/// `any([], Sequence) ≡ error(empty_error)` (spec §8): since there is no
/// child to derive an `F` from, the caller supplies the value to use for
/// the no-candidates case explicitly.
pub fn any<E, F, A>(
    items: Vec<Continuation<E, F, A>>,
    combine_error: impl Fn(F, F) -> F + Send + Sync + 'static,
    empty_error: F,
    policy: OkPolicy<A>,
) -> Continuation<E, F, A>
where
    E: Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    let combine_error = Arc::new(combine_error);
    let mut iter = items.into_iter();
    let Some(first) = iter.next() else {
        return Continuation::error(empty_error);
    };
    iter.fold(first, |acc, item| {
        let combine_error = Arc::clone(&combine_error);
        either(acc, item, move |a, b| combine_error(a, b), policy.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use std::sync::atomic::{AtomicU32, Ordering};

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
    fn both_sequence_combines_two_successes() {
        let cont: Continuation<(), String, i32> =
            both(Continuation::of(2), Continuation::of(3), |a, b| a + b, OkPolicy::sequence());
        assert_eq!(run_collect(cont), vec!["then:5".to_string()]);
    }

    #[test]
    fn both_sequence_never_builds_right_after_left_fails() {
        let invoked = Arc::new(AtomicU32::new(0));
        let invoked2 = Arc::clone(&invoked);
        let right: Continuation<(), String, i32> = Continuation::from_deferred(move || {
            invoked2.fetch_add(1, Ordering::SeqCst);
            Continuation::of(1)
        });
        let cont: Continuation<(), String, i32> = both(
            Continuation::error("left".to_string()),
            right,
            |a: i32, b: i32| a + b,
            OkPolicy::sequence(),
        );
        assert_eq!(run_collect(cont), vec!["else:\"left\"".to_string()]);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn both_quit_fast_combines_two_successes() {
        let cont: Continuation<(), String, i32> =
            both(Continuation::of(2), Continuation::of(3), |a, b| a + b, OkPolicy::quit_fast());
        assert_eq!(run_collect(cont), vec!["then:5".to_string()]);
    }

    #[test]
    fn both_quit_fast_short_circuits_on_first_failure() {
        let cont: Continuation<(), String, i32> = both(
            Continuation::error("left".to_string()),
            Continuation::of(1),
            |a, b| a + b,
            OkPolicy::quit_fast(),
        );
        assert_eq!(run_collect(cont), vec!["else:\"left\"".to_string()]);
    }

    #[test]
    fn both_run_all_combines_failures() {
        let cont: Continuation<(), String, i32> = both(
            Continuation::error("left".to_string()),
            Continuation::error("right".to_string()),
            |a, b| a + b,
            OkPolicy::run_all(|a: String, b: String| format!("{a}+{b}"), false),
        );
        assert_eq!(run_collect(cont), vec!["else:\"left+right\"".to_string()]);
    }

    #[test]
    fn both_run_all_favors_crash_when_configured() {
        let crash = ContCrash::from_panic_payload(Box::new("boom"));
        let cont: Continuation<(), String, i32> = both(
            Continuation::error("left".to_string()),
            Continuation::crash(crash),
            |a, b| a + b,
            OkPolicy::run_all(|a: String, b: String| format!("{a}+{b}"), true),
        );
        let logged = run_collect(cont);
        assert_eq!(logged.len(), 1);
        assert!(logged[0].starts_with("crash:"));
    }

    #[test]
    fn all_empty_is_identity() {
        let cont: Continuation<(), String, Vec<i32>> = all(Vec::new(), OkPolicy::sequence());
        assert_eq!(run_collect(cont), vec!["then:[]".to_string()]);
    }

    #[test]
    fn all_sequence_collects_in_order() {
        let items: Vec<Continuation<(), String, i32>> =
            vec![Continuation::of(1), Continuation::of(2), Continuation::of(3)];
        let cont = all(items, OkPolicy::sequence());
        assert_eq!(run_collect(cont), vec!["then:[1, 2, 3]".to_string()]);
    }

    #[test]
    fn all_sequence_stops_at_first_failure() {
        let items: Vec<Continuation<(), String, i32>> =
            vec![Continuation::of(1), Continuation::error("bad".to_string()), Continuation::of(3)];
        let cont = all(items, OkPolicy::sequence());
        assert_eq!(run_collect(cont), vec!["else:\"bad\"".to_string()]);
    }

    #[test]
    fn either_sequence_first_success_wins() {
        let cont: Continuation<(), String, i32> =
            either(Continuation::of(1), Continuation::of(2), |a, b| format!("{a}+{b}"), OkPolicy::sequence());
        assert_eq!(run_collect(cont), vec!["then:1".to_string()]);
    }

    #[test]
    fn either_sequence_merges_errors_when_both_fail() {
        let cont: Continuation<(), String, i32> = either(
            Continuation::error("a".to_string()),
            Continuation::error("b".to_string()),
            |x, y| format!("{x}+{y}"),
            OkPolicy::sequence(),
        );
        assert_eq!(run_collect(cont), vec!["else:\"a+b\"".to_string()]);
    }

    #[test]
    fn either_quit_fast_first_success_wins() {
        let cont: Continuation<(), String, i32> = either(
            Continuation::error("a".to_string()),
            Continuation::of(2),
            |x, y| format!("{x}+{y}"),
            OkPolicy::quit_fast(),
        );
        assert_eq!(run_collect(cont), vec!["then:2".to_string()]);
    }

    #[test]
    fn any_empty_yields_supplied_error() {
        let cont: Continuation<(), String, i32> =
            any(Vec::new(), |a, b| format!("{a}+{b}"), "empty".to_string(), OkPolicy::sequence());
        assert_eq!(run_collect(cont), vec!["else:\"empty\"".to_string()]);
    }

    #[test]
    fn any_sequence_first_success_wins() {
        let items: Vec<Continuation<(), String, i32>> =
            vec![Continuation::error("a".to_string()), Continuation::of(9), Continuation::error("c".to_string())];
        let cont = any(items, |x, y| format!("{x}+{y}"), "empty".to_string(), OkPolicy::sequence());
        assert_eq!(run_collect(cont), vec!["then:9".to_string()]);
    }

    #[test]
    fn any_sequence_merges_all_errors_when_all_fail() {
        let items: Vec<Continuation<(), String, i32>> =
            vec![Continuation::error("a".to_string()), Continuation::error("b".to_string())];
        let cont = any(items, |x, y| format!("{x}+{y}"), "empty".to_string(), OkPolicy::sequence());
        assert_eq!(run_collect(cont), vec!["else:\"a+b\"".to_string()]);
    }
}
