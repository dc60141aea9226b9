//! Success-channel ("then") combinator family (half of component C6).
//!
//! Every combinator here shares the same two-state automaton: wait for the
//! inner continuation's outcome, and if it lands on `Then`, hand the value
//! to a user callback; otherwise pass the outcome through unchanged. The
//! four surface variants of each combinator (plain / `0` / `WithEnv` /
//! `WithEnv0`) are all built from one `_with_rt` primitive that receives the
//! runtime, since that is the only thing that actually differs between
//! them.

use crate::cont::Continuation;
use crate::combinators::{guard_panic, ForkSinks};
use crate::error::ContCrash;
use crate::observer::Observer;
use crate::runtime::Runtime;

impl<E, F, A> Continuation<E, F, A>
where
    E: 'static,
    F: Clone + Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    /// Bind on success: `thenDo`. `f` is only called when the inner
    /// continuation lands on `Then`; `Else`/`Crash` outcomes pass through
    /// unchanged.
    pub fn then_do_with_rt<A2>(
        self,
        f: impl Fn(&Runtime<E>, A) -> Continuation<E, F, A2> + Send + Sync + 'static,
    ) -> Continuation<E, F, A2>
    where
        A2: 'static,
    {
        Continuation::from_run(move |runtime, observer: Observer<F, A2>| {
            if runtime.is_cancelled() {
                return;
            }
            let runtime = runtime.clone();
            let inner_runtime = runtime.clone();
            let observer_for_then = observer.clone();
            let observer_for_else = observer.clone();
            let observer_for_crash = observer.clone();
            self.invoke(
                &runtime,
                Observer::new()
                    .with_on_then(move |value| {
                        match guard_panic(|| f(&inner_runtime, value)) {
                            Ok(next) => next.invoke(&inner_runtime, observer_for_then.clone()),
                            Err(crash) => observer_for_then.notify_crash(crash),
                        }
                    })
                    .with_on_else(move |err| observer_for_else.notify_else(err))
                    .with_on_crash(move |crash| observer_for_crash.notify_crash(crash))
                    .with_on_panic(move |panic| observer.notify_panic(panic)),
            );
        })
    }

    /// `thenDo(f)`.
    pub fn then_do<A2>(
        self,
        f: impl Fn(A) -> Continuation<E, F, A2> + Send + Sync + 'static,
    ) -> Continuation<E, F, A2>
    where
        A2: 'static,
    {
        self.then_do_with_rt(move |_rt, value| f(value))
    }

    /// `thenDo0(thunk)`: ignore the success payload.
    pub fn then_do0<A2>(
        self,
        f: impl Fn() -> Continuation<E, F, A2> + Send + Sync + 'static,
    ) -> Continuation<E, F, A2>
    where
        A2: 'static,
    {
        self.then_do_with_rt(move |_rt, _value| f())
    }

    /// `thenDoWithEnv(f)`: `f` also receives the environment.
    pub fn then_do_with_env<A2>(
        self,
        f: impl Fn(&E, A) -> Continuation<E, F, A2> + Send + Sync + 'static,
    ) -> Continuation<E, F, A2>
    where
        A2: 'static,
    {
        self.then_do_with_rt(move |rt, value| f(rt.env(), value))
    }

    /// `thenDoWithEnv0(f)`.
    pub fn then_do_with_env0<A2>(
        self,
        f: impl Fn(&E) -> Continuation<E, F, A2> + Send + Sync + 'static,
    ) -> Continuation<E, F, A2>
    where
        A2: 'static,
    {
        self.then_do_with_rt(move |rt, _value| f(rt.env()))
    }

    /// `thenMap(f)`: transform the success payload in place.
    pub fn then_map<A2>(self, f: impl Fn(A) -> A2 + Send + Sync + 'static) -> Continuation<E, F, A2>
    where
        A2: Clone + Send + Sync + 'static,
    {
        self.then_do(move |value| match guard_panic(|| f(value)) {
            Ok(mapped) => Continuation::of(mapped),
            Err(crash) => Continuation::crash(crash),
        })
    }

    /// `thenMap0(f)`: ignore the payload, still produce a new value.
    pub fn then_map0<A2>(self, f: impl Fn() -> A2 + Send + Sync + 'static) -> Continuation<E, F, A2>
    where
        A2: Clone + Send + Sync + 'static,
    {
        self.then_map(move |_| f())
    }

    /// `thenMapTo(constant)`.
    pub fn then_map_to<A2>(self, value: A2) -> Continuation<E, F, A2>
    where
        A2: Clone + Send + Sync + 'static,
    {
        self.then_map0(move || value.clone())
    }

}

impl<E, F, A> Continuation<E, F, A>
where
    E: Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    /// `thenTap(f)`.
    pub fn then_tap(
        self,
        f: impl Fn(A) -> Continuation<E, F, A> + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.then_do(move |value| {
            let original = value.clone();
            let effect = f(value);
            Continuation::from_run(move |runtime, observer: Observer<F, A>| {
                let original = original.clone();
                let observer_then = observer.clone();
                let observer_else = observer.clone();
                effect.invoke(
                    runtime,
                    Observer::new()
                        .with_on_then(move |replacement| observer_then.notify_then(replacement))
                        .with_on_else(move |_effect_err| observer_else.notify_then(original.clone()))
                        .with_on_crash(move |crash| observer.notify_crash(crash))
                        .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
                );
            })
        })
    }

    /// `thenTap0(f)`: ignore the payload when building the effect.
    pub fn then_tap0(
        self,
        f: impl Fn() -> Continuation<E, F, A> + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.then_tap(move |_| f())
    }

    /// `thenTapWithEnv(f)`.
    pub fn then_tap_with_env(
        self,
        f: impl Fn(&E, A) -> Continuation<E, F, A> + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.then_do_with_rt(move |rt, value| {
            let original = value.clone();
            let effect = f(rt.env(), value);
            Continuation::from_run(move |runtime, observer: Observer<F, A>| {
                let original = original.clone();
                let observer_then = observer.clone();
                let observer_else = observer.clone();
                effect.invoke(
                    runtime,
                    Observer::new()
                        .with_on_then(move |replacement| observer_then.notify_then(replacement))
                        .with_on_else(move |_effect_err| observer_else.notify_then(original.clone()))
                        .with_on_crash(move |crash| observer.notify_crash(crash))
                        .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
                );
            })
        })
    }

    /// `thenTapWithEnv0(f)`.
    pub fn then_tap_with_env0(
        self,
        f: impl Fn(&E) -> Continuation<E, F, A> + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.then_tap_with_env(move |env, _value| f(env))
    }

    /// `thenFork(f, sinks)`: start a side-effecting continuation without
    /// waiting for it. The primary outcome propagates immediately; the
    /// effect's own outcome is routed to `sinks`. If building the effect
    /// continuation panics synchronously, that crash replaces the *primary*
    /// outcome (spec §4.4).
    pub fn then_fork(
        self,
        f: impl Fn(A) -> Continuation<E, F, A> + Send + Sync + 'static,
        sinks: ForkSinks<F, A>,
    ) -> Continuation<E, F, A> {
        Continuation::from_run(move |runtime, observer: Observer<F, A>| {
            if runtime.is_cancelled() {
                return;
            }
            let runtime = runtime.clone();
            let inner_runtime = runtime.clone();
            let sinks = sinks.clone();
            let observer_else = observer.clone();
            let observer_crash = observer.clone();
            self.invoke(
                &runtime,
                Observer::new()
                    .with_on_then(move |value| match guard_panic(|| f(value.clone())) {
                        Ok(effect) => {
                            observer.notify_then(value);
                            effect.invoke(&inner_runtime, sinks.clone().into_observer());
                        }
                        Err(crash) => observer.notify_crash(crash),
                    })
                    .with_on_else(move |err| observer_else.notify_else(err))
                    .with_on_crash(move |crash| observer_crash.notify_crash(crash))
                    .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
            );
        })
    }

    /// `thenFork0(f, sinks)`.
    pub fn then_fork0(
        self,
        f: impl Fn() -> Continuation<E, F, A> + Send + Sync + 'static,
        sinks: ForkSinks<F, A>,
    ) -> Continuation<E, F, A> {
        self.then_fork(move |_| f(), sinks)
    }

    /// `thenForkWithEnv(f, sinks)`.
    pub fn then_fork_with_env(
        self,
        f: impl Fn(&E, A) -> Continuation<E, F, A> + Send + Sync + 'static,
        sinks: ForkSinks<F, A>,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        Continuation::from_run(move |runtime, observer: Observer<F, A>| {
            if runtime.is_cancelled() {
                return;
            }
            let runtime = runtime.clone();
            let inner_runtime = runtime.clone();
            let sinks = sinks.clone();
            let observer_else = observer.clone();
            let observer_crash = observer.clone();
            let env = runtime.env().clone();
            self.invoke(
                &runtime,
                Observer::new()
                    .with_on_then(move |value| match guard_panic(|| f(&env, value.clone())) {
                        Ok(effect) => {
                            observer.notify_then(value);
                            effect.invoke(&inner_runtime, sinks.clone().into_observer());
                        }
                        Err(crash) => observer.notify_crash(crash),
                    })
                    .with_on_else(move |err| observer_else.notify_else(err))
                    .with_on_crash(move |crash| observer_crash.notify_crash(crash))
                    .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
            );
        })
    }

    /// `thenForkWithEnv0(f, sinks)`.
    pub fn then_fork_with_env0(
        self,
        f: impl Fn(&E) -> Continuation<E, F, A> + Send + Sync + 'static,
        sinks: ForkSinks<F, A>,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        self.then_fork_with_env(move |env, _| f(env), sinks)
    }

    /// `thenIf(pred, value)`: on a `Then` outcome, if `pred(payload)` holds,
    /// replace the payload with `value`; otherwise keep the original
    /// outcome unchanged (spec §4.4 — a no-op "conditional promotion" since
    /// the channel is already `Then`).
    pub fn then_if(
        self,
        pred: impl Fn(&A) -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A> {
        self.then_do(move |payload| match guard_panic(|| pred(&payload)) {
            Ok(true) => Continuation::of(value.clone()),
            Ok(false) => Continuation::of(payload),
            Err(crash) => Continuation::crash(crash),
        })
    }

    /// `thenIf0(pred, value)`: predicate ignores the payload.
    pub fn then_if0(
        self,
        pred: impl Fn() -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A> {
        self.then_if(move |_| pred(), value)
    }

    /// `thenIfWithEnv(pred, value)`.
    pub fn then_if_with_env(
        self,
        pred: impl Fn(&E, &A) -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        self.then_do_with_rt(move |rt, payload| {
            match guard_panic(|| pred(rt.env(), &payload)) {
                Ok(true) => Continuation::of(value.clone()),
                Ok(false) => Continuation::of(payload),
                Err(crash) => Continuation::crash(crash),
            }
        })
    }

    /// `thenIfWithEnv0(pred, value)`.
    pub fn then_if_with_env0(
        self,
        pred: impl Fn(&E) -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        self.then_if_with_env(move |env, _| pred(env), value)
    }

    /// `thenUnless(pred, fallback)`: the mirror of [`Continuation::then_if`]
    /// — replaces the payload with `fallback` when `pred` is *false*.
    pub fn then_unless(
        self,
        pred: impl Fn(&A) -> bool + Send + Sync + 'static,
        fallback: A,
    ) -> Continuation<E, F, A> {
        self.then_if(move |payload| !pred(payload), fallback)
    }

    /// `thenUnless0(pred, fallback)`.
    pub fn then_unless0(
        self,
        pred: impl Fn() -> bool + Send + Sync + 'static,
        fallback: A,
    ) -> Continuation<E, F, A> {
        self.then_if0(move || !pred(), fallback)
    }

    /// `thenUnlessWithEnv(pred, fallback)`.
    pub fn then_unless_with_env(
        self,
        pred: impl Fn(&E, &A) -> bool + Send + Sync + 'static,
        fallback: A,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        self.then_if_with_env(move |env, payload| !pred(env, payload), fallback)
    }

    /// `thenUnlessWithEnv0(pred, fallback)`.
    pub fn then_unless_with_env0(
        self,
        pred: impl Fn(&E) -> bool + Send + Sync + 'static,
        fallback: A,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        self.then_if_with_env0(move |env| !pred(env), fallback)
    }

    /// `thenZip(f, combine)`: run a fallback alongside; if it also lands on
    /// `Then`, merge both payloads with `combine`, otherwise the fallback's
    /// outcome wins (spec §4.4's "fallback with accumulation").
    pub fn then_zip(
        self,
        f: impl Fn(A) -> Continuation<E, F, A> + Send + Sync + 'static,
        combine: impl Fn(A, A) -> A + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        let combine = std::sync::Arc::new(combine);
        self.then_do(move |value| {
            let fallback = f(value.clone());
            zip_then(value, fallback, std::sync::Arc::clone(&combine))
        })
    }

    /// `thenZip0(f, combine)`.
    pub fn then_zip0(
        self,
        f: impl Fn() -> Continuation<E, F, A> + Send + Sync + 'static,
        combine: impl Fn(A, A) -> A + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.then_zip(move |_| f(), combine)
    }

    /// `thenZipWithEnv(f, combine)`.
    pub fn then_zip_with_env(
        self,
        f: impl Fn(&E, A) -> Continuation<E, F, A> + Send + Sync + 'static,
        combine: impl Fn(A, A) -> A + Send + Sync + 'static,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        let combine = std::sync::Arc::new(combine);
        self.then_do_with_rt(move |rt, value| {
            let fallback = f(rt.env(), value.clone());
            zip_then(value, fallback, std::sync::Arc::clone(&combine))
        })
    }

    /// `thenZipWithEnv0(f, combine)`.
    pub fn then_zip_with_env0(
        self,
        f: impl Fn(&E) -> Continuation<E, F, A> + Send + Sync + 'static,
        combine: impl Fn(A, A) -> A + Send + Sync + 'static,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        self.then_zip_with_env(move |env, _| f(env), combine)
    }

    /// `thenDemote(f)`: convert success into an expected error (spec §4.4's
    /// "pure-function demotion from success to failure").
    pub fn then_demote(
        self,
        f: impl Fn(A) -> F + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.then_do(move |value| match guard_panic(|| f(value)) {
            Ok(err) => Continuation::error(err),
            Err(crash) => Continuation::crash(crash),
        })
    }

    /// `abort(f)`: demote to failure unconditionally, as a crash rather
    /// than an expected error — used when the success value is itself
    /// evidence of a broken invariant.
    pub fn abort(self, f: impl Fn(A) -> String + Send + Sync + 'static) -> Continuation<E, F, A> {
        self.then_do(move |value| {
            let message = f(value);
            Continuation::crash(ContCrash::Normal {
                message,
                backtrace: std::sync::Arc::new(std::backtrace::Backtrace::capture()),
            })
        })
    }
}

fn zip_then<E, F, A>(
    original: A,
    fallback: Continuation<E, F, A>,
    combine: std::sync::Arc<dyn Fn(A, A) -> A + Send + Sync>,
) -> Continuation<E, F, A>
where
    E: Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    Continuation::from_run(move |runtime, observer: Observer<F, A>| {
        let original = original.clone();
        let combine = std::sync::Arc::clone(&combine);
        fallback.invoke(
            runtime,
            Observer::new()
                .with_on_then(move |fallback_value| {
                    match guard_panic(|| combine(original.clone(), fallback_value)) {
                        Ok(combined) => observer.notify_then(combined),
                        Err(crash) => observer.notify_crash(crash),
                    }
                })
                .with_on_else({
                    let observer = observer.clone();
                    move |err| observer.notify_else(err)
                })
                .with_on_crash({
                    let observer = observer.clone();
                    move |crash| observer.notify_crash(crash)
                })
                .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use std::sync::{Arc, Mutex};

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
    fn then_do_binds_on_success() {
        let cont: Continuation<(), String, i32> = Continuation::of(5).then_do(|v| Continuation::of(v + 1));
        assert_eq!(run_collect(cont), vec!["then:6".to_string()]);
    }

    #[test]
    fn then_do_passes_through_else() {
        let cont: Continuation<(), String, i32> =
            Continuation::error("bad".to_string()).then_do(|v: i32| Continuation::of(v + 1));
        assert_eq!(run_collect(cont), vec!["else:\"bad\"".to_string()]);
    }

    #[test]
    fn then_map_transforms_value() {
        let cont: Continuation<(), String, i32> = Continuation::of(5).then_map(|v| v * 10);
        assert_eq!(run_collect(cont), vec!["then:50".to_string()]);
    }

    #[test]
    fn then_map_identity_law() {
        let cont: Continuation<(), String, i32> = Continuation::of(5).then_map(|v| v);
        assert_eq!(run_collect(cont), vec!["then:5".to_string()]);
    }

    #[test]
    fn then_map_to_ignores_original_value() {
        let cont: Continuation<(), String, &'static str> = Continuation::of(5).then_map_to("replaced");
        assert_eq!(run_collect(cont), vec!["then:\"replaced\"".to_string()]);
    }

    #[test]
    fn then_tap_replaces_value_on_success() {
        let cont: Continuation<(), String, i32> =
            Continuation::of(5).then_tap(|v| Continuation::of(v + 100));
        assert_eq!(run_collect(cont), vec!["then:105".to_string()]);
    }

    #[test]
    fn then_tap_keeps_original_on_same_channel_failure() {
        let cont: Continuation<(), String, i32> =
            Continuation::of(5).then_tap(|_| Continuation::error("tap failed".to_string()));
        assert_eq!(run_collect(cont), vec!["then:5".to_string()]);
    }

    #[test]
    fn then_if_promotes_matching_value() {
        let cont: Continuation<(), String, i32> = Continuation::of(5).then_if(|v| *v > 0, 1);
        assert_eq!(run_collect(cont), vec!["then:1".to_string()]);
    }

    #[test]
    fn then_if_keeps_original_when_predicate_false() {
        let cont: Continuation<(), String, i32> = Continuation::of(5).then_if(|v| *v < 0, 1);
        assert_eq!(run_collect(cont), vec!["then:5".to_string()]);
    }

    #[test]
    fn then_unless_mirrors_then_if() {
        let cont: Continuation<(), String, i32> = Continuation::of(5).then_unless(|v| *v < 0, 1);
        assert_eq!(run_collect(cont), vec!["then:1".to_string()]);
    }

    #[test]
    fn then_demote_converts_success_to_else() {
        let cont: Continuation<(), String, i32> =
            Continuation::of(5).then_demote(|v| format!("len={v}"));
        assert_eq!(run_collect(cont), vec!["else:\"len=5\"".to_string()]);
    }

    #[test]
    fn then_do_panic_becomes_crash() {
        let cont: Continuation<(), String, i32> = Continuation::of(1).then_do(|_| -> Continuation<(), String, i32> {
            panic!("E");
        });
        let logged = run_collect(cont);
        assert_eq!(logged.len(), 1);
        assert!(logged[0].starts_with("crash:"));
    }

    #[test]
    fn then_zip_combines_matching_channel() {
        let cont: Continuation<(), String, i32> =
            Continuation::of(5).then_zip(|_| Continuation::of(10), |a, b| a + b);
        assert_eq!(run_collect(cont), vec!["then:15".to_string()]);
    }

    #[test]
    fn then_zip_fallback_failure_wins() {
        let cont: Continuation<(), String, i32> =
            Continuation::of(5).then_zip(|_| Continuation::error("bad".to_string()), |a, b| a + b);
        assert_eq!(run_collect(cont), vec!["else:\"bad\"".to_string()]);
    }

    #[test]
    fn then_fork_propagates_primary_and_routes_effect() {
        let seen = Arc::new(Mutex::new(None));
        let seen2 = Arc::clone(&seen);
        let sinks: ForkSinks<String, i32> =
            ForkSinks::new().on_then(move |v| *seen2.lock().unwrap() = Some(v));
        let cont: Continuation<(), String, i32> =
            Continuation::of(5).then_fork(|v| Continuation::of(v + 1), sinks);
        assert_eq!(run_collect(cont), vec!["then:5".to_string()]);
        assert_eq!(*seen.lock().unwrap(), Some(6));
    }
}
