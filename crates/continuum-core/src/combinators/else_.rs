//! Expected-error-channel ("else") combinator family (half of component C6).
//!
//! Mirrors [`crate::combinators::then`] but dispatches on `Outcome::Else`
//! instead of `Outcome::Then`. `elseMap` is allowed to change the declared
//! error type `F -> F2` (spec §4.4), the same way `thenMap` can change `A`.

use crate::cont::Continuation;
use crate::combinators::{guard_panic, ForkSinks};
use crate::observer::Observer;
use crate::runtime::Runtime;

impl<E, F, A> Continuation<E, F, A>
where
    E: 'static,
    F: Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    /// Bind on expected failure: `elseDo`. Crashes and successes pass
    /// through unchanged — a crash inside this combinator's inner
    /// continuation never becomes a new `Else` (spec §7's channel
    /// non-interference).
    pub fn else_do_with_rt<F2>(
        self,
        f: impl Fn(&Runtime<E>, F) -> Continuation<E, F2, A> + Send + Sync + 'static,
    ) -> Continuation<E, F2, A>
    where
        F2: 'static,
    {
        Continuation::from_run(move |runtime, observer: Observer<F2, A>| {
            if runtime.is_cancelled() {
                return;
            }
            let runtime = runtime.clone();
            let inner_runtime = runtime.clone();
            let observer_for_else = observer.clone();
            let observer_for_then = observer.clone();
            let observer_for_crash = observer.clone();
            self.invoke(
                &runtime,
                Observer::new()
                    .with_on_else(move |err| {
                        match guard_panic(|| f(&inner_runtime, err)) {
                            Ok(next) => next.invoke(&inner_runtime, observer_for_else.clone()),
                            Err(crash) => observer_for_else.notify_crash(crash),
                        }
                    })
                    .with_on_then(move |value| observer_for_then.notify_then(value))
                    .with_on_crash(move |crash| observer_for_crash.notify_crash(crash))
                    .with_on_panic(move |panic| observer.notify_panic(panic)),
            );
        })
    }

    /// `elseDo(f)`.
    pub fn else_do<F2>(
        self,
        f: impl Fn(F) -> Continuation<E, F2, A> + Send + Sync + 'static,
    ) -> Continuation<E, F2, A>
    where
        F2: 'static,
    {
        self.else_do_with_rt(move |_rt, err| f(err))
    }

    /// `elseDo0(thunk)`.
    pub fn else_do0<F2>(
        self,
        f: impl Fn() -> Continuation<E, F2, A> + Send + Sync + 'static,
    ) -> Continuation<E, F2, A>
    where
        F2: 'static,
    {
        self.else_do_with_rt(move |_rt, _err| f())
    }

    /// `elseDoWithEnv(f)`.
    pub fn else_do_with_env<F2>(
        self,
        f: impl Fn(&E, F) -> Continuation<E, F2, A> + Send + Sync + 'static,
    ) -> Continuation<E, F2, A>
    where
        F2: 'static,
    {
        self.else_do_with_rt(move |rt, err| f(rt.env(), err))
    }

    /// `elseDoWithEnv0(f)`.
    pub fn else_do_with_env0<F2>(
        self,
        f: impl Fn(&E) -> Continuation<E, F2, A> + Send + Sync + 'static,
    ) -> Continuation<E, F2, A>
    where
        F2: 'static,
    {
        self.else_do_with_rt(move |rt, _err| f(rt.env()))
    }

    /// `elseMap(f)`: may change the declared error type `F -> F2`.
    pub fn else_map<F2>(self, f: impl Fn(F) -> F2 + Send + Sync + 'static) -> Continuation<E, F2, A>
    where
        F2: Clone + Send + Sync + 'static,
    {
        self.else_do(move |err| match guard_panic(|| f(err)) {
            Ok(mapped) => Continuation::error(mapped),
            Err(crash) => Continuation::crash(crash),
        })
    }

    /// `elseMap0(f)`.
    pub fn else_map0<F2>(self, f: impl Fn() -> F2 + Send + Sync + 'static) -> Continuation<E, F2, A>
    where
        F2: Clone + Send + Sync + 'static,
    {
        self.else_map(move |_| f())
    }

    /// `elseMapTo(constant)`.
    pub fn else_map_to<F2>(self, value: F2) -> Continuation<E, F2, A>
    where
        F2: Clone + Send + Sync + 'static,
    {
        self.else_map0(move || value.clone())
    }

    /// `promote(f)`: pure-function recovery, equivalent to
    /// `elseDo(e => of(f(e)))`.
    pub fn promote(self, f: impl Fn(F) -> A + Send + Sync + 'static) -> Continuation<E, F, A> {
        self.else_do(move |err| match guard_panic(|| f(err)) {
            Ok(value) => Continuation::of(value),
            Err(crash) => Continuation::crash(crash),
        })
    }

    /// `elseRecover(f)`: alias of [`Continuation::promote`] using the
    /// generic-channel name from spec §4.4.
    pub fn else_recover(self, f: impl Fn(F) -> A + Send + Sync + 'static) -> Continuation<E, F, A> {
        self.promote(f)
    }
}

impl<E, F, A> Continuation<E, F, A>
where
    E: Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    /// `elseTap(f)`: side effect with replacement semantics mirroring
    /// [`Continuation::then_tap`] on the else channel.
    pub fn else_tap(
        self,
        f: impl Fn(F) -> Continuation<E, F, A> + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.else_do(move |err| {
            let original = err.clone();
            let effect = f(err);
            Continuation::from_run(move |runtime, observer: Observer<F, A>| {
                let original = original.clone();
                let observer_else = observer.clone();
                let observer_then = observer.clone();
                effect.invoke(
                    runtime,
                    Observer::new()
                        .with_on_else(move |replacement| observer_else.notify_else(replacement))
                        .with_on_then(move |_effect_value| observer_then.notify_else(original.clone()))
                        .with_on_crash(move |crash| observer.notify_crash(crash))
                        .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
                );
            })
        })
    }

    /// `elseTap0(f)`.
    pub fn else_tap0(
        self,
        f: impl Fn() -> Continuation<E, F, A> + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.else_tap(move |_| f())
    }

    /// `elseTapWithEnv(f)`.
    pub fn else_tap_with_env(
        self,
        f: impl Fn(&E, F) -> Continuation<E, F, A> + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.else_do_with_rt(move |rt, err| {
            let original = err.clone();
            let effect = f(rt.env(), err);
            Continuation::from_run(move |runtime, observer: Observer<F, A>| {
                let original = original.clone();
                let observer_else = observer.clone();
                let observer_then = observer.clone();
                effect.invoke(
                    runtime,
                    Observer::new()
                        .with_on_else(move |replacement| observer_else.notify_else(replacement))
                        .with_on_then(move |_effect_value| observer_then.notify_else(original.clone()))
                        .with_on_crash(move |crash| observer.notify_crash(crash))
                        .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
                );
            })
        })
    }

    /// `elseTapWithEnv0(f)`.
    pub fn else_tap_with_env0(
        self,
        f: impl Fn(&E) -> Continuation<E, F, A> + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.else_tap_with_env(move |env, _err| f(env))
    }

    /// `elseFork(f, sinks)`: fire-and-forget side effect on an expected
    /// failure, mirroring [`Continuation::then_fork`].
    pub fn else_fork(
        self,
        f: impl Fn(F) -> Continuation<E, F, A> + Send + Sync + 'static,
        sinks: ForkSinks<F, A>,
    ) -> Continuation<E, F, A> {
        Continuation::from_run(move |runtime, observer: Observer<F, A>| {
            if runtime.is_cancelled() {
                return;
            }
            let runtime = runtime.clone();
            let inner_runtime = runtime.clone();
            let sinks = sinks.clone();
            let observer_then = observer.clone();
            let observer_crash = observer.clone();
            self.invoke(
                &runtime,
                Observer::new()
                    .with_on_else(move |err| match guard_panic(|| f(err.clone())) {
                        Ok(effect) => {
                            observer.notify_else(err);
                            effect.invoke(&inner_runtime, sinks.clone().into_observer());
                        }
                        Err(crash) => observer.notify_crash(crash),
                    })
                    .with_on_then(move |value| observer_then.notify_then(value))
                    .with_on_crash(move |crash| observer_crash.notify_crash(crash))
                    .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
            );
        })
    }

    /// `elseFork0(f, sinks)`.
    pub fn else_fork0(
        self,
        f: impl Fn() -> Continuation<E, F, A> + Send + Sync + 'static,
        sinks: ForkSinks<F, A>,
    ) -> Continuation<E, F, A> {
        self.else_fork(move |_| f(), sinks)
    }

    /// `elseForkWithEnv(f, sinks)`.
    pub fn else_fork_with_env(
        self,
        f: impl Fn(&E, F) -> Continuation<E, F, A> + Send + Sync + 'static,
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
            let observer_then = observer.clone();
            let observer_crash = observer.clone();
            let env = runtime.env().clone();
            self.invoke(
                &runtime,
                Observer::new()
                    .with_on_else(move |err| match guard_panic(|| f(&env, err.clone())) {
                        Ok(effect) => {
                            observer.notify_else(err);
                            effect.invoke(&inner_runtime, sinks.clone().into_observer());
                        }
                        Err(crash) => observer.notify_crash(crash),
                    })
                    .with_on_then(move |value| observer_then.notify_then(value))
                    .with_on_crash(move |crash| observer_crash.notify_crash(crash))
                    .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
            );
        })
    }

    /// `elseForkWithEnv0(f, sinks)`.
    pub fn else_fork_with_env0(
        self,
        f: impl Fn(&E) -> Continuation<E, F, A> + Send + Sync + 'static,
        sinks: ForkSinks<F, A>,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        self.else_fork_with_env(move |env, _| f(env), sinks)
    }

    /// `elseIf(pred, value)`: on an `Else` outcome, if `pred(error)` holds,
    /// replace the payload with `value` and move to the success channel.
    pub fn else_if(
        self,
        pred: impl Fn(&F) -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A> {
        self.else_do(move |err| match guard_panic(|| pred(&err)) {
            Ok(true) => Continuation::of(value.clone()),
            Ok(false) => Continuation::error(err),
            Err(crash) => Continuation::crash(crash),
        })
    }

    /// `elseIf0(pred, value)`.
    pub fn else_if0(
        self,
        pred: impl Fn() -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A> {
        self.else_if(move |_| pred(), value)
    }

    /// `elseIfWithEnv(pred, value)`.
    pub fn else_if_with_env(
        self,
        pred: impl Fn(&E, &F) -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        self.else_do_with_rt(move |rt, err| match guard_panic(|| pred(rt.env(), &err)) {
            Ok(true) => Continuation::of(value.clone()),
            Ok(false) => Continuation::error(err),
            Err(crash) => Continuation::crash(crash),
        })
    }

    /// `elseIfWithEnv0(pred, value)`.
    pub fn else_if_with_env0(
        self,
        pred: impl Fn(&E) -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        self.else_if_with_env(move |env, _| pred(env), value)
    }

    /// `elseUnless(pred, value)`: the mirror of [`Continuation::else_if`].
    pub fn else_unless(
        self,
        pred: impl Fn(&F) -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A> {
        self.else_if(move |err| !pred(err), value)
    }

    /// `elseUnless0(pred, value)`.
    pub fn else_unless0(
        self,
        pred: impl Fn() -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A> {
        self.else_if0(move || !pred(), value)
    }

    /// `elseUnlessWithEnv(pred, value)`.
    pub fn else_unless_with_env(
        self,
        pred: impl Fn(&E, &F) -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        self.else_if_with_env(move |env, err| !pred(env, err), value)
    }

    /// `elseUnlessWithEnv0(pred, value)`.
    pub fn else_unless_with_env0(
        self,
        pred: impl Fn(&E) -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        self.else_if_with_env0(move |env| !pred(env), value)
    }

    /// `elseZip(f, combine)`: run a fallback alongside; if it also lands on
    /// `Else`, merge both error payloads with `combine`.
    pub fn else_zip(
        self,
        f: impl Fn(F) -> Continuation<E, F, A> + Send + Sync + 'static,
        combine: impl Fn(F, F) -> F + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        let combine = std::sync::Arc::new(combine);
        self.else_do(move |err| {
            let fallback = f(err.clone());
            zip_else(err, fallback, std::sync::Arc::clone(&combine))
        })
    }

    /// `elseZip0(f, combine)`.
    pub fn else_zip0(
        self,
        f: impl Fn() -> Continuation<E, F, A> + Send + Sync + 'static,
        combine: impl Fn(F, F) -> F + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.else_zip(move |_| f(), combine)
    }

    /// `elseZipWithEnv(f, combine)`.
    pub fn else_zip_with_env(
        self,
        f: impl Fn(&E, F) -> Continuation<E, F, A> + Send + Sync + 'static,
        combine: impl Fn(F, F) -> F + Send + Sync + 'static,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        let combine = std::sync::Arc::new(combine);
        self.else_do_with_rt(move |rt, err| {
            let fallback = f(rt.env(), err.clone());
            zip_else(err, fallback, std::sync::Arc::clone(&combine))
        })
    }

    /// `elseZipWithEnv0(f, combine)`.
    pub fn else_zip_with_env0(
        self,
        f: impl Fn(&E) -> Continuation<E, F, A> + Send + Sync + 'static,
        combine: impl Fn(F, F) -> F + Send + Sync + 'static,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        self.else_zip_with_env(move |env, _| f(env), combine)
    }
}

fn zip_else<E, F, A>(
    original: F,
    fallback: Continuation<E, F, A>,
    combine: std::sync::Arc<dyn Fn(F, F) -> F + Send + Sync>,
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
                .with_on_else(move |fallback_err| {
                    match guard_panic(|| combine(original.clone(), fallback_err)) {
                        Ok(combined) => observer.notify_else(combined),
                        Err(crash) => observer.notify_crash(crash),
                    }
                })
                .with_on_then({
                    let observer = observer.clone();
                    move |value| observer.notify_then(value)
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
    fn else_do_binds_on_failure() {
        let cont: Continuation<(), String, i32> =
            Continuation::error("bad".to_string()).else_do(|e| Continuation::error(format!("{e}!")));
        assert_eq!(run_collect(cont), vec!["else:\"bad!\"".to_string()]);
    }

    #[test]
    fn else_do_passes_through_then() {
        let cont: Continuation<(), String, i32> =
            Continuation::of(5).else_do(|e: String| Continuation::error(e));
        assert_eq!(run_collect(cont), vec!["then:5".to_string()]);
    }

    #[test]
    fn promote_converts_failure_to_success() {
        let cont: Continuation<(), String, usize> =
            Continuation::error("bad".to_string()).promote(|e| e.len());
        assert_eq!(run_collect(cont), vec!["then:3".to_string()]);
    }

    #[test]
    fn else_map_changes_error_type() {
        let cont: Continuation<(), usize, i32> =
            Continuation::error("bad".to_string()).else_map(|e| e.len());
        assert_eq!(run_collect(cont), vec!["else:3".to_string()]);
    }

    #[test]
    fn else_if_promotes_matching_error() {
        let cont: Continuation<(), String, i32> =
            Continuation::error("bad".to_string()).else_if(|e| e == "bad", -1);
        assert_eq!(run_collect(cont), vec!["then:-1".to_string()]);
    }

    #[test]
    fn else_if_keeps_original_when_predicate_false() {
        let cont: Continuation<(), String, i32> =
            Continuation::error("bad".to_string()).else_if(|e| e == "other", -1);
        assert_eq!(run_collect(cont), vec!["else:\"bad\"".to_string()]);
    }

    #[test]
    fn else_tap_replaces_on_same_channel_success() {
        let cont: Continuation<(), String, i32> = Continuation::error("bad".to_string())
            .else_tap(|e| Continuation::error(format!("{e}-tapped")));
        assert_eq!(run_collect(cont), vec!["else:\"bad-tapped\"".to_string()]);
    }

    #[test]
    fn else_tap_keeps_original_when_effect_succeeds() {
        let cont: Continuation<(), String, i32> =
            Continuation::error("bad".to_string()).else_tap(|_| Continuation::of(1));
        assert_eq!(run_collect(cont), vec!["else:\"bad\"".to_string()]);
    }

    #[test]
    fn else_zip_combines_matching_channel_errors() {
        let cont: Continuation<(), String, i32> = Continuation::error("a".to_string())
            .else_zip(|_| Continuation::error("b".to_string()), |x, y| format!("{x}+{y}"));
        assert_eq!(run_collect(cont), vec!["else:\"a+b\"".to_string()]);
    }

    #[test]
    fn else_do_panic_becomes_crash() {
        let cont: Continuation<(), String, i32> =
            Continuation::error("bad".to_string()).else_do(|_| -> Continuation<(), String, i32> {
                panic!("E");
            });
        let logged = run_collect(cont);
        assert_eq!(logged.len(), 1);
        assert!(logged[0].starts_with("crash:"));
    }
}
