//! Crash-channel combinator family (the third of component C6).
//!
//! Mirrors [`crate::combinators::then`] and [`crate::combinators::else_`]
//! but dispatches on `Outcome::Crash`. Unlike `then`/`else`, the crash
//! payload never carries a user-chosen type — it is always [`ContCrash`]
//! (spec §4.4: "crashes do not carry a user-chosen type") — so there is no
//! `crash_map` that changes a type parameter, only one that transforms a
//! `ContCrash` into another `ContCrash`.

use crate::cont::Continuation;
use crate::combinators::{guard_panic, ForkSinks};
use crate::error::ContCrash;
use crate::observer::Observer;
use crate::runtime::Runtime;

impl<E, F, A> Continuation<E, F, A>
where
    E: 'static,
    F: Clone + Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    /// Bind on crash: `crashDo`. Expected errors and successes pass through
    /// unchanged — an else inside this combinator's inner continuation
    /// never becomes a new crash (spec §7's channel non-interference).
    pub fn crash_do_with_rt(
        self,
        f: impl Fn(&Runtime<E>, ContCrash) -> Continuation<E, F, A> + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        Continuation::from_run(move |runtime, observer: Observer<F, A>| {
            if runtime.is_cancelled() {
                return;
            }
            let runtime = runtime.clone();
            let inner_runtime = runtime.clone();
            let observer_for_crash = observer.clone();
            let observer_for_then = observer.clone();
            let observer_for_else = observer.clone();
            self.invoke(
                &runtime,
                Observer::new()
                    .with_on_crash(move |crash| {
                        match guard_panic(|| f(&inner_runtime, crash)) {
                            Ok(next) => next.invoke(&inner_runtime, observer_for_crash.clone()),
                            Err(crash) => observer_for_crash.notify_crash(crash),
                        }
                    })
                    .with_on_then(move |value| observer_for_then.notify_then(value))
                    .with_on_else(move |err| observer_for_else.notify_else(err))
                    .with_on_panic(move |panic| observer.notify_panic(panic)),
            );
        })
    }

    /// `crashDo(f)`.
    pub fn crash_do(
        self,
        f: impl Fn(ContCrash) -> Continuation<E, F, A> + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.crash_do_with_rt(move |_rt, crash| f(crash))
    }

    /// `crashDo0(thunk)`.
    pub fn crash_do0(
        self,
        f: impl Fn() -> Continuation<E, F, A> + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.crash_do_with_rt(move |_rt, _crash| f())
    }

    /// `crashDoWithEnv(f)`.
    pub fn crash_do_with_env(
        self,
        f: impl Fn(&E, ContCrash) -> Continuation<E, F, A> + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.crash_do_with_rt(move |rt, crash| f(rt.env(), crash))
    }

    /// `crashDoWithEnv0(f)`.
    pub fn crash_do_with_env0(
        self,
        f: impl Fn(&E) -> Continuation<E, F, A> + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.crash_do_with_rt(move |rt, _crash| f(rt.env()))
    }

    /// `crashMap(f)`: transform the crash payload, still a `ContCrash`.
    pub fn crash_map(
        self,
        f: impl Fn(ContCrash) -> ContCrash + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.crash_do(move |crash| match guard_panic(|| f(crash)) {
            Ok(mapped) => Continuation::crash(mapped),
            Err(crash) => Continuation::crash(crash),
        })
    }

    /// `crashMap0(f)`.
    pub fn crash_map0(
        self,
        f: impl Fn() -> ContCrash + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.crash_map(move |_| f())
    }

    /// `crashMapTo(constant)`.
    pub fn crash_map_to(self, crash: ContCrash) -> Continuation<E, F, A> {
        self.crash_map0(move || crash.clone())
    }

    /// `crashRecover(f)`: pure-function recovery, equivalent to
    /// `crashDo(c => of(f(c)))`.
    pub fn crash_recover(
        self,
        f: impl Fn(ContCrash) -> A + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.crash_do(move |crash| match guard_panic(|| f(crash)) {
            Ok(value) => Continuation::of(value),
            Err(crash) => Continuation::crash(crash),
        })
    }

    /// `crashTap(f)`: side effect with replacement semantics mirroring
    /// [`Continuation::then_tap`] on the crash channel.
    pub fn crash_tap(
        self,
        f: impl Fn(ContCrash) -> Continuation<E, F, A> + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.crash_do(move |crash| {
            let original = crash.clone();
            let effect = f(crash);
            Continuation::from_run(move |runtime, observer: Observer<F, A>| {
                let original = original.clone();
                let observer_crash = observer.clone();
                let observer_then = observer.clone();
                effect.invoke(
                    runtime,
                    Observer::new()
                        .with_on_crash(move |replacement| observer_crash.notify_crash(replacement))
                        .with_on_then(move |_effect_value| observer_then.notify_crash(original.clone()))
                        .with_on_else(move |err| observer.notify_else(err))
                        .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
                );
            })
        })
    }

    /// `crashTap0(f)`.
    pub fn crash_tap0(
        self,
        f: impl Fn() -> Continuation<E, F, A> + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.crash_tap(move |_| f())
    }

    /// `crashTapWithEnv(f)`.
    pub fn crash_tap_with_env(
        self,
        f: impl Fn(&E, ContCrash) -> Continuation<E, F, A> + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.crash_do_with_rt(move |rt, crash| {
            let original = crash.clone();
            let effect = f(rt.env(), crash);
            Continuation::from_run(move |runtime, observer: Observer<F, A>| {
                let original = original.clone();
                let observer_crash = observer.clone();
                let observer_then = observer.clone();
                effect.invoke(
                    runtime,
                    Observer::new()
                        .with_on_crash(move |replacement| observer_crash.notify_crash(replacement))
                        .with_on_then(move |_effect_value| observer_then.notify_crash(original.clone()))
                        .with_on_else(move |err| observer.notify_else(err))
                        .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
                );
            })
        })
    }

    /// `crashTapWithEnv0(f)`.
    pub fn crash_tap_with_env0(
        self,
        f: impl Fn(&E) -> Continuation<E, F, A> + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.crash_tap_with_env(move |env, _crash| f(env))
    }

    /// `crashFork(f, sinks)`: fire-and-forget side effect on crash,
    /// mirroring [`Continuation::then_fork`].
    pub fn crash_fork(
        self,
        f: impl Fn(ContCrash) -> Continuation<E, F, A> + Send + Sync + 'static,
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
            let observer_else = observer.clone();
            self.invoke(
                &runtime,
                Observer::new()
                    .with_on_crash(move |crash| match guard_panic(|| f(crash.clone())) {
                        Ok(effect) => {
                            observer.notify_crash(crash);
                            effect.invoke(&inner_runtime, sinks.clone().into_observer());
                        }
                        Err(crash) => observer.notify_crash(crash),
                    })
                    .with_on_then(move |value| observer_then.notify_then(value))
                    .with_on_else(move |err| observer_else.notify_else(err))
                    .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
            );
        })
    }

    /// `crashFork0(f, sinks)`.
    pub fn crash_fork0(
        self,
        f: impl Fn() -> Continuation<E, F, A> + Send + Sync + 'static,
        sinks: ForkSinks<F, A>,
    ) -> Continuation<E, F, A> {
        self.crash_fork(move |_| f(), sinks)
    }

    /// `crashForkWithEnv(f, sinks)`.
    pub fn crash_fork_with_env(
        self,
        f: impl Fn(&E, ContCrash) -> Continuation<E, F, A> + Send + Sync + 'static,
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
            let observer_else = observer.clone();
            let env = runtime.env().clone();
            self.invoke(
                &runtime,
                Observer::new()
                    .with_on_crash(move |crash| match guard_panic(|| f(&env, crash.clone())) {
                        Ok(effect) => {
                            observer.notify_crash(crash);
                            effect.invoke(&inner_runtime, sinks.clone().into_observer());
                        }
                        Err(crash) => observer.notify_crash(crash),
                    })
                    .with_on_then(move |value| observer_then.notify_then(value))
                    .with_on_else(move |err| observer_else.notify_else(err))
                    .with_on_panic(|p| std::panic::resume_unwind(Box::new(p.message))),
            );
        })
    }

    /// `crashForkWithEnv0(f, sinks)`.
    pub fn crash_fork_with_env0(
        self,
        f: impl Fn(&E) -> Continuation<E, F, A> + Send + Sync + 'static,
        sinks: ForkSinks<F, A>,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        self.crash_fork_with_env(move |env, _| f(env), sinks)
    }

    /// `crashIf(pred, value)`: on a `Crash` outcome, if `pred(crash)` holds,
    /// replace the payload with `value` and move to the success channel.
    pub fn crash_if(
        self,
        pred: impl Fn(&ContCrash) -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A> {
        self.crash_do(move |crash| match guard_panic(|| pred(&crash)) {
            Ok(true) => Continuation::of(value.clone()),
            Ok(false) => Continuation::crash(crash),
            Err(crash) => Continuation::crash(crash),
        })
    }

    /// `crashIf0(pred, value)`.
    pub fn crash_if0(
        self,
        pred: impl Fn() -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A> {
        self.crash_if(move |_| pred(), value)
    }

    /// `crashIfWithEnv(pred, value)`.
    pub fn crash_if_with_env(
        self,
        pred: impl Fn(&E, &ContCrash) -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        self.crash_do_with_rt(move |rt, crash| match guard_panic(|| pred(rt.env(), &crash)) {
            Ok(true) => Continuation::of(value.clone()),
            Ok(false) => Continuation::crash(crash),
            Err(crash) => Continuation::crash(crash),
        })
    }

    /// `crashIfWithEnv0(pred, value)`.
    pub fn crash_if_with_env0(
        self,
        pred: impl Fn(&E) -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        self.crash_if_with_env(move |env, _| pred(env), value)
    }

    /// `crashUnless(pred, value)`: the mirror of [`Continuation::crash_if`].
    pub fn crash_unless(
        self,
        pred: impl Fn(&ContCrash) -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A> {
        self.crash_if(move |crash| !pred(crash), value)
    }

    /// `crashUnless0(pred, value)`.
    pub fn crash_unless0(
        self,
        pred: impl Fn() -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A> {
        self.crash_if0(move || !pred(), value)
    }

    /// `crashUnlessWithEnv(pred, value)`.
    pub fn crash_unless_with_env(
        self,
        pred: impl Fn(&E, &ContCrash) -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        self.crash_if_with_env(move |env, crash| !pred(env, crash), value)
    }

    /// `crashUnlessWithEnv0(pred, value)`.
    pub fn crash_unless_with_env0(
        self,
        pred: impl Fn(&E) -> bool + Send + Sync + 'static,
        value: A,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        self.crash_if_with_env0(move |env| !pred(env), value)
    }

    /// `crashZip(f, combine)`: run a fallback alongside; if it also crashes,
    /// merge both crashes into a `Merged` node via `combine` (typically
    /// [`ContCrash::merge`]).
    pub fn crash_zip(
        self,
        f: impl Fn(ContCrash) -> Continuation<E, F, A> + Send + Sync + 'static,
        combine: impl Fn(ContCrash, ContCrash) -> ContCrash + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        let combine = std::sync::Arc::new(combine);
        self.crash_do(move |crash| {
            let fallback = f(crash.clone());
            zip_crash(crash, fallback, std::sync::Arc::clone(&combine))
        })
    }

    /// `crashZip0(f, combine)`.
    pub fn crash_zip0(
        self,
        f: impl Fn() -> Continuation<E, F, A> + Send + Sync + 'static,
        combine: impl Fn(ContCrash, ContCrash) -> ContCrash + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.crash_zip(move |_| f(), combine)
    }

    /// `crashZipWithEnv(f, combine)`.
    pub fn crash_zip_with_env(
        self,
        f: impl Fn(&E, ContCrash) -> Continuation<E, F, A> + Send + Sync + 'static,
        combine: impl Fn(ContCrash, ContCrash) -> ContCrash + Send + Sync + 'static,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        let combine = std::sync::Arc::new(combine);
        self.crash_do_with_rt(move |rt, crash| {
            let fallback = f(rt.env(), crash.clone());
            zip_crash(crash, fallback, std::sync::Arc::clone(&combine))
        })
    }

    /// `crashZipWithEnv0(f, combine)`.
    pub fn crash_zip_with_env0(
        self,
        f: impl Fn(&E) -> Continuation<E, F, A> + Send + Sync + 'static,
        combine: impl Fn(ContCrash, ContCrash) -> ContCrash + Send + Sync + 'static,
    ) -> Continuation<E, F, A>
    where
        E: Clone,
    {
        self.crash_zip_with_env(move |env, _| f(env), combine)
    }
}

fn zip_crash<E, F, A>(
    original: ContCrash,
    fallback: Continuation<E, F, A>,
    combine: std::sync::Arc<dyn Fn(ContCrash, ContCrash) -> ContCrash + Send + Sync>,
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
                .with_on_crash(move |fallback_crash| {
                    match guard_panic(|| combine(original.clone(), fallback_crash)) {
                        Ok(merged) => observer.notify_crash(merged),
                        Err(crash) => observer.notify_crash(crash),
                    }
                })
                .with_on_then({
                    let observer = observer.clone();
                    move |value| observer.notify_then(value)
                })
                .with_on_else({
                    let observer = observer.clone();
                    move |err| observer.notify_else(err)
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

    fn sample_crash(message: &str) -> ContCrash {
        ContCrash::from_panic_payload(Box::new(message.to_string()))
    }

    #[test]
    fn crash_do_binds_on_crash() {
        let cont: Continuation<(), String, i32> =
            Continuation::crash(sample_crash("boom")).crash_do(|c| Continuation::crash(c));
        let logged = run_collect(cont);
        assert_eq!(logged.len(), 1);
        assert!(logged[0].contains("boom"));
    }

    #[test]
    fn crash_do_passes_through_then() {
        let cont: Continuation<(), String, i32> =
            Continuation::of(5).crash_do(|c| Continuation::crash(c));
        assert_eq!(run_collect(cont), vec!["then:5".to_string()]);
    }

    #[test]
    fn crash_recover_converts_crash_to_success() {
        let cont: Continuation<(), String, usize> =
            Continuation::crash(sample_crash("boom")).crash_recover(|_| 99);
        assert_eq!(run_collect(cont), vec!["then:99".to_string()]);
    }

    #[test]
    fn crash_if_promotes_matching_crash() {
        let cont: Continuation<(), String, i32> = Continuation::crash(sample_crash("boom"))
            .crash_if(|c| c.to_string().contains("boom"), -1);
        assert_eq!(run_collect(cont), vec!["then:-1".to_string()]);
    }

    #[test]
    fn crash_zip_merges_matching_channel_crashes() {
        let left = sample_crash("left");
        let cont: Continuation<(), String, i32> =
            Continuation::crash(left).crash_zip(|_| Continuation::crash(sample_crash("right")), ContCrash::merge);
        let logged = run_collect(cont);
        assert_eq!(logged.len(), 1);
        assert!(logged[0].contains("left") && logged[0].contains("right"));
    }

    #[test]
    fn crash_tap_keeps_original_when_effect_succeeds() {
        let crash = sample_crash("boom");
        let cont: Continuation<(), String, i32> = Continuation::crash(crash).crash_tap(|_| Continuation::of(1));
        let logged = run_collect(cont);
        assert_eq!(logged.len(), 1);
        assert!(logged[0].contains("boom"));
    }
}
