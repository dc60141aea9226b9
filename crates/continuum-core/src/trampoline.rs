//! Stack-safe looping engine (component C7): `while`/`until`/`forever` on
//! each of the three channels.
//!
//! Spec §4.5's trampoline contract is a tagged state machine
//! (`KeepGoing | Cancelled | Done(outcome)`) driven by a plain `loop {}` —
//! not recursion — so iteration count never grows the call stack. Each
//! iteration re-invokes the wrapped continuation's runner and inspects the
//! outcome it synchronously delivers through a scratch cell; a continuation
//! that defers its notification (an asynchronous suspension point) ends the
//! synchronous trampolining early, since there is no host scheduler here to
//! resume it on — the long-running, stack-safety-bounded case this engine
//! exists for is exactly the fully-synchronous one spec §8 tests (100,000
//! iterations of a synchronous counter).

use std::sync::{Arc, Mutex};

use crate::cont::Continuation;
use crate::combinators::guard_panic;
use crate::error::ContCrash;
use crate::never::Never;
use crate::observer::Observer;
use crate::outcome::Outcome;

enum StepResult<F, A> {
    Deferred,
    Landed(Outcome<F, A>),
}

fn run_step<E, F, A>(cont: &Continuation<E, F, A>, runtime: &crate::runtime::Runtime<E>) -> StepResult<F, A>
where
    F: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    let slot: Arc<Mutex<Option<Outcome<F, A>>>> = Arc::new(Mutex::new(None));
    let slot_then = Arc::clone(&slot);
    let slot_else = Arc::clone(&slot);
    let slot_crash = Arc::clone(&slot);
    cont.invoke(
        runtime,
        Observer::new()
            .with_on_then(move |v| *slot_then.lock().unwrap() = Some(Outcome::Then(v)))
            .with_on_else(move |e| *slot_else.lock().unwrap() = Some(Outcome::Else(e)))
            .with_on_crash(move |c| *slot_crash.lock().unwrap() = Some(Outcome::Crash(c))),
    );
    match slot.lock().unwrap().take() {
        Some(outcome) => StepResult::Landed(outcome),
        None => StepResult::Deferred,
    }
}

impl<E, F, A> Continuation<E, F, A>
where
    E: 'static,
    F: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    /// `thenWhile(pred)`: loops while the continuation lands on `Then` and
    /// `pred(value)` is true; stops at the first `Then` with `pred == false`,
    /// or at the first `Else`/`Crash`.
    pub fn then_while(
        self,
        pred: impl Fn(&A) -> bool + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        Continuation::from_run(move |runtime, observer: Observer<F, A>| loop {
            if runtime.is_cancelled() {
                return;
            }
            match run_step(&self, runtime) {
                StepResult::Deferred => return,
                StepResult::Landed(Outcome::Then(value)) => match guard_panic(|| pred(&value)) {
                    Ok(true) => continue,
                    Ok(false) => {
                        observer.notify_then(value);
                        return;
                    }
                    Err(crash) => {
                        observer.notify_crash(crash);
                        return;
                    }
                },
                StepResult::Landed(Outcome::Else(err)) => {
                    observer.notify_else(err);
                    return;
                }
                StepResult::Landed(Outcome::Crash(crash)) => {
                    observer.notify_crash(crash);
                    return;
                }
                StepResult::Landed(Outcome::Panic(_)) => {
                    unreachable!("inner dispatch never synthesizes a Panic outcome")
                }
            }
        })
    }

    /// `thenUntil(pred)`: `thenWhile(|v| !pred(v))`.
    pub fn then_until(
        self,
        pred: impl Fn(&A) -> bool + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.then_while(move |v| !pred(v))
    }

    /// `thenForever`: always re-iterates on `Then`; typed to `Never` on the
    /// success channel since it can only stop via `Else`/`Crash`/cancellation.
    pub fn then_forever(self) -> Continuation<E, F, Never>
    where
        F: Clone,
    {
        self.then_until(|_| false)
            .then_map(|_: A| -> Never { unreachable!("thenForever never lands on Then") })
    }
}

impl<E, F, A> Continuation<E, F, A>
where
    E: 'static,
    F: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    /// `elseWhile(pred)`: mirrors [`Continuation::then_while`] on the else
    /// channel.
    pub fn else_while(
        self,
        pred: impl Fn(&F) -> bool + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        Continuation::from_run(move |runtime, observer: Observer<F, A>| loop {
            if runtime.is_cancelled() {
                return;
            }
            match run_step(&self, runtime) {
                StepResult::Deferred => return,
                StepResult::Landed(Outcome::Else(err)) => match guard_panic(|| pred(&err)) {
                    Ok(true) => continue,
                    Ok(false) => {
                        observer.notify_else(err);
                        return;
                    }
                    Err(crash) => {
                        observer.notify_crash(crash);
                        return;
                    }
                },
                StepResult::Landed(Outcome::Then(value)) => {
                    observer.notify_then(value);
                    return;
                }
                StepResult::Landed(Outcome::Crash(crash)) => {
                    observer.notify_crash(crash);
                    return;
                }
                StepResult::Landed(Outcome::Panic(_)) => {
                    unreachable!("inner dispatch never synthesizes a Panic outcome")
                }
            }
        })
    }

    /// `elseUntil(pred)`.
    pub fn else_until(
        self,
        pred: impl Fn(&F) -> bool + Send + Sync + 'static,
    ) -> Continuation<E, F, A> {
        self.else_while(move |e| !pred(e))
    }

    /// `elseForever`: typed to `Never` on the else channel.
    pub fn else_forever(self) -> Continuation<E, Never, A>
    where
        F: 'static,
        A: Clone,
    {
        self.else_until(|_| false)
            .else_map(|_: F| -> Never { unreachable!("elseForever never lands on Else") })
    }

    /// `crashWhile(pred)`: mirrors [`Continuation::then_while`] on the crash
    /// channel.
    pub fn crash_while(
        self,
        pred: impl Fn(&ContCrash) -> bool + Send + Sync + 'static,
    ) -> Continuation<E, F, A>
    where
        F: Clone,
        A: Clone,
    {
        Continuation::from_run(move |runtime, observer: Observer<F, A>| loop {
            if runtime.is_cancelled() {
                return;
            }
            match run_step(&self, runtime) {
                StepResult::Deferred => return,
                StepResult::Landed(Outcome::Crash(crash)) => match guard_panic(|| pred(&crash)) {
                    Ok(true) => continue,
                    Ok(false) => {
                        observer.notify_crash(crash);
                        return;
                    }
                    Err(inner_crash) => {
                        observer.notify_crash(inner_crash);
                        return;
                    }
                },
                StepResult::Landed(Outcome::Then(value)) => {
                    observer.notify_then(value);
                    return;
                }
                StepResult::Landed(Outcome::Else(err)) => {
                    observer.notify_else(err);
                    return;
                }
                StepResult::Landed(Outcome::Panic(_)) => {
                    unreachable!("inner dispatch never synthesizes a Panic outcome")
                }
            }
        })
    }

    /// `crashUntil(pred)`.
    pub fn crash_until(
        self,
        pred: impl Fn(&ContCrash) -> bool + Send + Sync + 'static,
    ) -> Continuation<E, F, A>
    where
        F: Clone,
        A: Clone,
    {
        self.crash_while(move |c| !pred(c))
    }

    /// `crashForever`: always re-iterates on crash; in practice only stops
    /// via `Then`/`Else`/cancellation, since a non-crash outcome from the
    /// wrapped continuation ends the loop immediately.
    pub fn crash_forever(self) -> Continuation<E, F, A>
    where
        F: Clone,
        A: Clone,
    {
        self.crash_until(|_| false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn then_while_stops_at_first_false_predicate() {
        let counter = Arc::new(AtomicU64::new(0));
        let counter2 = Arc::clone(&counter);
        let cont: Continuation<(), String, u64> = Continuation::from_deferred(move || {
            Continuation::of(counter2.fetch_add(1, Ordering::SeqCst) + 1)
        })
        .then_while(|v| *v < 100);

        let result = Arc::new(Mutex::new(None));
        let result2 = Arc::clone(&result);
        cont.invoke(
            &Runtime::new(()),
            Observer::new().with_on_then(move |v| *result2.lock().unwrap() = Some(v)),
        );
        assert_eq!(*result.lock().unwrap(), Some(100));
    }

    #[test]
    fn then_while_is_stack_safe_for_100_000_iterations() {
        let counter = Arc::new(AtomicU64::new(0));
        let counter2 = Arc::clone(&counter);
        let cont: Continuation<(), String, u64> = Continuation::from_deferred(move || {
            Continuation::of(counter2.fetch_add(1, Ordering::SeqCst) + 1)
        })
        .then_until(|v| *v == 100_000);

        let result = Arc::new(Mutex::new(None));
        let result2 = Arc::clone(&result);
        cont.invoke(
            &Runtime::new(()),
            Observer::new().with_on_then(move |v| *result2.lock().unwrap() = Some(v)),
        );
        assert_eq!(*result.lock().unwrap(), Some(100_000));
    }

    #[test]
    fn then_while_short_circuits_on_else() {
        let cont: Continuation<(), String, i32> =
            Continuation::error("bad".to_string()).then_while(|_| true);
        let result = Arc::new(Mutex::new(None));
        let result2 = Arc::clone(&result);
        cont.invoke(
            &Runtime::new(()),
            Observer::new().with_on_else(move |e| *result2.lock().unwrap() = Some(e)),
        );
        assert_eq!(*result.lock().unwrap(), Some("bad".to_string()));
    }

    #[test]
    fn then_forever_never_notifies_when_cancelled_immediately() {
        use crate::runtime::CancellationTokenSource;
        let source = CancellationTokenSource::new();
        source.cancel();
        let runtime = Runtime::with_cancellation((), source.token());
        let cont: Continuation<(), String, i32> = Continuation::of(1).then_forever();
        let fired = Arc::new(AtomicU64::new(0));
        let fired2 = Arc::clone(&fired);
        cont.invoke(
            &runtime,
            Observer::new().with_on_then(move |_: Never| {
                fired2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn else_until_stops_when_predicate_becomes_true() {
        let counter = Arc::new(AtomicU64::new(0));
        let counter2 = Arc::clone(&counter);
        let cont: Continuation<(), u64, i32> = Continuation::from_deferred(move || {
            Continuation::error(counter2.fetch_add(1, Ordering::SeqCst) + 1)
        })
        .else_until(|v| *v == 5);

        let result = Arc::new(Mutex::new(None));
        let result2 = Arc::clone(&result);
        cont.invoke(
            &Runtime::new(()),
            Observer::new().with_on_else(move |v| *result2.lock().unwrap() = Some(v)),
        );
        assert_eq!(*result.lock().unwrap(), Some(5));
    }
}
