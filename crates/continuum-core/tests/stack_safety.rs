//! Bounded-iteration stack-safety checks and a larger parallel fan-out,
//! the properties spec.md §8 calls out explicitly rather than leaving to
//! unit-test coincidence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use continuum_core::{all, run, Continuation, OkPolicy, RunCallbacks};

#[test]
fn then_forever_style_loop_survives_100_000_synchronous_iterations() {
    let counter = Arc::new(AtomicU64::new(0));
    let counter2 = Arc::clone(&counter);
    let cont: Continuation<(), String, u64> = Continuation::from_deferred(move || {
        Continuation::of(counter2.fetch_add(1, Ordering::SeqCst) + 1)
    })
    .then_until(|v| *v == 100_000);

    let result = Arc::new(Mutex::new(None));
    let result2 = Arc::clone(&result);
    run(cont, (), RunCallbacks::new().on_then(move |v| *result2.lock().unwrap() = Some(v)));
    assert_eq!(*result.lock().unwrap(), Some(100_000));
}

#[test]
fn all_fans_out_over_a_thousand_children_without_blowing_the_stack() {
    let items: Vec<Continuation<(), String, i32>> = (0..1_000).map(Continuation::of).collect();
    let cont = all(items, OkPolicy::sequence());

    let result = Arc::new(Mutex::new(None));
    let result2 = Arc::clone(&result);
    run(cont, (), RunCallbacks::new().on_then(move |v: Vec<i32>| *result2.lock().unwrap() = Some(v)));

    let collected = result.lock().unwrap().take().expect("all() should land on Then");
    assert_eq!(collected.len(), 1_000);
    assert_eq!(collected, (0..1_000).collect::<Vec<i32>>());
}

#[test]
fn all_quit_fast_short_circuits_among_many_children() {
    let mut items: Vec<Continuation<(), String, i32>> = (0..500).map(Continuation::of).collect();
    items.push(Continuation::error("poison".to_string()));
    items.extend((0..500).map(Continuation::of));
    let cont = all(items, OkPolicy::quit_fast());

    let failed = Arc::new(Mutex::new(None));
    let failed2 = Arc::clone(&failed);
    run(cont, (), RunCallbacks::new().on_else(move |e| *failed2.lock().unwrap() = Some(e)));
    assert_eq!(*failed.lock().unwrap(), Some("poison".to_string()));
}
