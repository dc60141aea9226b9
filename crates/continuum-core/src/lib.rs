//! A compositional effect library built around a three-channel
//! [`Continuation`]: every run lands on exactly one of success (`Then`),
//! an expected failure (`Else`), or a crash (`Crash`) — plus the separate
//! `Panic` escape hatch for a throw inside an observer callback itself.
//!
//! Start at [`Continuation`] for the constructors (C4/C5), the
//! `combinators` module for the per-channel `{then,else,crash}` families
//! (C6), [`trampoline`] for stack-safe looping (C7), [`parallel`] and
//! [`crash_parallel`] for the fan-out primitives (C8), [`policy`] for the
//! descriptors that pick a parallel primitive's branch (C9), and [`run`]
//! for the entry point that actually executes a composition (C10).
//!
//! ```
//! use continuum_core::{run, Continuation, RunCallbacks};
//!
//! let cont: Continuation<(), String, i32> = Continuation::of(1).then_map(|n| n + 1);
//! run(cont, (), RunCallbacks::new().on_then(|n| assert_eq!(n, 2)));
//! ```

pub mod combinators;
pub mod cont;
pub mod crash_parallel;
pub mod error;
pub mod never;
pub mod observer;
pub mod outcome;
pub mod parallel;
pub mod policy;
pub mod run;
pub mod runtime;
pub mod trampoline;

pub use cont::Continuation;
pub use error::{ContCrash, ContError, NormalCrash};
pub use never::Never;
pub use observer::Observer;
pub use outcome::Outcome;
pub use policy::{BothPolicy, CrashPolicy, OkPolicy};
pub use run::{run, RunCallbacks};
pub use runtime::{CancellationToken, CancellationTokenSource, Runtime};

pub use crash_parallel::{coalesce, merge, merge_all};
pub use parallel::{all, any, both, either};
