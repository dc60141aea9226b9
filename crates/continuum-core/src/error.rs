//! Expected-error wrapper and crash representation.
//!
//! A [`Continuation`](crate::Continuation) keeps three outcomes apart: the
//! declared expected-error type `F` travels on the else channel unwrapped;
//! the crash channel always carries a [`ContCrash`], which is this crate's
//! representation of "something the combinator chain did not expect."

use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;

/// An expected-error value paired with the stack trace captured at the
/// point it was raised.
///
/// Two `ContError<F>` values compare equal when their wrapped `value`s do;
/// the backtrace is diagnostic only and never participates in equality.
#[derive(Clone)]
pub struct ContError<F> {
    value: F,
    backtrace: Arc<Backtrace>,
}

impl<F> ContError<F> {
    /// Capture `value` together with the current stack trace.
    pub fn capture(value: F) -> Self {
        Self {
            value,
            backtrace: Arc::new(Backtrace::capture()),
        }
    }

    /// The wrapped expected-error value.
    pub fn value(&self) -> &F {
        &self.value
    }

    /// Consume the wrapper, discarding the backtrace.
    pub fn into_value(self) -> F {
        self.value
    }

    /// The stack trace captured at [`ContError::capture`] time.
    ///
    /// Only resolves symbol names when `RUST_BACKTRACE` is set; otherwise
    /// this is a cheap disabled capture, matching `std::backtrace`'s own
    /// cost model.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Map the wrapped value, keeping the original backtrace.
    pub fn map<G>(self, f: impl FnOnce(F) -> G) -> ContError<G> {
        ContError {
            value: f(self.value),
            backtrace: self.backtrace,
        }
    }
}

impl<F: PartialEq> PartialEq for ContError<F> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<F: fmt::Debug> fmt::Debug for ContError<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContError").field("value", &self.value).finish_non_exhaustive()
    }
}

/// An unexpected failure: a panic that escaped a user callback passed to a
/// combinator or leaf, or the combination of two such failures from a
/// parallel primitive.
///
/// `Merged` preserves both branches rather than picking one, so diagnostic
/// context from a concurrent failure is never silently dropped (spec
/// invariant: crash accumulation keeps "full diagnostic context").
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContCrash {
    /// A single panic, with its message and the stack trace captured where
    /// it was caught.
    #[error("crash: {message}")]
    Normal {
        /// The panic payload, downcast to a displayable message where
        /// possible (`&str`/`String`), or a placeholder otherwise.
        message: String,
        /// Stack trace captured at the `catch_unwind` boundary.
        backtrace: Arc<Backtrace>,
    },
    /// Two crashes combined by a parallel policy that does not discard
    /// either side (e.g. `RunAll`).
    #[error("merged crash: ({left}) and ({right})")]
    Merged {
        /// The left-hand crash.
        left: Box<ContCrash>,
        /// The right-hand crash.
        right: Box<ContCrash>,
    },
}

impl ContCrash {
    /// Build a `Normal` crash from a caught panic payload.
    ///
    /// Called at every `catch_unwind` boundary inside the combinators; see
    /// [`crate::combinators::guard_panic`].
    pub fn from_panic_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };
        ContCrash::Normal {
            message,
            backtrace: Arc::new(Backtrace::capture()),
        }
    }

    /// Combine two crashes into a `Merged` node, preserving both.
    pub fn merge(left: ContCrash, right: ContCrash) -> Self {
        ContCrash::Merged {
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

/// A panic that escaped an observer callback (`onThen`/`onElse`/`onCrash`).
///
/// Distinct from [`ContCrash`]: a `Panic` outcome is never caught by
/// in-composition handlers (`crashDo` etc.) — it can only be observed via
/// the dedicated `onPanic` sink on [`crate::run`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("panic in observer callback: {message}")]
pub struct NormalCrash {
    /// The panic payload, downcast to a message the same way as
    /// [`ContCrash::from_panic_payload`].
    pub message: String,
    /// Stack trace captured where the panic was caught.
    pub backtrace: Arc<Backtrace>,
}

impl NormalCrash {
    /// Build a `NormalCrash` from a caught panic payload.
    pub fn from_panic_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };
        Self {
            message,
            backtrace: Arc::new(Backtrace::capture()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cont_error_capture_roundtrips_value() {
        let err = ContError::capture(42i32);
        assert_eq!(*err.value(), 42);
        assert_eq!(err.into_value(), 42);
    }

    #[test]
    fn cont_error_equality_ignores_backtrace() {
        let a = ContError::capture("boom".to_string());
        let b = ContError::capture("boom".to_string());
        assert_eq!(a, b);
    }

    #[test]
    fn cont_error_map_transforms_value() {
        let err = ContError::capture(3i32);
        let mapped = err.map(|v| v * 2);
        assert_eq!(*mapped.value(), 6);
    }

    #[test]
    fn cont_crash_from_str_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("kaboom");
        let crash = ContCrash::from_panic_payload(payload);
        match crash {
            ContCrash::Normal { message, .. } => assert_eq!(message, "kaboom"),
            ContCrash::Merged { .. } => panic!("expected Normal"),
        }
    }

    #[test]
    fn cont_crash_from_string_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned boom"));
        let crash = ContCrash::from_panic_payload(payload);
        match crash {
            ContCrash::Normal { message, .. } => assert_eq!(message, "owned boom"),
            ContCrash::Merged { .. } => panic!("expected Normal"),
        }
    }

    #[test]
    fn cont_crash_from_unknown_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(404i32);
        let crash = ContCrash::from_panic_payload(payload);
        match crash {
            ContCrash::Normal { message, .. } => assert_eq!(message, "Box<dyn Any>"),
            ContCrash::Merged { .. } => panic!("expected Normal"),
        }
    }

    #[test]
    fn cont_crash_merge_preserves_both_sides() {
        let left = ContCrash::from_panic_payload(Box::new("left"));
        let right = ContCrash::from_panic_payload(Box::new("right"));
        let merged = ContCrash::merge(left, right);
        match merged {
            ContCrash::Merged { left, right } => {
                assert!(left.to_string().contains("left"));
                assert!(right.to_string().contains("right"));
            }
            ContCrash::Normal { .. } => panic!("expected Merged"),
        }
    }

    #[test]
    fn normal_crash_display_includes_message() {
        let crash = NormalCrash::from_panic_payload(Box::new("observer exploded"));
        assert!(crash.to_string().contains("observer exploded"));
    }
}
