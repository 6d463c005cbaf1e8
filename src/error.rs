// ============================================================================
// spark-dom - Errors
// Misuse errors returned at the call site, plus the thread-local error channel
// that collects failures from isolated callbacks
// ============================================================================

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::core::context::with_context;

/// Errors produced by the binding runtime.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A closure producing the whole attribute map was passed to `h`.
    /// Attributes must be a map of per-key bindings.
    #[error(
        "attributes for <{tag}> must be a map of per-key bindings, not a function producing the whole map"
    )]
    ReactiveAttributes { tag: String },

    #[error("invalid tag name {0:?}")]
    InvalidTag(String),

    #[error("splice index {index} is out of range for an array of length {len}")]
    SpliceOutOfRange { index: usize, len: usize },

    #[error("index {index} is out of range for an array of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// An item in a bound list has no identity distinct from an earlier item.
    #[error("list item at position {position} has no distinct key (duplicate key {key})")]
    DuplicateKey { key: String, position: usize },

    #[error("{} subscriber(s) panicked during notification: {}", .failures.len(), .failures.join("; "))]
    SubscriberPanicked { failures: Vec<String> },

    #[error("{context} panicked: {message}")]
    CallbackPanicked {
        context: &'static str,
        message: String,
    },

    #[error("maximum update depth exceeded after {iterations} settle passes")]
    UpdateDepthExceeded { iterations: u32 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// =============================================================================
// ERROR CHANNEL
// =============================================================================

/// Log an error and queue it on the thread-local error channel.
pub(crate) fn report(error: Error) {
    tracing::error!(%error, "binding runtime error");
    with_context(|ctx| ctx.push_error(error));
}

/// Drain every error reported on this thread since the last call.
///
/// Failures inside subscribers, listeners and reactive bindings never unwind
/// into the writer; they land here instead.
pub fn take_errors() -> Vec<Error> {
    with_context(|ctx| ctx.take_errors())
}

/// Number of errors waiting on the error channel.
pub fn error_count() -> usize {
    with_context(|ctx| ctx.error_count())
}

// =============================================================================
// CALLBACK ISOLATION
// =============================================================================

/// Run a callback, turning a panic into its message.
pub(crate) fn isolate<R>(f: impl FnOnce() -> R) -> std::result::Result<R, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(&*payload))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolate_captures_panic_message() {
        let result = isolate(|| -> i32 { panic!("boom") });
        assert_eq!(result, Err("boom".to_string()));

        let formatted = isolate(|| -> i32 { panic!("code {}", 7) });
        assert_eq!(formatted, Err("code 7".to_string()));

        assert_eq!(isolate(|| 5), Ok(5));
    }

    #[test]
    fn reported_errors_are_drained_once() {
        assert_eq!(error_count(), 0);
        report(Error::InvalidTag(String::new()));
        report(Error::UpdateDepthExceeded { iterations: 3 });
        assert_eq!(error_count(), 2);

        let errors = take_errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], Error::InvalidTag(String::new()));
        assert!(take_errors().is_empty());
    }

    #[test]
    fn messages_are_descriptive() {
        let err = Error::ReactiveAttributes { tag: "div".into() };
        assert!(err.to_string().contains("<div>"));

        let err = Error::SubscriberPanicked {
            failures: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            err.to_string(),
            "2 subscriber(s) panicked during notification: a; b"
        );
    }
}
