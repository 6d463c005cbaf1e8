// ============================================================================
// spark-dom - Batching
// Group stream writes into a single settle pass
// ============================================================================

use crate::core::context::with_context;
use crate::reactivity::scheduling::flush;

// =============================================================================
// BATCH
// =============================================================================

/// Run `f` as one transaction over scalar streams.
///
/// Writes inside the scope update values immediately, so reads see them, but
/// subscriber notification and reaction re-runs wait until the outermost batch
/// closes. Each written stream then notifies once, with its latest value.
///
/// # Example
///
/// ```
/// use spark_dom::{batch, effect, value_stream};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let a = value_stream(1);
/// let b = value_stream(2);
/// let runs = Rc::new(Cell::new(0));
///
/// let (a2, b2, r) = (a.clone(), b.clone(), runs.clone());
/// let _sum = effect(move || {
///     let _ = a2.get() + b2.get();
///     r.set(r.get() + 1);
/// });
/// assert_eq!(runs.get(), 1);
///
/// batch(|| {
///     a.set(10);
///     b.set(20);
/// });
///
/// // One re-run for both writes
/// assert_eq!(runs.get(), 2);
/// ```
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    with_context(|ctx| ctx.enter_batch());

    // Exit the batch even on panic
    struct BatchGuard;

    impl Drop for BatchGuard {
        fn drop(&mut self) {
            let depth = with_context(|ctx| ctx.exit_batch());
            if depth == 0 {
                flush();
            }
        }
    }

    let _guard = BatchGuard;
    f()
}

/// Check if currently inside a batch.
///
/// ```
/// use spark_dom::{batch, is_batching};
///
/// assert!(!is_batching());
/// batch(|| assert!(is_batching()));
/// assert!(!is_batching());
/// ```
pub fn is_batching() -> bool {
    with_context(|ctx| ctx.is_batching())
}

// =============================================================================
// UNTRACK
// =============================================================================

/// Read streams without creating dependencies.
///
/// # Example
///
/// ```
/// use spark_dom::{effect, untrack, value_stream};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let a = value_stream(1);
/// let b = value_stream(2);
/// let runs = Rc::new(Cell::new(0));
///
/// let (a2, b2, r) = (a.clone(), b.clone(), runs.clone());
/// let _e = effect(move || {
///     let _ = a2.get() + untrack(|| b2.get());
///     r.set(r.get() + 1);
/// });
///
/// a.set(10);
/// assert_eq!(runs.get(), 2);
///
/// b.set(20); // untracked
/// assert_eq!(runs.get(), 2);
/// ```
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let prev = with_context(|ctx| ctx.set_untracking(true));

    // Restore even on panic
    struct UntrackGuard {
        prev: bool,
    }

    impl Drop for UntrackGuard {
        fn drop(&mut self) {
            with_context(|ctx| ctx.set_untracking(self.prev));
        }
    }

    let _guard = UntrackGuard { prev };
    f()
}

// =============================================================================
// TESTS
// =============================================================================
