// ============================================================================
// spark-dom - Settle Pass
// Runs deferred notifications and dirty reactions until the graph is quiet
// ============================================================================
//
// There is no microtask queue: writes outside a batch settle synchronously
// before `set` returns, writes inside a batch settle when the outermost batch
// closes. Each wave delivers deferred stream notifications first, then runs
// the queued reactions in ascending depth so that a computation reading both
// a stream and another computation over it runs once per wave.
// ============================================================================

use std::rc::Rc;

use crate::core::constants::MAX_SETTLE_ITERATIONS;
use crate::core::context::with_context;
use crate::core::types::AnyReaction;
use crate::error::{report, Error};

/// Clears the flushing flag even if a reaction panics out of the pass.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        with_context(|ctx| ctx.set_flushing(false));
    }
}

/// Run the settle pass now.
///
/// Re-entrant calls (from a reaction or subscriber running inside the pass)
/// return immediately; the outer pass picks up whatever they queued.
pub fn flush() {
    if with_context(|ctx| ctx.set_flushing(true)) {
        return;
    }
    let _guard = FlushGuard;

    let mut iterations = 0u32;
    loop {
        let (notifications, pending) = with_context(|ctx| {
            (ctx.take_pending_notifications(), ctx.take_pending_reactions())
        });

        if notifications.is_empty() && pending.is_empty() {
            break;
        }

        iterations += 1;
        if iterations > MAX_SETTLE_ITERATIONS {
            // Drop whatever is still queued so the next write starts clean
            let leftover = with_context(|ctx| {
                ctx.take_pending_notifications();
                ctx.take_pending_reactions()
            });
            let dropped = pending.len() + leftover.len();
            for (weak, _) in pending.iter().chain(leftover.iter()) {
                if let Some(reaction) = weak.upgrade() {
                    reaction.mark_clean();
                }
            }
            tracing::warn!(dropped, "settle pass abandoned");
            report(Error::UpdateDepthExceeded { iterations });
            break;
        }

        tracing::trace!(
            wave = iterations,
            notifications = notifications.len(),
            reactions = pending.len(),
            "settle wave"
        );

        for source in notifications {
            source.deliver();
        }

        let mut runnable: Vec<Rc<dyn AnyReaction>> = Vec::with_capacity(pending.len());
        for (weak, generation) in pending {
            let Some(reaction) = weak.upgrade() else {
                continue;
            };
            // A run since scheduling already consumed this request
            if reaction.generation() != generation || reaction.is_destroyed() {
                continue;
            }
            if !runnable
                .iter()
                .any(|r| Rc::as_ptr(r) as *const () == Rc::as_ptr(&reaction) as *const ())
            {
                runnable.push(reaction);
            }
        }

        runnable.sort_by_key(|r| r.depth());

        for reaction in runnable {
            if reaction.is_dirty() && !reaction.is_destroyed() {
                reaction.run();
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
