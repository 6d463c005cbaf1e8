// ============================================================================
// spark-dom - Reactive Context
// Thread-local state for tracking, batching and the error channel
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::types::{AnyReaction, AnySource, PendingNotify};
use crate::error::Error;

// =============================================================================
// REACTIVE CONTEXT
// =============================================================================

/// Thread-local context holding all global state for reactivity.
pub struct ReactiveContext {
    // =========================================================================
    // REACTION TRACKING
    // =========================================================================
    /// Currently executing reaction (effect or computation)
    pub active_reaction: RefCell<Option<Weak<dyn AnyReaction>>>,

    /// Whether we're currently untracking (reading without creating dependencies)
    pub untracking: Cell<bool>,

    // =========================================================================
    // VERSION COUNTERS
    // =========================================================================
    /// Read version of the running reaction. Sources stamped with this
    /// version were already recorded during the current run.
    pub read_version: Cell<u32>,

    /// Monotonic source of fresh read versions
    pub version_counter: Cell<u32>,

    // =========================================================================
    // DEPENDENCY TRACKING (during reaction execution)
    // =========================================================================
    /// Dependencies collected during the current reaction run
    pub new_deps: RefCell<Vec<Rc<dyn AnySource>>>,

    // =========================================================================
    // BATCHING
    // =========================================================================
    /// Current batch depth (for nested batches)
    pub batch_depth: Cell<u32>,

    /// Reactions waiting for the settle pass, stamped with the generation
    /// they were scheduled against
    pub pending_reactions: RefCell<Vec<(Weak<dyn AnyReaction>, u64)>>,

    /// Streams whose subscriber notification was deferred by a batch
    pub pending_notifications: RefCell<Vec<Rc<dyn PendingNotify>>>,

    /// Whether the settle pass is running
    pub is_flushing: Cell<bool>,

    // =========================================================================
    // ERROR CHANNEL
    // =========================================================================
    pub errors: RefCell<Vec<Error>>,
}

impl ReactiveContext {
    pub fn new() -> Self {
        Self {
            active_reaction: RefCell::new(None),
            untracking: Cell::new(false),
            read_version: Cell::new(0),
            version_counter: Cell::new(0),
            new_deps: RefCell::new(Vec::new()),
            batch_depth: Cell::new(0),
            pending_reactions: RefCell::new(Vec::new()),
            pending_notifications: RefCell::new(Vec::new()),
            is_flushing: Cell::new(false),
            errors: RefCell::new(Vec::new()),
        }
    }

    // =========================================================================
    // REACTION TRACKING
    // =========================================================================

    /// Set the active reaction, returning the previous one
    pub fn set_active_reaction(
        &self,
        reaction: Option<Weak<dyn AnyReaction>>,
    ) -> Option<Weak<dyn AnyReaction>> {
        self.active_reaction.replace(reaction)
    }

    pub fn get_active_reaction(&self) -> Option<Weak<dyn AnyReaction>> {
        self.active_reaction.borrow().clone()
    }

    pub fn has_active_reaction(&self) -> bool {
        self.active_reaction.borrow().is_some()
    }

    /// Set untracking mode, returning previous value
    pub fn set_untracking(&self, value: bool) -> bool {
        self.untracking.replace(value)
    }

    pub fn is_untracking(&self) -> bool {
        self.untracking.get()
    }

    // =========================================================================
    // VERSION COUNTERS
    // =========================================================================

    /// Allocate a fresh read version and make it current.
    ///
    /// Never reuses a value: a nested run may have stamped sources with a
    /// newer version than the outer run, so restoring an old one would make
    /// the outer run skip real dependencies.
    pub fn next_read_version(&self) -> u32 {
        let v = self.version_counter.get().wrapping_add(1);
        self.version_counter.set(v);
        self.read_version.set(v);
        v
    }

    pub fn get_read_version(&self) -> u32 {
        self.read_version.get()
    }

    // =========================================================================
    // DEPENDENCY TRACKING
    // =========================================================================

    /// Swap out the new_deps list, returning the old one
    pub fn swap_new_deps(&self, deps: Vec<Rc<dyn AnySource>>) -> Vec<Rc<dyn AnySource>> {
        self.new_deps.replace(deps)
    }

    pub fn add_new_dep(&self, source: Rc<dyn AnySource>) {
        self.new_deps.borrow_mut().push(source);
    }

    pub fn new_dep_count(&self) -> usize {
        self.new_deps.borrow().len()
    }

    // =========================================================================
    // BATCHING
    // =========================================================================

    /// Increment batch depth, returns new depth
    pub fn enter_batch(&self) -> u32 {
        let depth = self.batch_depth.get() + 1;
        self.batch_depth.set(depth);
        depth
    }

    /// Decrement batch depth, returns new depth
    pub fn exit_batch(&self) -> u32 {
        let depth = self.batch_depth.get().saturating_sub(1);
        self.batch_depth.set(depth);
        depth
    }

    pub fn get_batch_depth(&self) -> u32 {
        self.batch_depth.get()
    }

    pub fn is_batching(&self) -> bool {
        self.batch_depth.get() > 0
    }

    pub fn add_pending_reaction(&self, reaction: Weak<dyn AnyReaction>, generation: u64) {
        self.pending_reactions
            .borrow_mut()
            .push((reaction, generation));
    }

    pub fn take_pending_reactions(&self) -> Vec<(Weak<dyn AnyReaction>, u64)> {
        self.pending_reactions.replace(Vec::new())
    }

    pub fn add_pending_notification(&self, source: Rc<dyn PendingNotify>) {
        self.pending_notifications.borrow_mut().push(source);
    }

    pub fn take_pending_notifications(&self) -> Vec<Rc<dyn PendingNotify>> {
        self.pending_notifications.replace(Vec::new())
    }

    pub fn has_pending_work(&self) -> bool {
        !self.pending_reactions.borrow().is_empty()
            || !self.pending_notifications.borrow().is_empty()
    }

    /// Set flushing mode, returning previous
    pub fn set_flushing(&self, value: bool) -> bool {
        self.is_flushing.replace(value)
    }

    pub fn is_flushing(&self) -> bool {
        self.is_flushing.get()
    }

    // =========================================================================
    // ERROR CHANNEL
    // =========================================================================

    pub fn push_error(&self, error: Error) {
        self.errors.borrow_mut().push(error);
    }

    pub fn take_errors(&self) -> Vec<Error> {
        self.errors.replace(Vec::new())
    }

    pub fn error_count(&self) -> usize {
        self.errors.borrow().len()
    }
}

impl Default for ReactiveContext {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    static CONTEXT: ReactiveContext = ReactiveContext::new();
}

/// Access the thread-local reactive context.
///
/// # Example
///
/// ```ignore
/// with_context(|ctx| {
///     ctx.enter_batch();
/// });
/// ```
pub fn with_context<R>(f: impl FnOnce(&ReactiveContext) -> R) -> R {
    CONTEXT.with(f)
}

// =============================================================================
// CONVENIENCE FUNCTIONS
// =============================================================================

/// Check if currently tracking dependencies (inside a reaction, not untracking)
pub fn is_tracking() -> bool {
    with_context(|ctx| ctx.has_active_reaction() && !ctx.is_untracking())
}

/// Check if currently untracking
pub fn is_untracking() -> bool {
    with_context(|ctx| ctx.is_untracking())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_creation() {
        with_context(|ctx| {
            assert_eq!(ctx.get_read_version(), 0);
            assert!(!ctx.has_active_reaction());
            assert!(!ctx.is_untracking());
            assert_eq!(ctx.get_batch_depth(), 0);
            assert!(!ctx.has_pending_work());
        });
    }

    #[test]
    fn read_versions_never_repeat() {
        with_context(|ctx| {
            let a = ctx.next_read_version();
            let b = ctx.next_read_version();
            assert!(b > a);
            assert_eq!(ctx.get_read_version(), b);
        });
    }

    #[test]
    fn batch_depth() {
        with_context(|ctx| {
            assert!(!ctx.is_batching());

            assert_eq!(ctx.enter_batch(), 1);
            assert_eq!(ctx.enter_batch(), 2);
            assert!(ctx.is_batching());

            assert_eq!(ctx.exit_batch(), 1);
            assert!(ctx.is_batching());

            assert_eq!(ctx.exit_batch(), 0);
            assert!(!ctx.is_batching());

            // Never underflows
            assert_eq!(ctx.exit_batch(), 0);
        });
    }

    #[test]
    fn untracking_flag() {
        with_context(|ctx| {
            let prev = ctx.set_untracking(true);
            assert!(!prev);
            assert!(ctx.is_untracking());
            assert!(is_untracking());

            let prev = ctx.set_untracking(false);
            assert!(prev);
            assert!(!ctx.is_untracking());
        });
    }

    #[test]
    fn error_channel_round_trip() {
        with_context(|ctx| {
            ctx.push_error(Error::InvalidTag("".into()));
            assert_eq!(ctx.error_count(), 1);
            assert_eq!(ctx.take_errors().len(), 1);
            assert_eq!(ctx.error_count(), 0);
        });
    }

    #[test]
    fn not_tracking_outside_reactions() {
        assert!(!is_tracking());
    }
}
