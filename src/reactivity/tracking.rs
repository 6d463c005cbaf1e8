// ============================================================================
// spark-dom - Dependency Tracking
// Tracking reads during a run and propagating writes to dependents
// ============================================================================
//
// The key challenge in Rust is borrow scoping: RefCell borrows must be released
// before mutating, using the "collect-then-mutate" pattern throughout.
// ============================================================================

use std::rc::{Rc, Weak};

use crate::core::context::with_context;
use crate::core::types::{same_source, AnyReaction, AnySource};
use crate::reactivity::scheduling::flush;

// =============================================================================
// TRACK READ - Register dependency when reading a stream
// =============================================================================

/// Track a read of a source, recording it as a dependency of the running
/// reaction.
///
/// Reads outside a run, or inside `untrack`, record nothing. Repeated reads of
/// the same source within one run are recorded once (read-version stamp).
pub fn track_read(source: Rc<dyn AnySource>) {
    with_context(|ctx| {
        if ctx.is_untracking() {
            return;
        }

        let reaction = match ctx.get_active_reaction().and_then(|w| w.upgrade()) {
            Some(r) => r,
            None => return,
        };

        if !reaction.is_updating() {
            return;
        }

        let read_version = ctx.get_read_version();
        if source.read_version() != read_version {
            source.set_read_version(read_version);
            ctx.add_new_dep(source);
        }
    });
}

// =============================================================================
// TRACKING FRAME - Save/restore the tracking state around a run
// =============================================================================

/// Guard that makes a reaction the active tracking target for its lifetime.
///
/// Restores the previous reaction, its partially collected dependencies and
/// the untracking flag on drop, even when the run panics.
pub struct TrackingFrame {
    prev_reaction: Option<Weak<dyn AnyReaction>>,
    prev_deps: Vec<Rc<dyn AnySource>>,
    prev_untracking: bool,
}

impl TrackingFrame {
    pub fn enter(reaction: Weak<dyn AnyReaction>) -> Self {
        with_context(|ctx| {
            let prev_reaction = ctx.set_active_reaction(Some(reaction));
            let prev_deps = ctx.swap_new_deps(Vec::new());
            let prev_untracking = ctx.set_untracking(false);
            ctx.next_read_version();
            Self {
                prev_reaction,
                prev_deps,
                prev_untracking,
            }
        })
    }

    /// Take the dependencies collected so far in this frame.
    pub fn take_deps(&self) -> Vec<Rc<dyn AnySource>> {
        with_context(|ctx| ctx.swap_new_deps(Vec::new()))
    }
}

impl Drop for TrackingFrame {
    fn drop(&mut self) {
        let prev_deps = std::mem::take(&mut self.prev_deps);
        let prev_reaction = self.prev_reaction.take();
        with_context(|ctx| {
            ctx.set_active_reaction(prev_reaction);
            ctx.swap_new_deps(prev_deps);
            ctx.set_untracking(self.prev_untracking);
            // The outer run continues with a fresh version
            ctx.next_read_version();
        });
    }
}

// =============================================================================
// NOTIFY WRITE / MARK REACTIONS - Propagate dirty state
// =============================================================================

/// Notify the graph that a source's value was written.
///
/// Every live dependent becomes dirty and is queued for the settle pass. The
/// pass runs right away unless a batch or another pass is in progress.
pub fn notify_write(source: Rc<dyn AnySource>) {
    mark_reactions(&*source);

    let should_flush = with_context(|ctx| !ctx.is_batching() && !ctx.is_flushing());
    if should_flush {
        flush();
    }
}

/// Mark every live reaction of a source dirty and queue it.
///
/// Already-dirty reactions are queued already and are left alone. Destroyed
/// reactions are skipped.
pub fn mark_reactions(source: &dyn AnySource) {
    source.cleanup_dead_reactions();

    // BORROW SAFETY: collect first, then mutate flags and the queue
    let mut reactions: Vec<Rc<dyn AnyReaction>> = Vec::new();
    source.for_each_reaction(&mut |reaction| reactions.push(reaction));

    for reaction in reactions {
        if reaction.is_destroyed() || reaction.is_dirty() {
            continue;
        }
        reaction.mark_dirty();
        let generation = reaction.generation();
        with_context(|ctx| ctx.add_pending_reaction(Rc::downgrade(&reaction), generation));
    }
}

// =============================================================================
// INSTALL DEPENDENCIES - Swap dependency sets after a run
// =============================================================================

/// Install the dependency set collected by a run.
///
/// Sources present before but not read this time lose the reaction; newly
/// read sources gain it. Returns the deduplicated new dependency list.
pub fn install_dependencies(
    reaction: &Rc<dyn AnyReaction>,
    old: &[Rc<dyn AnySource>],
    collected: Vec<Rc<dyn AnySource>>,
) -> Vec<Rc<dyn AnySource>> {
    let mut new_deps: Vec<Rc<dyn AnySource>> = Vec::with_capacity(collected.len());
    for dep in collected {
        if !new_deps.iter().any(|d| same_source(d, &dep)) {
            new_deps.push(dep);
        }
    }

    for dep in old {
        if !new_deps.iter().any(|d| same_source(d, dep)) {
            dep.remove_reaction(reaction);
        }
    }

    for dep in &new_deps {
        if !old.iter().any(|d| same_source(d, dep)) {
            dep.add_reaction(Rc::downgrade(reaction));
        }
    }

    new_deps
}

/// Topological depth of a reaction reading the given sources.
pub fn depth_of(deps: &[Rc<dyn AnySource>]) -> u32 {
    1 + deps.iter().map(|d| d.depth()).max().unwrap_or(0)
}

// =============================================================================
// REMOVE REACTIONS - Detach a reaction from all of its sources
// =============================================================================

pub fn remove_reactions(reaction: &Rc<dyn AnyReaction>, deps: &[Rc<dyn AnySource>]) {
    for dep in deps {
        dep.remove_reaction(reaction);
    }
}

// =============================================================================
// TESTS
// =============================================================================
