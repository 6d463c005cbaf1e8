// ============================================================================
// spark-dom - Effect System
// Reactions that re-run when the streams they read change
// ============================================================================
//
// Effects back every function-valued binding: reactive attributes, reactive
// child regions, and the computation behind `Computed<T>`.
//
// Key features:
// - Automatic dependency tracking (read during the run = dependency)
// - Dependency sets swapped after every run (conditional reads honoured)
// - Generation counter per run (stale queued runs are skipped)
// - Depth (1 + deepest dependency) for glitch-free settle waves
// - RAII disposal
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::types::{AnyReaction, AnySource};
use crate::error::{isolate, report, Error};
use crate::reactivity::batching::batch;
use crate::reactivity::tracking::{depth_of, install_dependencies, remove_reactions, TrackingFrame};

/// Effect function signature
pub type EffectFn = Box<dyn FnMut()>;

// =============================================================================
// EFFECT INNER
// =============================================================================

/// The inner effect implementation.
///
/// Implements AnyReaction (but not AnySource: effects have no dependents).
pub struct EffectInner {
    flags: Cell<u32>,

    /// Bumped at the start of every run
    generation: Cell<u64>,

    depth: Cell<u32>,

    /// The effect function (taken out while it runs)
    func: RefCell<Option<EffectFn>>,

    /// Sources read during the last run
    deps: RefCell<Vec<Rc<dyn AnySource>>>,

    /// Output stream of a computation; kept at this effect's depth
    output: RefCell<Option<Rc<dyn AnySource>>>,

    /// Name used in error reports
    label: &'static str,

    self_weak: RefCell<Weak<EffectInner>>,
}

impl EffectInner {
    pub fn new(effect_type: u32, label: &'static str, func: EffectFn) -> Rc<Self> {
        let effect = Rc::new(Self {
            flags: Cell::new(effect_type | DIRTY),
            generation: Cell::new(0),
            depth: Cell::new(1),
            func: RefCell::new(Some(func)),
            deps: RefCell::new(Vec::new()),
            output: RefCell::new(None),
            label,
            self_weak: RefCell::new(Weak::new()),
        });

        *effect.self_weak.borrow_mut() = Rc::downgrade(&effect);

        effect
    }

    pub(crate) fn set_output(&self, output: Rc<dyn AnySource>) {
        output.set_depth(self.depth.get());
        *self.output.borrow_mut() = Some(output);
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

// =============================================================================
// AnyReaction IMPLEMENTATION
// =============================================================================

impl AnyReaction for EffectInner {
    fn flags(&self) -> u32 {
        self.flags.get()
    }

    fn set_flags(&self, flags: u32) {
        self.flags.set(flags);
    }

    fn generation(&self) -> u64 {
        self.generation.get()
    }

    fn depth(&self) -> u32 {
        self.depth.get()
    }

    fn dep_count(&self) -> usize {
        self.deps.borrow().len()
    }

    fn run(&self) {
        let Some(rc_self) = self.self_weak.borrow().upgrade() else {
            return;
        };
        if let Err(message) = run_effect(&rc_self) {
            report(Error::CallbackPanicked {
                context: self.label,
                message,
            });
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// RUN EFFECT
// =============================================================================

/// Run an effect and install the dependencies it read.
///
/// 1. Bump the generation and mark clean (a write during the run re-dirties)
/// 2. Run the function inside a tracking frame, isolating panics
/// 3. Swap the dependency set and recompute the depth
///
/// Returns the panic message if the function panicked. Dependencies read
/// before the panic are still installed.
pub fn run_effect(effect: &Rc<EffectInner>) -> Result<(), String> {
    let flags = effect.flags.get();
    if flags & (DESTROYED | REACTION_IS_UPDATING) != 0 {
        return Ok(());
    }

    let Some(mut func) = effect.func.borrow_mut().take() else {
        return Ok(());
    };

    effect.generation.set(effect.generation.get() + 1);
    effect.mark_clean();
    effect.set_flags(effect.flags() | REACTION_IS_UPDATING);

    let reaction: Rc<dyn AnyReaction> = effect.clone();
    let frame = TrackingFrame::enter(Rc::downgrade(&reaction));
    let outcome = isolate(&mut func);
    let collected = frame.take_deps();
    drop(frame);

    effect.set_flags(effect.flags() & !REACTION_IS_UPDATING);

    // Disposed from inside its own run: nothing to install
    if effect.is_destroyed() {
        return outcome;
    }

    *effect.func.borrow_mut() = Some(func);

    let old = effect.deps.take();
    let new = install_dependencies(&reaction, &old, collected);
    let depth = depth_of(&new);
    effect.depth.set(depth);
    if let Some(output) = effect.output.borrow().as_ref() {
        output.set_depth(depth);
    }
    *effect.deps.borrow_mut() = new;

    outcome
}

// =============================================================================
// DESTROY EFFECT
// =============================================================================

/// Detach an effect from every source and drop its function.
///
/// Idempotent. Safe to call from inside the effect's own run.
pub fn destroy_effect(effect: &Rc<EffectInner>) {
    if effect.is_destroyed() {
        return;
    }

    effect.set_flags((effect.flags() & STATUS_MASK) | CLEAN | DESTROYED);

    let reaction: Rc<dyn AnyReaction> = effect.clone();
    let deps = effect.deps.take();
    remove_reactions(&reaction, &deps);

    // Captured handles drop here; the borrow is released first
    let func = effect.func.borrow_mut().take();
    drop(func);
    effect.output.borrow_mut().take();
}

// =============================================================================
// EFFECT WRAPPER
// =============================================================================

/// Handle to a running effect.
///
/// Dropping the last handle disposes the effect.
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    pub(crate) fn from_inner(inner: Rc<EffectInner>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Rc<EffectInner> {
        &self.inner
    }

    /// Stop the effect: it never runs again and holds no dependency edges.
    pub fn dispose(&self) {
        destroy_effect(&self.inner);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_destroyed()
    }

    /// Number of sources read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.dep_count()
    }

    /// Number of completed or started runs.
    pub fn run_count(&self) -> u64 {
        self.inner.generation()
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        // The settle pass only holds temporary clones, so a count of one
        // means this was the last handle
        if Rc::strong_count(&self.inner) == 1 {
            self.dispose();
        }
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("label", &self.inner.label)
            .field("runs", &self.inner.generation())
            .field("dependencies", &self.inner.dep_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// =============================================================================
// PUBLIC API
// =============================================================================

/// Create an effect: `f` runs now, and again once per settle pass whenever a
/// stream it read during its previous run is written.
///
/// The first run happens inside a batch, so writes it makes settle once it
/// returns. A panic in `f` is isolated and reported to the error channel.
///
/// ```
/// use spark_dom::{effect, value_stream};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let count = value_stream(0);
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let (c, l) = (count.clone(), log.clone());
/// let _e = effect(move || l.borrow_mut().push(c.get()));
///
/// count.set(1);
/// count.set(2);
/// assert_eq!(*log.borrow(), vec![0, 1, 2]);
/// ```
pub fn effect(f: impl FnMut() + 'static) -> Effect {
    let inner = EffectInner::new(EFFECT, "effect", Box::new(f));

    batch(|| {
        if let Err(message) = run_effect(&inner) {
            report(Error::CallbackPanicked {
                context: inner.label,
                message,
            });
        }
    });

    tracing::trace!(dependencies = inner.dep_count(), "effect created");
    Effect::from_inner(inner)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::take_errors;
    use crate::value_stream;

    #[test]
    fn effect_runs_immediately_and_on_change() {
        let s = value_stream(1);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let (s2, seen2) = (s.clone(), seen.clone());
        let e = effect(move || seen2.borrow_mut().push(s2.get()));

        s.set(2);
        s.set(2);

        assert_eq!(*seen.borrow(), vec![1, 2, 2]);
        assert_eq!(e.run_count(), 3);
        assert_eq!(e.dependency_count(), 1);
    }

    #[test]
    fn conditional_reads_drop_stale_dependencies() {
        let flag = value_stream(true);
        let a = value_stream(0);
        let b = value_stream(0);
        let runs = Rc::new(Cell::new(0));

        let (f2, a2, b2, r) = (flag.clone(), a.clone(), b.clone(), runs.clone());
        let _e = effect(move || {
            r.set(r.get() + 1);
            if f2.get() {
                let _ = a2.get();
            } else {
                let _ = b2.get();
            }
        });
        assert_eq!(runs.get(), 1);

        flag.set(false);
        assert_eq!(runs.get(), 2);

        // `a` is no longer read: writing it must not re-run the effect
        a.set(5);
        assert_eq!(runs.get(), 2);

        b.set(5);
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn repeated_reads_register_one_edge() {
        let s = value_stream(1);
        let s2 = s.clone();
        let e = effect(move || {
            let _ = s2.get() + s2.get() + s2.get();
        });
        assert_eq!(e.dependency_count(), 1);
        assert_eq!(s.as_any_source().reaction_count(), 1);
    }

    #[test]
    fn dispose_stops_runs_and_releases_edges() {
        let s = value_stream(0);
        let runs = Rc::new(Cell::new(0));
        let (s2, r) = (s.clone(), runs.clone());
        let e = effect(move || {
            let _ = s2.get();
            r.set(r.get() + 1);
        });

        e.dispose();
        assert!(e.is_disposed());
        assert_eq!(s.as_any_source().reaction_count(), 0);

        s.set(1);
        assert_eq!(runs.get(), 1);

        // Idempotent
        e.dispose();
    }

    #[test]
    fn dropping_last_handle_disposes() {
        let s = value_stream(0);
        let runs = Rc::new(Cell::new(0));
        let (s2, r) = (s.clone(), runs.clone());
        let e = effect(move || {
            let _ = s2.get();
            r.set(r.get() + 1);
        });
        let e2 = e.clone();

        drop(e);
        s.set(1);
        assert_eq!(runs.get(), 2);

        drop(e2);
        s.set(2);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn panicking_effect_is_reported_and_keeps_tracking() {
        let s = value_stream(0);
        let s2 = s.clone();
        let _e = effect(move || {
            if s2.get() == 1 {
                panic!("bad value");
            }
        });

        s.set(1);
        let errors = take_errors();
        assert_eq!(
            errors,
            vec![Error::CallbackPanicked {
                context: "effect",
                message: "bad value".into()
            }]
        );

        // Still subscribed: the read happened before the panic
        s.set(2);
        assert!(take_errors().is_empty());
    }

    #[test]
    fn effect_disposing_itself_mid_run() {
        let s = value_stream(0);
        let slot: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));
        let runs = Rc::new(Cell::new(0));

        let (s2, slot2, r) = (s.clone(), slot.clone(), runs.clone());
        let e = effect(move || {
            r.set(r.get() + 1);
            if s2.get() > 0 {
                if let Some(me) = slot2.borrow().as_ref() {
                    me.dispose();
                }
            }
        });
        *slot.borrow_mut() = Some(e.clone());

        s.set(1);
        assert!(e.is_disposed());
        s.set(2);
        assert_eq!(runs.get(), 2);
        slot.borrow_mut().take();
    }

    #[test]
    fn nested_effect_creation_keeps_outer_tracking() {
        let outer_src = value_stream(0);
        let inner_src = value_stream(0);
        let outer_runs = Rc::new(Cell::new(0));
        let children: Rc<RefCell<Vec<Effect>>> = Rc::new(RefCell::new(Vec::new()));

        let (o, i, r, kids) = (
            outer_src.clone(),
            inner_src.clone(),
            outer_runs.clone(),
            children.clone(),
        );
        let _outer = effect(move || {
            r.set(r.get() + 1);
            let i2 = i.clone();
            kids.borrow_mut().push(effect(move || {
                let _ = i2.get();
            }));
            let _ = o.get();
        });

        // Inner reads do not leak into the outer effect
        inner_src.set(1);
        assert_eq!(outer_runs.get(), 1);

        outer_src.set(1);
        assert_eq!(outer_runs.get(), 2);
    }
}
