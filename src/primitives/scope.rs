// ============================================================================
// spark-dom - Binding Scope
//
// Owns every release capability created while binding one node: effects,
// stream subscriptions, host listener removals, and nested child scopes.
// ============================================================================
//
// A BindingScope is stopped exactly once: explicitly via `stop()` or when it
// is dropped. Stopping order:
// 1. child scopes (innermost bindings go first)
// 2. effects
// 3. subscriptions
// 4. cleanup callbacks, in reverse registration order
//
// Resources added to an already-stopped scope are released immediately, so a
// binding racing with teardown never outlives its node.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::fmt;

use crate::error::{isolate, report, Error};
use crate::primitives::effect::Effect;
use crate::primitives::stream::Subscription;

/// Cleanup function type for scope disposal
pub type ScopeCleanupFn = Box<dyn FnOnce()>;

/// A group of bindings released together.
#[derive(Default)]
pub struct BindingScope {
    stopped: Cell<bool>,
    children: RefCell<Vec<BindingScope>>,
    effects: RefCell<Vec<Effect>>,
    subscriptions: RefCell<Vec<Subscription>>,
    cleanups: RefCell<Vec<ScopeCleanupFn>>,
}

impl BindingScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the scope is still live (not stopped)
    pub fn is_active(&self) -> bool {
        !self.stopped.get()
    }

    /// Number of resources currently held, counting child scopes as one each.
    pub fn len(&self) -> usize {
        self.children.borrow().len()
            + self.effects.borrow().len()
            + self.subscriptions.borrow().len()
            + self.cleanups.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_effect(&self, effect: Effect) {
        if self.stopped.get() {
            effect.dispose();
            return;
        }
        self.effects.borrow_mut().push(effect);
    }

    pub fn add_subscription(&self, subscription: Subscription) {
        if self.stopped.get() {
            subscription.unsubscribe();
            return;
        }
        self.subscriptions.borrow_mut().push(subscription);
    }

    /// Register a callback to run when the scope stops.
    pub fn add_cleanup(&self, cleanup: impl FnOnce() + 'static) {
        if self.stopped.get() {
            run_cleanup(Box::new(cleanup));
            return;
        }
        self.cleanups.borrow_mut().push(Box::new(cleanup));
    }

    /// Nest a child scope; it stops with this one.
    pub fn adopt(&self, child: BindingScope) {
        if self.stopped.get() {
            child.stop();
            return;
        }
        self.children.borrow_mut().push(child);
    }

    /// Release everything. Runs once; later calls do nothing.
    pub fn stop(&self) {
        if self.stopped.replace(true) {
            return;
        }

        // BORROW SAFETY: drain each list before releasing anything, since a
        // cleanup may touch this scope again
        let children: Vec<_> = self.children.borrow_mut().drain(..).collect();
        for child in children {
            child.stop();
        }

        let effects: Vec<_> = self.effects.borrow_mut().drain(..).collect();
        for effect in effects {
            effect.dispose();
        }

        let subscriptions: Vec<_> = self.subscriptions.borrow_mut().drain(..).collect();
        for subscription in subscriptions {
            subscription.unsubscribe();
        }

        let cleanups: Vec<_> = self.cleanups.borrow_mut().drain(..).collect();
        for cleanup in cleanups.into_iter().rev() {
            run_cleanup(cleanup);
        }
    }
}

fn run_cleanup(cleanup: ScopeCleanupFn) {
    if let Err(message) = isolate(cleanup) {
        report(Error::CallbackPanicked {
            context: "scope cleanup",
            message,
        });
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingScope")
            .field("active", &self.is_active())
            .field("children", &self.children.borrow().len())
            .field("effects", &self.effects.borrow().len())
            .field("subscriptions", &self.subscriptions.borrow().len())
            .field("cleanups", &self.cleanups.borrow().len())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
