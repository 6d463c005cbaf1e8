// ============================================================================
// spark-dom - BoundNode
// A host node together with the bindings that keep it live
// ============================================================================

use std::fmt;

use crate::primitives::scope::BindingScope;

/// A host node plus the [`BindingScope`] owning its subscriptions, effects,
/// event listeners and child bindings.
///
/// Dropping it, or calling [`dispose`](Self::dispose), stops every binding
/// exactly once. The node itself stays wherever the host put it.
pub struct BoundNode<N> {
    node: N,
    scope: BindingScope,
}

impl<N> BoundNode<N> {
    pub fn new(node: N, scope: BindingScope) -> Self {
        Self { node, scope }
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    pub fn scope(&self) -> &BindingScope {
        &self.scope
    }

    pub fn is_active(&self) -> bool {
        self.scope.is_active()
    }

    /// Run `f` when the bindings are released.
    pub fn on_dispose(&self, f: impl FnOnce() + 'static) {
        self.scope.add_cleanup(f);
    }

    pub fn dispose(self) {
        self.scope.stop();
    }

    /// Keep the bindings alive for the rest of the thread and return the node.
    ///
    /// For static mounting where nothing will ever tear the node down.
    pub fn leak(self) -> N {
        let (node, scope) = self.into_parts();
        std::mem::forget(scope);
        node
    }

    pub fn into_parts(self) -> (N, BindingScope) {
        (self.node, self.scope)
    }
}

impl<N: fmt::Debug> fmt::Debug for BoundNode<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundNode")
            .field("node", &self.node)
            .field("scope", &self.scope)
            .finish()
    }
}
