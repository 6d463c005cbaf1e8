// ============================================================================
// spark-dom - A minimal reactive binding runtime
// ============================================================================
//
// Streams and computations hold values; observable arrays report structured
// changes; `h` and `element_list` bind both to a host document tree without
// virtual-DOM diffing. Every binding is owned by a scope and released with the
// node it belongs to.
// ============================================================================

#[macro_use]
mod macros;

pub mod collections;
pub mod core;
pub mod dom;
pub mod error;
pub mod primitives;
pub mod reactivity;

// Reactive core
pub use crate::core::constants;
pub use crate::core::context::{is_tracking, is_untracking, with_context, ReactiveContext};
pub use crate::core::types::{AnyReaction, AnySource, SourceInner};

pub use primitives::compose::{
    compose, compute, filter, map, try_compute, Chain, Computed, FilterStage, MapStage, Stage,
};
pub use primitives::effect::{effect, Effect};
pub use primitives::scope::{BindingScope, ScopeCleanupFn};
pub use primitives::stream::{value_stream, Stream, Subscription};

pub use reactivity::batching::{batch, is_batching, untrack};
pub use reactivity::scheduling::flush;

// Collections
pub use collections::{ArrayChange, ChangeKind, Filter, ObservableArray, WeakObservableArray};

// Binders
pub use dom::attrs::{Attrs, AttrsArg};
pub use dom::children::{dynamic, Child};
pub use dom::events::{bind_target_attr, target_attr};
pub use dom::host::{Event, EventHandler, Host, ListenerId};
pub use dom::list::Identity;
pub use dom::memory::{MemoryHost, Mutation, NodeId};
pub use dom::node::BoundNode;
pub use dom::prop::{reactive, Observe, Prop, Reactive, Value};
pub use dom::{Dom, DomConfig, DEFAULT_BOOLEAN_ATTRIBUTES};

// Errors
pub use error::{error_count, take_errors, Error, Result};
