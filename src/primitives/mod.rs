// ============================================================================
// spark-dom - Primitives Module
// Streams, effects, computations and binding scopes
// ============================================================================

pub mod compose;
pub mod effect;
pub mod scope;
pub mod stream;

pub use compose::{
    compose, compute, filter, map, try_compute, Chain, Computed, FilterStage, MapStage, Stage,
};
pub use effect::{destroy_effect, effect, run_effect, Effect, EffectFn, EffectInner};
pub use scope::{BindingScope, ScopeCleanupFn};
pub use stream::{value_stream, Stream, Subscription};
