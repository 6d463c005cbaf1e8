// ============================================================================
// spark-dom - Reactivity Module
// Dependency tracking, dirty propagation and the settle pass
// ============================================================================

pub mod batching;
pub mod scheduling;
pub mod tracking;

pub use tracking::{
    depth_of, install_dependencies, mark_reactions, notify_write, remove_reactions, track_read,
    TrackingFrame,
};

pub use scheduling::flush;

pub use batching::{batch, is_batching, untrack};
