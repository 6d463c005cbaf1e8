// ============================================================================
// spark-dom - Observable Collections
// Arrays that report structured changes, and filtered views over them
// ============================================================================
//
// Two layers of reactivity:
//
// 1. Change records: listeners learn exactly which indices changed
// 2. Version stream: computations reading the array re-run on any change
// ============================================================================

mod filter;
mod observable_array;

pub use filter::Filter;
pub use observable_array::{ArrayChange, ChangeKind, ObservableArray, WeakObservableArray};
