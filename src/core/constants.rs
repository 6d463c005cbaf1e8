// ============================================================================
// spark-dom - Constants
// Flag bits for reactions and settle-pass limits
// ============================================================================

// =============================================================================
// REACTION TYPE FLAGS
// =============================================================================

/// Reaction is an effect (side-effecting binding, no output)
pub const EFFECT: u32 = 1 << 0;

/// Reaction drives the output stream of a `Computed`
pub const COMPUTED: u32 = 1 << 1;

// =============================================================================
// REACTION STATE FLAGS
// =============================================================================

/// Reaction is up-to-date
pub const CLEAN: u32 = 1 << 10;

/// Reaction needs to re-run
pub const DIRTY: u32 = 1 << 11;

/// Reaction is currently running
pub const REACTION_IS_UPDATING: u32 = 1 << 13;

/// Reaction has been disposed
pub const DESTROYED: u32 = 1 << 14;

// =============================================================================
// STATUS MASK (for clearing status bits)
// =============================================================================

/// Mask to clear the status bits (CLEAN, DIRTY)
pub const STATUS_MASK: u32 = !(DIRTY | CLEAN);

// =============================================================================
// LIMITS
// =============================================================================

/// Settle passes allowed before a feedback loop is reported
pub const MAX_SETTLE_ITERATIONS: u32 = 1000;
