//! Protocol constants for the aggregation and reordering core.

use std::time::Duration;

// =============================================================================
// SEQUENCE NUMBER SPACE
// =============================================================================

/// Size of the sequence number space (12-bit counter).
pub const SEQ_SPACE: u16 = 4096;

/// Mask that reduces a raw counter into the sequence space.
pub const SEQ_MASK: u16 = 0x0fff;

/// Half the sequence space. Wraparound ordering is only meaningful for
/// sequence numbers less than this far apart.
pub const SEQ_HALF_SPACE: u16 = 2048;

// =============================================================================
// TRAFFIC CLASSES
// =============================================================================

/// Number of traffic classes (TIDs).
pub const NUM_TIDS: usize = 8;

// =============================================================================
// AGGREGATION DEFAULTS
// =============================================================================

/// Default maximum frames per outbound aggregate.
pub const DEFAULT_AGG_MAX_FRAMES: usize = 64;

/// Default maximum payload bytes per outbound aggregate.
pub const DEFAULT_AGG_MAX_BYTES: usize = 65_535;

/// Default time an outbound frame may sit pending before a flush is forced.
pub const DEFAULT_AGG_FLUSH_TIMEOUT: Duration = Duration::from_millis(10);

// =============================================================================
// REORDERING DEFAULTS
// =============================================================================

/// Hard ceiling on a negotiated reorder window. Peers never have more frames
/// in flight than this, which keeps live sequence numbers well inside half
/// the sequence space.
pub const MAX_REORDER_WINDOW: u16 = 256;

/// Default ceiling applied to negotiated reorder windows.
pub const DEFAULT_MAX_WINDOW: u16 = 64;

/// Default time a frame may wait on a missing predecessor before the gap is
/// skipped and everything behind it is released.
pub const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_millis(100);

// =============================================================================
// SESSION LIFETIME
// =============================================================================

/// Minimum accepted session inactivity timeout.
pub const MIN_SESSION_TIMEOUT: Duration = Duration::from_secs(1);

/// Maximum accepted session inactivity timeout.
pub const MAX_SESSION_TIMEOUT: Duration = Duration::from_secs(120);

// =============================================================================
// TIMER SERVICE
// =============================================================================

/// Default period of the per-TID flush tick.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(5);
