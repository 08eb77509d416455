//! # WEFT MAC Engine
//!
//! **W**indowed **E**xchange of **F**rames over **T**andem links
//!
//! WEFT is the aggregation and reordering core of a multi-link wireless MAC
//! stack. For each of the eight traffic classes (TIDs) it provides:
//!
//! - **Aggregation**: outbound frames accumulate into size/time-bounded
//!   batches before transmission, amortizing per-transmission overhead
//! - **Reordering**: inbound frames that arrive out of order, duplicated, or
//!   via different physical links are reassembled into a strictly increasing
//!   sequence before delivery
//! - **Bounded latency**: timer-driven forced flushes cap worst-case
//!   reordering delay even when a gap never fills
//! - **Session negotiation**: per-peer block-acknowledgment sessions carry
//!   the reorder window size and lifetime through a small state machine
//!
//! Sequence numbers live in a 12-bit space and wrap modulo 4096; all window
//! arithmetic in this crate is wraparound-aware.
//!
//! ## Feature Flags
//!
//! - `timers` (default): tokio-backed per-TID flush timers
//!
//! ## Modules
//!
//! - [`core`]: shared types, constants, and collaborator traits
//! - [`buffer`]: sequence arithmetic, the ordered index, and the per-TID
//!   aggregation/reorder contexts
//! - [`session`]: block-acknowledgment session state machine and signaling
//! - [`engine`]: the per-TID locked façade that ties everything together
//!
//! ## Example Usage
//!
//! ```rust
//! use weft_mac::prelude::*;
//!
//! struct NullRadio;
//!
//! impl FrameTransmitter for NullRadio {
//!     fn transmit(&self, _frame: FrameEntry) -> Result<(), TransmitError> {
//!         Ok(())
//!     }
//! }
//!
//! impl FrameDeliverer for NullRadio {
//!     fn deliver(&self, _frame: FrameEntry) {}
//! }
//!
//! let engine = Engine::new(EngineConfig::default(), NullRadio, NullRadio);
//! let tid = Tid::new(0).unwrap();
//!
//! // Outbound: frames batch until a threshold or the flush timer fires.
//! engine.submit_outbound(tid, LinkId::new(0), b"frame".to_vec()).unwrap();
//! engine.flush_outbound(tid).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Shared types and collaborator traits (always included)
pub mod core;

// Windowed buffers: sequence arithmetic, ordered index, contexts
pub mod buffer;

// Block-acknowledgment sessions
pub mod session;

// Engine façade and timer driver
pub mod engine;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;

    pub use crate::buffer::{
        AdmitError, AggLimits, AggregationContext, FrameEntry, ReorderContext, SeqNum,
        SequenceIndex, SubmitError, SubmitOutcome,
    };

    pub use crate::session::{
        BlockAckSession, ReorderPolicy, SessionError, SessionRequest, SessionSignal, SessionState,
        SlotBitmap,
    };

    pub use crate::engine::{Engine, EngineConfig, EngineError, ManualTimers, StatsSnapshot};

    #[cfg(feature = "timers")]
    pub use crate::engine::TokioTimerService;
}

// Re-export commonly used items at crate root
pub use crate::buffer::{FrameEntry, SeqNum};
pub use crate::core::{FrameDeliverer, FrameTransmitter, LinkId, PeerId, Tid, TransmitError};
pub use crate::engine::{Engine, EngineConfig, EngineError};
pub use crate::session::{SessionRequest, SessionSignal, SessionState};
