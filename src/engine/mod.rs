//! The engine façade.
//!
//! One [`Engine`] instance owns eight independent lanes — an aggregation
//! context, a reorder context, and a session slot per traffic class — and
//! is the sole public entry point for frames, session signaling, and timer
//! ticks.
//!
//! # Architecture
//!
//! ```text
//!              submit_outbound            submit_inbound
//!                    │                          │
//! ┌──────────────────▼──────────────────────────▼──────────────────┐
//! │ Engine                        lane lock (per TID)              │
//! │  ┌────────────────────┐        ┌─────────────────────────────┐ │
//! │  │ AggregationContext │        │ BlockAckSession             │ │
//! │  │  pending → ready   │        │   window filter / lifetime  │ │
//! │  └─────────┬──────────┘        │ ReorderContext              │ │
//! │            │ drain             │   tree → ready              │ │
//! └────────────┼───────────────────┴───────────┬─────────────────┘ │
//!              ▼                               ▼ drain (in order)
//!       FrameTransmitter                 FrameDeliverer
//! ```
//!
//! Flush ticks arrive per TID from a
//! [`TimerService`](crate::core::TimerService) and run under the same lock
//! the producer paths use, which is what makes the timer/producer race
//! ordinary mutual exclusion instead of a lost-wakeup hazard.

#[allow(clippy::module_inception)]
mod engine;
mod lane;
mod stats;
mod timer;

pub use engine::*;
pub use stats::*;
pub use timer::*;
