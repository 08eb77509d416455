//! Collaborator traits at the engine boundary.
//!
//! The engine never touches the radio, the upper layer, or the clock
//! directly. It hands drained frames to a [`FrameTransmitter`], delivers
//! reassembled frames to a [`FrameDeliverer`], and receives flush ticks from
//! a [`TimerService`]. All three are supplied by the embedding stack.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::buffer::FrameEntry;
use crate::core::Tid;

/// Errors a transmit collaborator may report back.
///
/// A failed transmit is counted and the frame is considered consumed; loss
/// recovery belongs to the retransmission layer above this core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransmitError {
    /// The physical link is not currently usable.
    #[error("link is down")]
    LinkDown,

    /// The transmit path cannot accept more frames right now.
    #[error("transmit path backpressure")]
    Backpressure,

    /// Any other transmit-side failure.
    #[error("transmit failed: {0}")]
    Other(String),
}

/// Outbound path: consumes aggregated frames.
///
/// Called once per entry drained from an aggregation context, in ascending
/// sequence order, never while an engine lock is held.
pub trait FrameTransmitter: Send + Sync {
    /// Hand one frame to the transmission path. Ownership transfers.
    fn transmit(&self, frame: FrameEntry) -> Result<(), TransmitError>;
}

/// Inbound path: consumes reassembled frames.
///
/// Called once per entry drained from a reorder context. Successive calls
/// for one TID are always non-decreasing in sequence number.
pub trait FrameDeliverer: Send + Sync {
    /// Deliver one in-order frame to the upper layer. Ownership transfers.
    fn deliver(&self, frame: FrameEntry);
}

/// Receiver of per-TID flush ticks.
///
/// Implemented by the engine; the timer service invokes it at most once
/// concurrently per TID.
pub trait TickHandler: Send + Sync + 'static {
    /// A flush tick for `tid` at time `now`.
    fn on_tick(&self, tid: Tid, now: Instant);
}

/// Scheduling abstraction for the recurring per-TID flush callbacks.
///
/// Implementations guarantee:
/// - at most one [`TickHandler::on_tick`] invocation runs per TID at a time
/// - after [`shutdown`](TimerService::shutdown) resolves, no further tick
///   runs and none is still in flight (cancel-and-join, not fire-and-forget)
pub trait TimerService: Send + Sync + 'static {
    /// Begin recurring ticks for every TID, delivered to `handler`.
    ///
    /// Starting an already-started service is a no-op.
    fn start(&self, handler: Arc<dyn TickHandler>);

    /// Cancel all ticks and wait for in-flight callbacks to finish.
    fn shutdown(&self) -> impl Future<Output = ()> + Send;
}
