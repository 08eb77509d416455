//! Per-TID engine lane.
//!
//! A lane is the single mutual-exclusion domain for one traffic class: its
//! aggregation context, reorder context, session slot, and outbound
//! sequence counter all live behind one lock. Lanes never share state, so
//! cross-TID operations never contend.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::buffer::{AggregationContext, ReorderContext, SeqNum};
use crate::core::Tid;
use crate::engine::EngineConfig;
use crate::session::BlockAckSession;

/// Lock a mutex, taking the data even if a panicking holder poisoned it.
/// The structures behind these locks stay consistent across panics because
/// every mutation completes before collaborator calls are made.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything one TID owns, guarded by [`Lane::state`].
#[derive(Debug)]
pub(crate) struct LaneState {
    pub agg: AggregationContext,
    pub reorder: ReorderContext,
    pub session: Option<BlockAckSession>,
    /// Next outbound sequence number; bumped only when a submit succeeds.
    pub next_seq: SeqNum,
}

/// One traffic class worth of engine state.
#[derive(Debug)]
pub(crate) struct Lane {
    /// The structural lock: submit, admit, advance, flush, and drain for
    /// this TID all run under it. Never held across a collaborator call.
    pub state: Mutex<LaneState>,
    /// Serializes transmit dispatch so concurrently drained batches cannot
    /// leave out of order.
    pub tx_dispatch: Mutex<()>,
    /// Serializes delivery dispatch, preserving the global in-order
    /// guarantee across producer and timer threads.
    pub rx_dispatch: Mutex<()>,
}

impl Lane {
    pub(crate) fn new(tid: Tid, config: &EngineConfig) -> Self {
        Self {
            state: Mutex::new(LaneState {
                agg: AggregationContext::new(tid, config.agg),
                reorder: ReorderContext::new(tid, config.reorder.release_timeout),
                session: None,
                next_seq: SeqNum::ZERO,
            }),
            tx_dispatch: Mutex::new(()),
            rx_dispatch: Mutex::new(()),
        }
    }
}
