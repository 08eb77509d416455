//! Engine counters.
//!
//! Every rejection path in the engine has a defined, counted outcome; these
//! are the counts. They are plain relaxed atomics — cheap enough to bump on
//! every frame — exposed to callers as a [`StatsSnapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by the engine.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub(crate) submitted: AtomicU64,
    pub(crate) batches: AtomicU64,
    pub(crate) transmitted: AtomicU64,
    pub(crate) transmit_failures: AtomicU64,
    pub(crate) capacity_rejected: AtomicU64,
    pub(crate) admitted: AtomicU64,
    pub(crate) delivered: AtomicU64,
    pub(crate) out_of_window: AtomicU64,
    pub(crate) duplicates: AtomicU64,
    pub(crate) invalid_state: AtomicU64,
    pub(crate) alloc_failures: AtomicU64,
    pub(crate) timer_releases: AtomicU64,
    pub(crate) sessions_established: AtomicU64,
    pub(crate) sessions_expired: AtomicU64,
    pub(crate) sessions_torn_down: AtomicU64,
}

impl EngineStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Capture a consistent-enough snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            transmitted: self.transmitted.load(Ordering::Relaxed),
            transmit_failures: self.transmit_failures.load(Ordering::Relaxed),
            capacity_rejected: self.capacity_rejected.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            out_of_window: self.out_of_window.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            invalid_state: self.invalid_state.load(Ordering::Relaxed),
            alloc_failures: self.alloc_failures.load(Ordering::Relaxed),
            timer_releases: self.timer_releases.load(Ordering::Relaxed),
            sessions_established: self.sessions_established.load(Ordering::Relaxed),
            sessions_expired: self.sessions_expired.load(Ordering::Relaxed),
            sessions_torn_down: self.sessions_torn_down.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Outbound frames accepted into aggregation.
    pub submitted: u64,
    /// Batches handed to the transmit path.
    pub batches: u64,
    /// Frames handed to the transmit path.
    pub transmitted: u64,
    /// Frames the transmit collaborator reported as failed.
    pub transmit_failures: u64,
    /// Outbound submissions rejected for capacity.
    pub capacity_rejected: u64,
    /// Inbound frames admitted to a reorder window.
    pub admitted: u64,
    /// Frames delivered in order to the upper layer.
    pub delivered: u64,
    /// Inbound frames rejected as outside the window (stale or too far
    /// ahead).
    pub out_of_window: u64,
    /// Inbound frames rejected as duplicates.
    pub duplicates: u64,
    /// Operations attempted against a session in the wrong state.
    pub invalid_state: u64,
    /// Frames dropped because a buffer could not be allocated.
    pub alloc_failures: u64,
    /// Frames released by the flush timer (forced gap skips plus the
    /// in-order runs they unblock) rather than by in-order arrival.
    pub timer_releases: u64,
    /// Sessions that reached `Active`.
    pub sessions_established: u64,
    /// Sessions torn down by inactivity expiry.
    pub sessions_expired: u64,
    /// Sessions torn down for any reason.
    pub sessions_torn_down: u64,
}
