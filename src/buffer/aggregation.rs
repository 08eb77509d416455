//! Outbound frame aggregation.
//!
//! One [`AggregationContext`] per traffic class batches outbound frames
//! until a frame-count, byte-size, or time threshold is hit, then releases
//! the whole batch in ascending sequence order. Nothing is ever dropped
//! silently: a submit that would breach a limit is rejected back to the
//! caller, and every accepted frame eventually leaves through
//! [`drain_ready`](AggregationContext::drain_ready) or
//! [`deactivate`](AggregationContext::deactivate).

use std::time::{Duration, Instant};

use thiserror::Error;

use super::entry::FrameEntry;
use super::index::{IndexError, SequenceIndex};
use crate::core::{
    DEFAULT_AGG_FLUSH_TIMEOUT, DEFAULT_AGG_MAX_BYTES, DEFAULT_AGG_MAX_FRAMES, Tid,
};

/// Errors from [`AggregationContext::submit`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// Accepting the frame would exceed the frame-count or byte limit.
    /// Recoverable: the caller may retry after a drain, or drop with count.
    #[error("aggregate capacity exceeded ({pending_frames} frames, {pending_bytes} bytes pending)")]
    CapacityExceeded {
        /// Frames currently pending.
        pending_frames: usize,
        /// Payload bytes currently pending.
        pending_bytes: usize,
    },

    /// An outbound frame with this sequence number is already pending.
    #[error("duplicate outbound sequence number {0}")]
    Duplicate(crate::buffer::SeqNum),

    /// The context has been deactivated (engine stopping).
    #[error("aggregation context is not active")]
    Inactive,
}

/// Batching limits for one aggregation context.
///
/// `max_frames` must stay well below half the sequence space (2048) so the
/// pending set's wraparound ordering stays unambiguous; the defaults are two
/// orders of magnitude below that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggLimits {
    /// Maximum frames per aggregate.
    pub max_frames: usize,
    /// Maximum total payload bytes per aggregate.
    pub max_bytes: usize,
    /// Maximum time a frame may sit pending before a flush is forced.
    pub flush_timeout: Duration,
}

impl Default for AggLimits {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_AGG_MAX_FRAMES,
            max_bytes: DEFAULT_AGG_MAX_BYTES,
            flush_timeout: DEFAULT_AGG_FLUSH_TIMEOUT,
        }
    }
}

/// What a successful submit did, so the caller can arm timers or dispatch
/// a completed batch without re-locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// This frame is the only pending one; a flush timer should be running.
    pub first_pending: bool,
    /// A threshold was reached exactly; the batch is complete and should be
    /// promoted and transmitted now.
    pub batch_ready: bool,
}

/// Per-TID outbound batcher.
#[derive(Debug)]
pub struct AggregationContext {
    tid: Tid,
    pending: SequenceIndex,
    ready: Vec<FrameEntry>,
    limits: AggLimits,
    pending_bytes: usize,
    active: bool,
}

impl AggregationContext {
    /// Create an active context with the given limits.
    pub fn new(tid: Tid, limits: AggLimits) -> Self {
        Self {
            tid,
            pending: SequenceIndex::new(),
            ready: Vec::new(),
            limits,
            pending_bytes: 0,
            active: true,
        }
    }

    /// The traffic class this context serves.
    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// The configured limits.
    pub fn limits(&self) -> &AggLimits {
        &self.limits
    }

    /// Frames currently pending.
    pub fn pending_frames(&self) -> usize {
        self.pending.len()
    }

    /// Payload bytes currently pending.
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Frames promoted and awaiting drain.
    pub fn ready_frames(&self) -> usize {
        self.ready.len()
    }

    /// Whether the context accepts submissions.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Accept one outbound frame into the pending set.
    ///
    /// Fails if the frame-count or byte limit would be breached; the limits
    /// hold at all times, violated inserts are rejected rather than
    /// truncated.
    pub fn submit(&mut self, entry: FrameEntry) -> Result<SubmitOutcome, SubmitError> {
        if !self.active {
            return Err(SubmitError::Inactive);
        }
        if self.pending.len() >= self.limits.max_frames
            || self.pending_bytes + entry.len() > self.limits.max_bytes
        {
            return Err(SubmitError::CapacityExceeded {
                pending_frames: self.pending.len(),
                pending_bytes: self.pending_bytes,
            });
        }

        let len = entry.len();
        self.pending
            .insert(entry)
            .map_err(|IndexError::DuplicateKey(seq)| SubmitError::Duplicate(seq))?;
        self.pending_bytes += len;

        Ok(SubmitOutcome {
            first_pending: self.pending.len() == 1,
            batch_ready: self.pending.len() == self.limits.max_frames
                || self.pending_bytes == self.limits.max_bytes,
        })
    }

    /// Promote every pending frame older than the flush timeout to the ready
    /// list, in ascending sequence order. Returns the number promoted.
    pub fn flush_expired(&mut self, now: Instant) -> usize {
        let mut promoted = 0;
        while let Some(first) = self.pending.first() {
            if first.age(now) < self.limits.flush_timeout {
                break;
            }
            if let Some(entry) = self.pending.pop_first() {
                self.pending_bytes -= entry.len();
                self.ready.push(entry);
                promoted += 1;
            }
        }
        promoted
    }

    /// Promote every pending frame to the ready list, in ascending sequence
    /// order. Used when a submit completes a batch and on shutdown.
    pub fn promote_all(&mut self) -> usize {
        let promoted = self.pending.len();
        self.ready.extend(self.pending.drain());
        self.pending_bytes = 0;
        promoted
    }

    /// Atomically empty and return the ready list.
    ///
    /// The sole way frames leave the context; ownership transfers to the
    /// caller and the context retains no reference.
    pub fn drain_ready(&mut self) -> Vec<FrameEntry> {
        std::mem::take(&mut self.ready)
    }

    /// Stop accepting submissions and surrender every held frame (pending
    /// and ready, in order) so the caller can account for them.
    pub fn deactivate(&mut self) -> Vec<FrameEntry> {
        self.active = false;
        self.promote_all();
        self.drain_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SeqNum;
    use crate::core::LinkId;

    fn entry_at(seq: u16, len: usize, at: Instant) -> FrameEntry {
        FrameEntry::new(
            vec![0u8; len],
            SeqNum::new(seq),
            Tid::new(1).unwrap(),
            LinkId::new(0),
            at,
        )
    }

    fn entry(seq: u16, len: usize) -> FrameEntry {
        entry_at(seq, len, Instant::now())
    }

    fn ctx(max_frames: usize, max_bytes: usize) -> AggregationContext {
        AggregationContext::new(
            Tid::new(1).unwrap(),
            AggLimits {
                max_frames,
                max_bytes,
                flush_timeout: Duration::from_millis(10),
            },
        )
    }

    #[test]
    fn test_submit_reports_first_pending() {
        let mut agg = ctx(8, 1024);

        let outcome = agg.submit(entry(0, 10)).unwrap();
        assert!(outcome.first_pending);
        assert!(!outcome.batch_ready);

        let outcome = agg.submit(entry(1, 10)).unwrap();
        assert!(!outcome.first_pending);
    }

    #[test]
    fn test_frame_limit_rejects_then_recovers() {
        let mut agg = ctx(3, 1024);

        for seq in 0..3 {
            agg.submit(entry(seq, 10)).unwrap();
        }
        // Fourth submit must fail, and the pending set must be untouched.
        let err = agg.submit(entry(3, 10)).unwrap_err();
        assert!(matches!(err, SubmitError::CapacityExceeded { pending_frames: 3, .. }));
        assert_eq!(agg.pending_frames(), 3);

        // After a promote + drain the context accepts again.
        agg.promote_all();
        let drained = agg.drain_ready();
        assert_eq!(drained.len(), 3);
        agg.submit(entry(3, 10)).unwrap();
    }

    #[test]
    fn test_byte_limit_holds() {
        let mut agg = ctx(16, 100);

        agg.submit(entry(0, 60)).unwrap();
        let err = agg.submit(entry(1, 50)).unwrap_err();
        assert!(matches!(err, SubmitError::CapacityExceeded { pending_bytes: 60, .. }));
        assert_eq!(agg.pending_bytes(), 60);

        // A frame that exactly fills the byte limit is accepted and
        // completes the batch.
        let outcome = agg.submit(entry(1, 40)).unwrap();
        assert!(outcome.batch_ready);
    }

    #[test]
    fn test_batch_ready_at_frame_limit() {
        let mut agg = ctx(2, 1024);

        assert!(!agg.submit(entry(0, 1)).unwrap().batch_ready);
        assert!(agg.submit(entry(1, 1)).unwrap().batch_ready);
    }

    #[test]
    fn test_flush_expired_promotes_in_seq_order() {
        let start = Instant::now();
        let mut agg = ctx(8, 1024);

        agg.submit(entry_at(4095, 1, start)).unwrap();
        agg.submit(entry_at(1, 1, start)).unwrap();
        agg.submit(entry_at(0, 1, start + Duration::from_millis(5))).unwrap();

        // At +10ms only the two oldest have expired; they come out in
        // wraparound sequence order.
        let promoted = agg.flush_expired(start + Duration::from_millis(10));
        assert_eq!(promoted, 1);
        // 4095 expired; 0 (enqueued later but earlier in sequence than 1)
        // blocks the ordered walk until it expires too.
        let order: Vec<u16> = agg.drain_ready().iter().map(|e| e.seq().value()).collect();
        assert_eq!(order, vec![4095]);

        let promoted = agg.flush_expired(start + Duration::from_millis(20));
        assert_eq!(promoted, 2);
        let order: Vec<u16> = agg.drain_ready().iter().map(|e| e.seq().value()).collect();
        assert_eq!(order, vec![0, 1]);
        assert_eq!(agg.pending_frames(), 0);
        assert_eq!(agg.pending_bytes(), 0);
    }

    #[test]
    fn test_duplicate_seq_rejected() {
        let mut agg = ctx(8, 1024);
        agg.submit(entry(5, 1)).unwrap();
        let err = agg.submit(entry(5, 1)).unwrap_err();
        assert_eq!(err, SubmitError::Duplicate(SeqNum::new(5)));
    }

    #[test]
    fn test_deactivate_surrenders_everything() {
        let mut agg = ctx(8, 1024);
        agg.submit(entry(2, 1)).unwrap();
        agg.submit(entry(1, 1)).unwrap();
        agg.promote_all();
        agg.submit(entry(3, 1)).unwrap();

        let held = agg.deactivate();
        let order: Vec<u16> = held.iter().map(|e| e.seq().value()).collect();
        assert_eq!(order, vec![1, 2, 3]);

        assert_eq!(agg.submit(entry(4, 1)).unwrap_err(), SubmitError::Inactive);
    }
}
