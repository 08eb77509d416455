//! Inbound frame reordering.
//!
//! One [`ReorderContext`] per traffic class reassembles frames that arrive
//! out of order, duplicated, or via different links into a strictly
//! increasing sequence. The moving window `[head, head + window_size)`
//! bounds what is admissible; the release timeout bounds how long delivery
//! may stall on a missing frame. A sequence number skipped by timeout is
//! never retried at this layer — loss recovery belongs to the
//! retransmission layer above.

use std::time::{Duration, Instant};

use thiserror::Error;

use super::entry::FrameEntry;
use super::index::{IndexError, SequenceIndex};
use super::seq::SeqNum;
use crate::core::Tid;

/// Errors from [`ReorderContext::admit`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmitError {
    /// The sequence number lies outside the admissible window. Frames
    /// behind the head are stale retransmissions of something already
    /// delivered or skipped; frames at or past `head + window` exceed what
    /// the peer negotiated.
    #[error("sequence {seq} outside window [{head}, {head}+{window})")]
    OutOfWindow {
        /// The rejected sequence number.
        seq: SeqNum,
        /// Window head at the time of the check.
        head: SeqNum,
        /// Negotiated window size.
        window: u16,
    },

    /// The window slot for this sequence number is already occupied.
    #[error("duplicate frame for sequence {0}")]
    Duplicate(SeqNum),

    /// No active session covers this context.
    #[error("reorder context is not active")]
    Inactive,
}

/// Per-TID inbound reassembly window.
///
/// Invariants:
/// - `head` only advances forward (mod 4096), and only past sequence
///   numbers that were delivered in order or explicitly skipped by timeout
/// - `tail` is the highest sequence number ever admitted to the window
/// - entries leave through [`drain_ready`](ReorderContext::drain_ready) in
///   non-decreasing sequence order, globally across all drains
#[derive(Debug)]
pub struct ReorderContext {
    tid: Tid,
    tree: SequenceIndex,
    ready: Vec<FrameEntry>,
    head: SeqNum,
    tail: SeqNum,
    window_size: u16,
    release_timeout: Duration,
    active: bool,
}

impl ReorderContext {
    /// Create an inactive context. [`activate`](ReorderContext::activate)
    /// installs the negotiated window and opens it for admission.
    pub fn new(tid: Tid, release_timeout: Duration) -> Self {
        Self {
            tid,
            tree: SequenceIndex::new(),
            ready: Vec::new(),
            head: SeqNum::ZERO,
            tail: SeqNum::ZERO,
            window_size: 0,
            release_timeout,
            active: false,
        }
    }

    /// The traffic class this context serves.
    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// Current window head.
    pub fn head(&self) -> SeqNum {
        self.head
    }

    /// Highest sequence number ever admitted.
    pub fn tail(&self) -> SeqNum {
        self.tail
    }

    /// Negotiated window size.
    pub fn window_size(&self) -> u16 {
        self.window_size
    }

    /// Frames currently held waiting for a gap to fill.
    pub fn held(&self) -> usize {
        self.tree.len()
    }

    /// Whether the context admits frames.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Install a negotiated window and open for admission. `ssn` becomes
    /// both head and tail.
    pub fn activate(&mut self, ssn: SeqNum, window_size: u16) {
        self.head = ssn;
        self.tail = ssn;
        self.window_size = window_size;
        self.active = true;
    }

    /// Pause admission without touching held frames. Held frames still age
    /// out through [`flush_expired`](ReorderContext::flush_expired).
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Validate and buffer one inbound frame.
    pub fn admit(&mut self, entry: FrameEntry) -> Result<(), AdmitError> {
        if !self.active {
            return Err(AdmitError::Inactive);
        }
        let seq = entry.seq();
        if !seq.is_within(self.head, self.window_size) {
            return Err(AdmitError::OutOfWindow {
                seq,
                head: self.head,
                window: self.window_size,
            });
        }
        self.tree
            .insert(entry)
            .map_err(|IndexError::DuplicateKey(seq)| AdmitError::Duplicate(seq))?;
        if seq.delta(self.tail) > 0 {
            self.tail = seq;
        }
        Ok(())
    }

    /// Release the in-order run at the window head, if any. Returns the
    /// number of frames moved to the ready list.
    pub fn try_advance(&mut self) -> usize {
        let mut released = 0;
        while let Some(first) = self.tree.first() {
            if first.seq() != self.head {
                break;
            }
            if let Some(entry) = self.tree.pop_first() {
                self.ready.push(entry);
                self.head = self.head.next();
                released += 1;
            }
        }
        released
    }

    /// Timer path: while any held frame has aged past the release timeout,
    /// force the sequence-earliest frame out — advancing the head past the
    /// gap in front of it — then continue with whatever is now in order.
    /// Returns the number of frames released.
    ///
    /// Keying the check on the oldest held frame (not the sequence-earliest
    /// one) bounds every frame's delay at `release_timeout` even when a
    /// younger frame sits in front of it in sequence order.
    ///
    /// A gap skipped here is permanent: the head never moves backwards, so
    /// a late arrival of the missing frame is rejected as out-of-window.
    pub fn flush_expired(&mut self, now: Instant) -> usize {
        let mut released = 0;
        loop {
            released += self.try_advance();
            let any_expired = self
                .tree
                .iter()
                .any(|entry| entry.age(now) >= self.release_timeout);
            if !any_expired {
                break;
            }
            if let Some(entry) = self.tree.pop_first() {
                self.head = entry.seq().next();
                self.ready.push(entry);
                released += 1;
            } else {
                break;
            }
        }
        released
    }

    /// Teardown path: release every held frame immediately, in order.
    pub fn flush_all(&mut self) -> usize {
        let mut released = 0;
        while let Some(entry) = self.tree.pop_first() {
            self.head = entry.seq().next();
            self.ready.push(entry);
            released += 1;
        }
        released
    }

    /// Earliest deadline at which a held frame will be force-released.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tree
            .iter()
            .map(FrameEntry::enqueued_at)
            .min()
            .map(|enqueued| enqueued + self.release_timeout)
    }

    /// Atomically empty and return the ready list. Ownership transfers; the
    /// context retains no reference to drained entries.
    pub fn drain_ready(&mut self) -> Vec<FrameEntry> {
        std::mem::take(&mut self.ready)
    }
}
