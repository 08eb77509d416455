//! Block-acknowledgment session state machine.
//!
//! One session per (TID, peer) pair negotiates the reorder window a
//! [`ReorderContext`](crate::buffer::ReorderContext) runs with and tracks
//! its lifetime. Transitions outside the machine below fail with
//! [`SessionError::InvalidState`] — a counted protocol anomaly, never
//! fatal.
//!
//! ```text
//! Idle ──setup──▶ Init ──ack──▶ Active ──pause──▶ Suspended
//!                   │             │                  │
//!                  nack       teardown /          teardown
//!                   │         inactivity             │
//!                   ▼             ▼                  ▼
//!                   └────────▶ Teardown ◀────────────┘
//! ```

use std::time::{Duration, Instant};

use thiserror::Error;

use super::bitmap::SlotBitmap;
use super::signal::SessionRequest;
use crate::buffer::{AdmitError, SeqNum};
use crate::core::{
    DEFAULT_MAX_WINDOW, DEFAULT_RELEASE_TIMEOUT, MAX_REORDER_WINDOW, MAX_SESSION_TIMEOUT,
    MIN_SESSION_TIMEOUT, PeerId, Tid,
};

/// Errors from session operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// The operation is not permitted in the session's current state.
    #[error("operation not permitted in session state {state:?}")]
    InvalidState {
        /// State the session was in when the operation arrived.
        state: SessionState,
    },

    /// A live session already exists for this TID.
    #[error("a session is already live for tid {tid}")]
    AlreadyActive {
        /// The contested traffic class.
        tid: Tid,
    },

    /// No session exists for this TID.
    #[error("no session for tid {tid}")]
    NotFound {
        /// The traffic class looked up.
        tid: Tid,
    },
}

/// Lifecycle state of a block-acknowledgment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, nothing negotiated yet.
    Idle,
    /// Setup request recorded, waiting for the peer's answer.
    Init,
    /// Negotiated and running.
    Active,
    /// Explicitly paused; frames are not admitted but held ones drain.
    Suspended,
    /// Being dismantled; the reorder context is force-flushed.
    Teardown,
}

/// Negotiation clamps and reorder policy for new sessions.
///
/// Read once at session setup; the core never mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReorderPolicy {
    /// Ceiling applied to negotiated window sizes, and the capacity of each
    /// session's slot bitmap. Capped at [`MAX_REORDER_WINDOW`].
    pub max_window: u16,
    /// How long a frame may wait on a missing predecessor before the gap is
    /// skipped.
    pub release_timeout: Duration,
    /// Lower clamp for negotiated inactivity timeouts.
    pub min_session_timeout: Duration,
    /// Upper clamp for negotiated inactivity timeouts.
    pub max_session_timeout: Duration,
}

impl Default for ReorderPolicy {
    fn default() -> Self {
        Self {
            max_window: DEFAULT_MAX_WINDOW,
            release_timeout: DEFAULT_RELEASE_TIMEOUT,
            min_session_timeout: MIN_SESSION_TIMEOUT,
            max_session_timeout: MAX_SESSION_TIMEOUT,
        }
    }
}

impl ReorderPolicy {
    /// The effective window ceiling.
    pub fn window_ceiling(&self) -> u16 {
        self.max_window.clamp(1, MAX_REORDER_WINDOW)
    }
}

/// A block-acknowledgment session for one (TID, peer) pair.
#[derive(Debug)]
pub struct BlockAckSession {
    tid: Tid,
    peer: PeerId,
    state: SessionState,
    ssn: SeqNum,
    window_size: u16,
    /// `None` while the peer requested no inactivity teardown.
    inactivity_timeout: Option<Duration>,
    last_activity: Instant,
    slots: SlotBitmap,
}

impl BlockAckSession {
    /// Create an idle session shell for a (TID, peer) pair.
    pub fn new(tid: Tid, peer: PeerId, policy: &ReorderPolicy, now: Instant) -> Self {
        Self {
            tid,
            peer,
            state: SessionState::Idle,
            ssn: SeqNum::ZERO,
            window_size: 0,
            inactivity_timeout: None,
            last_activity: now,
            slots: SlotBitmap::new(policy.window_ceiling()),
        }
    }

    /// The traffic class.
    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// The peer on the other end.
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Negotiated starting sequence number.
    pub fn ssn(&self) -> SeqNum {
        self.ssn
    }

    /// Negotiated (clamped) window size.
    pub fn window_size(&self) -> u16 {
        self.window_size
    }

    /// Negotiated (clamped) inactivity timeout, if any.
    pub fn inactivity_timeout(&self) -> Option<Duration> {
        self.inactivity_timeout
    }

    /// Number of admitted-but-undelivered window slots.
    pub fn slots_occupied(&self) -> u32 {
        self.slots.count()
    }

    /// Record negotiated parameters: `Idle → Init`.
    ///
    /// The window is clamped to the policy ceiling; a nonzero timeout is
    /// clamped into the policy's bounds, zero disables inactivity teardown.
    pub fn setup(
        &mut self,
        req: &SessionRequest,
        policy: &ReorderPolicy,
        now: Instant,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState { state: self.state });
        }
        self.ssn = req.ssn;
        self.window_size = req.window_size.clamp(1, policy.window_ceiling());
        self.inactivity_timeout = if req.timeout.is_zero() {
            None
        } else {
            Some(
                req.timeout
                    .clamp(policy.min_session_timeout, policy.max_session_timeout),
            )
        };
        self.last_activity = now;
        self.state = SessionState::Init;
        Ok(())
    }

    /// Apply the peer's answer: `Init → Active` on a positive ack,
    /// `Init → Teardown` on a negative one. Returns the new state.
    pub fn confirm(&mut self, ack: bool, now: Instant) -> Result<SessionState, SessionError> {
        if self.state != SessionState::Init {
            return Err(SessionError::InvalidState { state: self.state });
        }
        self.state = if ack {
            self.last_activity = now;
            SessionState::Active
        } else {
            SessionState::Teardown
        };
        Ok(self.state)
    }

    /// Explicit pause: `Active → Suspended`. There is no resume; a
    /// suspended session only leaves through teardown.
    pub fn suspend(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::InvalidState { state: self.state });
        }
        self.state = SessionState::Suspended;
        Ok(())
    }

    /// Begin dismantling: `Init | Active | Suspended → Teardown`.
    pub fn begin_teardown(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Init | SessionState::Active | SessionState::Suspended => {
                self.state = SessionState::Teardown;
                self.slots.reset();
                Ok(())
            }
            state => Err(SessionError::InvalidState { state }),
        }
    }

    /// Record frame activity for inactivity accounting.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Whether an active session has outlived its inactivity timeout.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.state == SessionState::Active
            && self
                .inactivity_timeout
                .is_some_and(|timeout| now.saturating_duration_since(self.last_activity) >= timeout)
    }

    /// Window/duplicate filter for an arriving sequence number, relative to
    /// the reorder context's current head.
    ///
    /// Runs before the frame buffer is even allocated, so duplicate
    /// retransmissions cost nothing. Returns the window slot offset on
    /// success.
    pub fn filter(&self, seq: SeqNum, head: SeqNum) -> Result<u16, AdmitError> {
        if self.state != SessionState::Active {
            return Err(AdmitError::Inactive);
        }
        let offset = seq.offset_from(head);
        if offset >= self.window_size {
            return Err(AdmitError::OutOfWindow {
                seq,
                head,
                window: self.window_size,
            });
        }
        if self.slots.test(offset) {
            return Err(AdmitError::Duplicate(seq));
        }
        Ok(offset)
    }

    /// Mark a window slot as holding an admitted frame.
    pub fn mark_admitted(&mut self, offset: u16) {
        self.slots.set(offset);
    }

    /// The window head advanced by `n` slots; shift occupancy accordingly.
    pub fn window_advanced(&mut self, n: u16) {
        self.slots.advance(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> PeerId {
        PeerId::new([2, 4, 6, 8, 10, 12])
    }

    fn request(window: u16, timeout: Duration) -> SessionRequest {
        SessionRequest {
            tid: Tid::new(5).unwrap(),
            peer: peer(),
            ssn: SeqNum::new(100),
            window_size: window,
            timeout,
        }
    }

    fn session() -> BlockAckSession {
        BlockAckSession::new(
            Tid::new(5).unwrap(),
            peer(),
            &ReorderPolicy::default(),
            Instant::now(),
        )
    }

    #[test]
    fn test_full_lifecycle() {
        let now = Instant::now();
        let mut s = session();
        assert_eq!(s.state(), SessionState::Idle);

        s.setup(&request(32, Duration::from_secs(10)), &ReorderPolicy::default(), now)
            .unwrap();
        assert_eq!(s.state(), SessionState::Init);
        assert_eq!(s.ssn(), SeqNum::new(100));
        assert_eq!(s.window_size(), 32);

        assert_eq!(s.confirm(true, now).unwrap(), SessionState::Active);
        s.suspend().unwrap();
        assert_eq!(s.state(), SessionState::Suspended);
        s.begin_teardown().unwrap();
        assert_eq!(s.state(), SessionState::Teardown);
    }

    #[test]
    fn test_negative_ack_tears_down() {
        let now = Instant::now();
        let mut s = session();
        s.setup(&request(32, Duration::ZERO), &ReorderPolicy::default(), now)
            .unwrap();
        assert_eq!(s.confirm(false, now).unwrap(), SessionState::Teardown);
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let now = Instant::now();
        let mut s = session();

        // Nothing negotiated yet.
        assert!(matches!(
            s.confirm(true, now),
            Err(SessionError::InvalidState { state: SessionState::Idle })
        ));
        assert!(matches!(
            s.suspend(),
            Err(SessionError::InvalidState { state: SessionState::Idle })
        ));
        assert!(matches!(
            s.begin_teardown(),
            Err(SessionError::InvalidState { state: SessionState::Idle })
        ));

        s.setup(&request(8, Duration::ZERO), &ReorderPolicy::default(), now)
            .unwrap();
        // Double setup.
        assert!(matches!(
            s.setup(&request(8, Duration::ZERO), &ReorderPolicy::default(), now),
            Err(SessionError::InvalidState { state: SessionState::Init })
        ));
        // Suspend before activation.
        assert!(s.suspend().is_err());

        s.confirm(true, now).unwrap();
        // Double confirm.
        assert!(s.confirm(true, now).is_err());

        s.begin_teardown().unwrap();
        // Everything is invalid once dismantling started.
        assert!(s.suspend().is_err());
        assert!(s.begin_teardown().is_err());
    }

    #[test]
    fn test_negotiation_clamps() {
        let now = Instant::now();
        let policy = ReorderPolicy::default();
        let mut s = session();

        s.setup(&request(1000, Duration::from_secs(100_000)), &policy, now)
            .unwrap();
        assert_eq!(s.window_size(), policy.window_ceiling());
        assert_eq!(s.inactivity_timeout(), Some(policy.max_session_timeout));

        let mut s = session();
        s.setup(&request(0, Duration::from_millis(1)), &policy, now)
            .unwrap();
        assert_eq!(s.window_size(), 1);
        assert_eq!(s.inactivity_timeout(), Some(policy.min_session_timeout));

        let mut s = session();
        s.setup(&request(16, Duration::ZERO), &policy, now).unwrap();
        assert_eq!(s.inactivity_timeout(), None);
    }

    #[test]
    fn test_inactivity_expiry() {
        let start = Instant::now();
        let mut s = session();
        s.setup(&request(16, Duration::from_secs(5)), &ReorderPolicy::default(), start)
            .unwrap();
        s.confirm(true, start).unwrap();

        // Clamped up to the policy minimum would leave 5s as-is.
        assert!(!s.is_expired(start + Duration::from_secs(4)));
        assert!(s.is_expired(start + Duration::from_secs(5)));

        // Activity pushes expiry out.
        s.touch(start + Duration::from_secs(4));
        assert!(!s.is_expired(start + Duration::from_secs(8)));
        assert!(s.is_expired(start + Duration::from_secs(9)));
    }

    #[test]
    fn test_filter_window_and_duplicates() {
        let now = Instant::now();
        let mut s = session();
        s.setup(&request(16, Duration::ZERO), &ReorderPolicy::default(), now)
            .unwrap();

        let head = SeqNum::new(100);
        // Not active yet.
        assert_eq!(s.filter(SeqNum::new(100), head), Err(AdmitError::Inactive));

        s.confirm(true, now).unwrap();
        assert_eq!(s.filter(SeqNum::new(100), head), Ok(0));
        assert_eq!(s.filter(SeqNum::new(115), head), Ok(15));
        assert!(matches!(
            s.filter(SeqNum::new(116), head),
            Err(AdmitError::OutOfWindow { .. })
        ));
        assert!(matches!(
            s.filter(SeqNum::new(99), head),
            Err(AdmitError::OutOfWindow { .. })
        ));

        s.mark_admitted(5);
        assert_eq!(
            s.filter(SeqNum::new(105), head),
            Err(AdmitError::Duplicate(SeqNum::new(105)))
        );

        // Head advances past the marked slot; the same sequence number is
        // now out of window rather than duplicate.
        s.window_advanced(6);
        assert!(matches!(
            s.filter(SeqNum::new(105), SeqNum::new(106)),
            Err(AdmitError::OutOfWindow { .. })
        ));
        assert_eq!(s.slots_occupied(), 0);
    }
}
