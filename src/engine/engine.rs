//! The engine façade.
//!
//! [`Engine`] owns one aggregation context and one reorder context per
//! traffic class, dispatches timer ticks, and is the only public entry
//! point for frames and session signaling. It is an explicitly owned
//! instance — no global state — so independent engines can coexist in one
//! process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::buffer::{
    AdmitError, AggLimits, AllocError, FrameEntry, SeqNum, SubmitError,
};
use crate::core::{
    DEFAULT_TICK_PERIOD, FrameDeliverer, FrameTransmitter, InvalidTid, LinkId, NUM_TIDS,
    TickHandler, Tid, TimerService,
};
use crate::engine::lane::{Lane, LaneState, lock};
use crate::engine::stats::{EngineStats, StatsSnapshot};
use crate::engine::timer::ManualTimers;
use crate::session::{
    BlockAckSession, ReorderPolicy, SessionError, SessionRequest, SessionSignal, SessionState,
};

/// Errors surfaced by engine operations.
///
/// None of these are fatal: the engine keeps running for every other TID
/// and for future frames. Every rejection is also counted (see
/// [`Engine::stats`]).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The traffic class value was out of range.
    #[error("invalid traffic class: {0}")]
    Tid(#[from] InvalidTid),

    /// The engine has been stopped.
    #[error("engine is stopped")]
    Stopped,

    /// Outbound submission rejected.
    #[error("submit rejected: {0}")]
    Submit(#[from] SubmitError),

    /// Inbound admission rejected.
    #[error("admit rejected: {0}")]
    Admit(#[from] AdmitError),

    /// Session operation rejected.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// A frame buffer could not be allocated.
    #[error("allocation failure: {0}")]
    Alloc(#[from] AllocError),
}

/// Engine-wide configuration, read once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Outbound batching limits, applied per TID.
    pub agg: AggLimits,
    /// Reorder window policy and session negotiation clamps.
    pub reorder: ReorderPolicy,
    /// Period of the recurring per-TID flush tick.
    pub tick_period: std::time::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Configuration with all defaults.
    pub fn new() -> Self {
        Self {
            agg: AggLimits::default(),
            reorder: ReorderPolicy::default(),
            tick_period: DEFAULT_TICK_PERIOD,
        }
    }
}

/// The aggregation and reordering engine.
///
/// Generic over the transmit collaborator `T`, the delivery collaborator
/// `D`, and the timer service `S`. Lifecycle is `new → start → stop`;
/// dropping a never-started engine is fine, and `stop` is cancel-and-join:
/// when it returns, no timer callback is running or will run.
pub struct Engine<T, D, S = ManualTimers> {
    config: EngineConfig,
    lanes: [Lane; NUM_TIDS],
    transmitter: T,
    deliverer: D,
    timers: S,
    stats: EngineStats,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl<T, D> Engine<T, D, ManualTimers>
where
    T: FrameTransmitter,
    D: FrameDeliverer,
{
    /// Create an engine without a timer service; flush ticks are driven
    /// manually through [`TickHandler::on_tick`]. Used by embeddings with
    /// their own scheduler, and by tests.
    pub fn new(config: EngineConfig, transmitter: T, deliverer: D) -> Self {
        Self::with_timers(config, transmitter, deliverer, ManualTimers)
    }
}

impl<T, D, S> Engine<T, D, S>
where
    T: FrameTransmitter,
    D: FrameDeliverer,
    S: TimerService,
{
    /// Create an engine that will drive flushes through `timers` once
    /// started.
    pub fn with_timers(config: EngineConfig, transmitter: T, deliverer: D, timers: S) -> Self {
        Self {
            config,
            lanes: std::array::from_fn(|i| Lane::new(Tid::from_index(i), &config)),
            transmitter,
            deliverer,
            timers,
            stats: EngineStats::default(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// The configuration this engine runs with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Snapshot of all engine counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    // -------------------------------------------------------------------------
    // Outbound path
    // -------------------------------------------------------------------------

    /// Submit one outbound frame for aggregation on `tid`.
    ///
    /// Assigns the next outbound sequence number and returns it. If the
    /// submission completes a batch (frame-count or byte threshold), the
    /// batch is promoted and handed to the transmit collaborator before
    /// this call returns.
    pub fn submit_outbound(
        &self,
        tid: Tid,
        link: LinkId,
        payload: Vec<u8>,
    ) -> Result<SeqNum, EngineError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(EngineError::Stopped);
        }
        let lane = &self.lanes[tid.index()];

        let (seq, batch_ready) = {
            let mut state = lock(&lane.state);
            let seq = state.next_seq;
            let entry = FrameEntry::new(payload, seq, tid, link, Instant::now());
            match state.agg.submit(entry) {
                Ok(outcome) => {
                    state.next_seq = seq.next();
                    EngineStats::bump(&self.stats.submitted);
                    (seq, outcome.batch_ready)
                }
                Err(err) => {
                    if matches!(err, SubmitError::CapacityExceeded { .. }) {
                        EngineStats::bump(&self.stats.capacity_rejected);
                    }
                    return Err(err.into());
                }
            }
        };

        if batch_ready {
            trace!(tid = %tid, "aggregate threshold reached, dispatching batch");
            self.flush_outbound(tid)?;
        }
        Ok(seq)
    }

    /// Promote everything pending on `tid` and hand the batch to the
    /// transmit collaborator, in ascending sequence order. Returns the
    /// number of frames transmitted.
    pub fn flush_outbound(&self, tid: Tid) -> Result<usize, EngineError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(EngineError::Stopped);
        }
        let lane = &self.lanes[tid.index()];

        let _tx = lock(&lane.tx_dispatch);
        let batch = {
            let mut state = lock(&lane.state);
            state.agg.promote_all();
            state.agg.drain_ready()
        };
        Ok(self.transmit_batch(batch))
    }

    // -------------------------------------------------------------------------
    // Inbound path
    // -------------------------------------------------------------------------

    /// Submit one inbound frame for reordering on `tid`.
    ///
    /// The frame is validated against the TID's session window, buffered,
    /// and any newly in-order run is handed to the delivery collaborator
    /// before this call returns. Rejections are counted and reported; none
    /// of them disturb the session.
    pub fn submit_inbound(
        &self,
        tid: Tid,
        link: LinkId,
        seq: SeqNum,
        payload: &[u8],
    ) -> Result<(), EngineError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(EngineError::Stopped);
        }
        let now = Instant::now();
        let lane = &self.lanes[tid.index()];

        let _rx = lock(&lane.rx_dispatch);
        let frames = {
            let mut state = lock(&lane.state);
            let LaneState {
                session, reorder, ..
            } = &mut *state;

            let Some(session) = session.as_mut() else {
                EngineStats::bump(&self.stats.invalid_state);
                warn!(tid = %tid, %seq, "inbound frame without a session");
                return Err(SessionError::NotFound { tid }.into());
            };

            let head = reorder.head();
            let offset = match session.filter(seq, head) {
                Ok(offset) => offset,
                Err(err) => {
                    self.count_admit_error(tid, seq, &err);
                    return Err(err.into());
                }
            };

            let entry = match FrameEntry::copy_from(payload, seq, tid, link, now) {
                Ok(entry) => entry,
                Err(err) => {
                    EngineStats::bump(&self.stats.alloc_failures);
                    return Err(err.into());
                }
            };

            if let Err(err) = reorder.admit(entry) {
                self.count_admit_error(tid, seq, &err);
                return Err(err.into());
            }
            session.mark_admitted(offset);
            session.touch(now);
            EngineStats::bump(&self.stats.admitted);

            reorder.try_advance();
            session.window_advanced(reorder.head().offset_from(head));
            reorder.drain_ready()
        };

        self.deliver_frames(frames);
        Ok(())
    }

    /// Hand any frames already promoted to the ready list on `tid` to the
    /// delivery collaborator. Returns the number delivered.
    ///
    /// Normally the inbound submit and timer paths dispatch eagerly and
    /// this finds nothing; it exists so embeddings can drain explicitly.
    pub fn flush_inbound(&self, tid: Tid) -> usize {
        let lane = &self.lanes[tid.index()];
        let _rx = lock(&lane.rx_dispatch);
        let frames = {
            let mut state = lock(&lane.state);
            state.reorder.drain_ready()
        };
        self.deliver_frames(frames)
    }

    // -------------------------------------------------------------------------
    // Session signaling
    // -------------------------------------------------------------------------

    /// Dispatch one signaling record to the matching session operation.
    pub fn handle_signal(&self, signal: SessionSignal) -> Result<(), EngineError> {
        match signal {
            SessionSignal::Setup(req) => self.session_setup(&req),
            SessionSignal::SetupAck { tid, ack, .. } => {
                self.session_confirm(tid, ack).map(|_| ())
            }
            SessionSignal::Teardown { tid, .. } => self.session_teardown(tid),
        }
    }

    /// Create a session for `req.tid` and record the negotiated (clamped)
    /// parameters. Fails if a session is already live for that TID.
    pub fn session_setup(&self, req: &SessionRequest) -> Result<(), EngineError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(EngineError::Stopped);
        }
        let now = Instant::now();
        let lane = &self.lanes[req.tid.index()];
        let mut state = lock(&lane.state);

        if state.session.is_some() {
            EngineStats::bump(&self.stats.invalid_state);
            warn!(tid = %req.tid, peer = %req.peer, "setup request while a session is live");
            return Err(SessionError::AlreadyActive { tid: req.tid }.into());
        }

        let mut session = BlockAckSession::new(req.tid, req.peer, &self.config.reorder, now);
        session.setup(req, &self.config.reorder, now)?;
        debug!(
            tid = %req.tid,
            peer = %req.peer,
            ssn = %session.ssn(),
            window = session.window_size(),
            "session negotiated, awaiting ack"
        );
        state.session = Some(session);
        Ok(())
    }

    /// Apply the peer's setup answer. A positive ack opens the reorder
    /// window at the negotiated SSN; a negative one discards the session.
    pub fn session_confirm(&self, tid: Tid, ack: bool) -> Result<SessionState, EngineError> {
        let now = Instant::now();
        let lane = &self.lanes[tid.index()];
        let mut state = lock(&lane.state);
        let LaneState {
            session, reorder, ..
        } = &mut *state;

        let Some(live) = session.as_mut() else {
            EngineStats::bump(&self.stats.invalid_state);
            return Err(SessionError::NotFound { tid }.into());
        };

        let new_state = live.confirm(ack, now).inspect_err(|_| {
            EngineStats::bump(&self.stats.invalid_state);
        })?;

        match new_state {
            SessionState::Active => {
                reorder.activate(live.ssn(), live.window_size());
                EngineStats::bump(&self.stats.sessions_established);
                debug!(tid = %tid, peer = %live.peer(), "session active");
            }
            _ => {
                debug!(tid = %tid, peer = %live.peer(), "session rejected by peer");
                *session = None;
            }
        }
        Ok(new_state)
    }

    /// Pause the session on `tid`. Frames stop being admitted but held
    /// ones still age out; the only way forward is teardown.
    pub fn session_suspend(&self, tid: Tid) -> Result<(), EngineError> {
        let lane = &self.lanes[tid.index()];
        let mut state = lock(&lane.state);
        let LaneState {
            session, reorder, ..
        } = &mut *state;

        let Some(live) = session.as_mut() else {
            EngineStats::bump(&self.stats.invalid_state);
            return Err(SessionError::NotFound { tid }.into());
        };
        live.suspend().inspect_err(|_| {
            EngineStats::bump(&self.stats.invalid_state);
        })?;
        reorder.set_active(false);
        debug!(tid = %tid, peer = %live.peer(), "session suspended");
        Ok(())
    }

    /// Tear down the session on `tid`: the reorder window is force-flushed
    /// and everything held is delivered in order before the session object
    /// is released.
    pub fn session_teardown(&self, tid: Tid) -> Result<(), EngineError> {
        let lane = &self.lanes[tid.index()];

        let _rx = lock(&lane.rx_dispatch);
        let frames = {
            let mut state = lock(&lane.state);
            let LaneState {
                session, reorder, ..
            } = &mut *state;

            let Some(live) = session.as_mut() else {
                EngineStats::bump(&self.stats.invalid_state);
                return Err(SessionError::NotFound { tid }.into());
            };
            live.begin_teardown().inspect_err(|_| {
                EngineStats::bump(&self.stats.invalid_state);
            })?;
            debug!(tid = %tid, peer = %live.peer(), "session teardown");

            reorder.flush_all();
            reorder.set_active(false);
            *session = None;
            EngineStats::bump(&self.stats.sessions_torn_down);
            reorder.drain_ready()
        };

        self.deliver_frames(frames);
        Ok(())
    }

    /// Current state of the session on `tid`, if one exists.
    pub fn session_state(&self, tid: Tid) -> Option<SessionState> {
        let state = lock(&self.lanes[tid.index()].state);
        state.session.as_ref().map(BlockAckSession::state)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Begin recurring flush ticks through the timer service.
    ///
    /// Idempotent; a second call is a no-op.
    pub fn start(self: &Arc<Self>)
    where
        T: 'static,
        D: 'static,
    {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("engine started");
        self.timers.start(Arc::clone(self) as Arc<dyn TickHandler>);
    }

    /// Stop the engine: cancel-and-join every timer, then flush what
    /// remains. When this returns, no tick callback is running or will
    /// run, every session has been torn down with its frames delivered in
    /// order, and pending outbound frames have gone out as a final batch.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.timers.shutdown().await;
        self.quiesce();
        debug!("engine stopped");
    }

    fn quiesce(&self) {
        for tid in Tid::all() {
            let lane = &self.lanes[tid.index()];

            {
                let _tx = lock(&lane.tx_dispatch);
                let batch = {
                    let mut state = lock(&lane.state);
                    state.agg.deactivate()
                };
                self.transmit_batch(batch);
            }

            {
                let _rx = lock(&lane.rx_dispatch);
                let frames = {
                    let mut state = lock(&lane.state);
                    let LaneState {
                        session, reorder, ..
                    } = &mut *state;

                    if let Some(live) = session.as_mut() {
                        let _ = live.begin_teardown();
                        debug!(tid = %tid, peer = %live.peer(), "session teardown on engine stop");
                        *session = None;
                        EngineStats::bump(&self.stats.sessions_torn_down);
                    }
                    reorder.flush_all();
                    reorder.set_active(false);
                    reorder.drain_ready()
                };
                self.deliver_frames(frames);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Dispatch helpers (no lane lock held)
    // -------------------------------------------------------------------------

    fn transmit_batch(&self, batch: Vec<FrameEntry>) -> usize {
        let count = batch.len();
        if count > 0 {
            EngineStats::bump(&self.stats.batches);
        }
        for entry in batch {
            let tid = entry.tid();
            let seq = entry.seq();
            EngineStats::bump(&self.stats.transmitted);
            if let Err(err) = self.transmitter.transmit(entry) {
                EngineStats::bump(&self.stats.transmit_failures);
                warn!(tid = %tid, %seq, error = %err, "transmit collaborator rejected frame");
            }
        }
        count
    }

    fn deliver_frames(&self, frames: Vec<FrameEntry>) -> usize {
        let count = frames.len();
        for entry in frames {
            EngineStats::bump(&self.stats.delivered);
            self.deliverer.deliver(entry);
        }
        count
    }

    fn count_admit_error(&self, tid: Tid, seq: SeqNum, err: &AdmitError) {
        match err {
            AdmitError::OutOfWindow { .. } => {
                EngineStats::bump(&self.stats.out_of_window);
                trace!(tid = %tid, %seq, "inbound frame outside reorder window");
            }
            AdmitError::Duplicate(_) => {
                EngineStats::bump(&self.stats.duplicates);
                trace!(tid = %tid, %seq, "duplicate inbound frame");
            }
            AdmitError::Inactive => {
                EngineStats::bump(&self.stats.invalid_state);
                warn!(tid = %tid, %seq, "inbound frame for a session that is not active");
            }
        }
    }
}

impl<T, D, S> TickHandler for Engine<T, D, S>
where
    T: FrameTransmitter + 'static,
    D: FrameDeliverer + 'static,
    S: TimerService,
{
    /// One flush tick for `tid`: promote expired outbound frames, release
    /// expired reorder entries (skipping dead gaps), and enforce session
    /// inactivity — all under the same lane lock the producer paths use,
    /// so a frame arriving concurrently can never be missed by the timer.
    fn on_tick(&self, tid: Tid, now: Instant) {
        let lane = &self.lanes[tid.index()];

        {
            let _tx = lock(&lane.tx_dispatch);
            let batch = {
                let mut state = lock(&lane.state);
                state.agg.flush_expired(now);
                state.agg.drain_ready()
            };
            if !batch.is_empty() {
                trace!(tid = %tid, frames = batch.len(), "flush timer released aggregate");
            }
            self.transmit_batch(batch);
        }

        {
            let _rx = lock(&lane.rx_dispatch);
            let (frames, expired) = {
                let mut state = lock(&lane.state);
                let LaneState {
                    session, reorder, ..
                } = &mut *state;

                let head = reorder.head();
                let forced = reorder.flush_expired(now);
                if forced > 0 {
                    EngineStats::add(&self.stats.timer_releases, forced as u64);
                    trace!(tid = %tid, frames = forced, "reorder timeout released frames");
                }

                let mut expired = false;
                if let Some(live) = session.as_mut() {
                    live.window_advanced(reorder.head().offset_from(head));
                    if live.is_expired(now) {
                        debug!(tid = %tid, peer = %live.peer(), "session inactivity expiry");
                        let _ = live.begin_teardown();
                        *session = None;
                        reorder.flush_all();
                        reorder.set_active(false);
                        expired = true;
                    }
                }
                (reorder.drain_ready(), expired)
            };
            if expired {
                EngineStats::bump(&self.stats.sessions_expired);
                EngineStats::bump(&self.stats.sessions_torn_down);
            }
            self.deliver_frames(frames);
        }
    }
}
