//! Timer services.
//!
//! The engine depends on the [`TimerService`] abstraction rather than any
//! concrete scheduler. Two implementations live here: [`ManualTimers`] for
//! embeddings that drive ticks themselves, and (behind the `timers`
//! feature) [`TokioTimerService`], which runs one tokio task per TID.

use std::future::Future;
use std::sync::Arc;

use crate::core::{TickHandler, TimerService};

/// A timer service that never fires.
///
/// For embeddings with their own scheduler and for tests: drive flushes by
/// calling [`TickHandler::on_tick`] directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualTimers;

impl TimerService for ManualTimers {
    fn start(&self, _handler: Arc<dyn TickHandler>) {}

    fn shutdown(&self) -> impl Future<Output = ()> + Send {
        std::future::ready(())
    }
}

#[cfg(feature = "timers")]
mod tokio_timers {
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::{Duration, Instant};

    use tokio::sync::watch;
    use tokio::task::JoinHandle;
    use tokio::time::MissedTickBehavior;

    use crate::core::{DEFAULT_TICK_PERIOD, TickHandler, Tid, TimerService};

    /// Tokio-backed recurring flush ticks, one task per TID.
    ///
    /// Each task delivers at most one tick at a time for its TID.
    /// [`shutdown`](TimerService::shutdown) signals every task and awaits
    /// its join handle, so once it resolves no callback is running or will
    /// run again. The service does not restart after shutdown.
    ///
    /// Requires a running tokio runtime when
    /// [`start`](TimerService::start) is called.
    #[derive(Debug)]
    pub struct TokioTimerService {
        period: Duration,
        stop_tx: watch::Sender<bool>,
        tasks: Mutex<Vec<JoinHandle<()>>>,
    }

    impl TokioTimerService {
        /// Create a service ticking every `period`.
        pub fn new(period: Duration) -> Self {
            let (stop_tx, _) = watch::channel(false);
            Self {
                period,
                stop_tx,
                tasks: Mutex::new(Vec::new()),
            }
        }

        /// The configured tick period.
        pub fn period(&self) -> Duration {
            self.period
        }
    }

    impl Default for TokioTimerService {
        fn default() -> Self {
            Self::new(DEFAULT_TICK_PERIOD)
        }
    }

    impl TimerService for TokioTimerService {
        fn start(&self, handler: Arc<dyn TickHandler>) {
            let mut tasks = self
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !tasks.is_empty() {
                return;
            }
            for tid in Tid::all() {
                let handler = Arc::clone(&handler);
                let mut stop_rx = self.stop_tx.subscribe();
                let period = self.period;
                tasks.push(tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    // An interval fires immediately; swallow that so the
                    // first real tick lands one period after start.
                    ticker.tick().await;
                    loop {
                        tokio::select! {
                            _ = ticker.tick() => handler.on_tick(tid, Instant::now()),
                            _ = stop_rx.changed() => break,
                        }
                    }
                }));
            }
        }

        async fn shutdown(&self) {
            let _ = self.stop_tx.send(true);
            let tasks: Vec<JoinHandle<()>> = {
                let mut guard = self
                    .tasks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                guard.drain(..).collect()
            };
            for task in tasks {
                let _ = task.await;
            }
        }
    }

}

#[cfg(feature = "timers")]
#[cfg_attr(docsrs, doc(cfg(feature = "timers")))]
pub use tokio_timers::TokioTimerService;
