//! Periodic notification scheduler
//!
//! The scheduler owns the on/off state of the periodic delivery loop:
//! - `activate()` starts exactly one loop and fires one immediate delivery
//! - `deactivate()` stops it without waiting for an in-flight cycle
//! - `reconfigure_interval()` swaps the timer period of a running loop
//!
//! ## Architecture
//!
//! ```text
//!   ConfigApi ──activate/deactivate/reconfigure──┐
//!                                                ▼
//!                                   ┌──────────────────────┐
//!                                   │ NotificationScheduler│  (state lock)
//!                                   └──────────────────────┘
//!                                      │ spawn        │ spawn
//!                                      ▼              ▼
//!                          ┌────────────────┐  ┌───────────────┐
//!                          │ immediate cycle│  │ recurring loop│◄─ watch(period)
//!                          └────────────────┘  └───────────────┘◄─ CancellationToken
//!                                      │              │
//!                                      ▼              ▼
//!                             WeatherProvider ──► Notifier
//! ```
//!
//! ## Locking
//!
//! The state lock is never held across an await point and never while the
//! [`ConfigStore`] lock is held. The interval is read from the config store
//! before the state lock is taken.

mod clock;
mod cycle;

pub use clock::{Clock, SystemClock};
pub use cycle::{CycleOutcome, DeliveryCycle};

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{ConfigStore, MAX_INTERVAL};
use crate::traits::{Notifier, WeatherProvider};

/// Scheduler state machine
///
/// The timer handle and the cancellation token exist if and only if the
/// scheduler is running.
#[derive(Debug, Default)]
enum SchedulerState {
    #[default]
    Stopped,
    Running {
        cancel: CancellationToken,
        period_tx: watch::Sender<Duration>,
        // Held only to keep ownership explicit; the loop is never joined
        _handle: JoinHandle<()>,
    },
}

/// Periodic notification scheduler
///
/// ## Lifecycle
///
/// `Stopped` → `activate()` → `Running` → `deactivate()` → `Stopped`, and
/// again as often as needed. Both transitions are idempotent.
///
/// Must be used from within a tokio runtime.
pub struct NotificationScheduler {
    config: ConfigStore,
    cycle: DeliveryCycle,
    state: Mutex<SchedulerState>,
}

impl NotificationScheduler {
    /// Create a stopped scheduler
    pub fn new(
        config: ConfigStore,
        provider: Arc<dyn WeatherProvider>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cycle = DeliveryCycle::new(config.clone(), provider, notifier, clock);
        Self {
            config,
            cycle,
            state: Mutex::new(SchedulerState::Stopped),
        }
    }

    /// Start the periodic loop
    ///
    /// No-op when already running. Otherwise spawns one immediate delivery
    /// (detached, result only logged) and the recurring loop whose first
    /// tick comes one full interval from now.
    pub fn activate(&self) {
        let period = self.config.interval().min(MAX_INTERVAL);
        let first_tick = deadline_after(period);

        let mut state = self.state.lock();
        if matches!(*state, SchedulerState::Running { .. }) {
            debug!("Notifications already active");
            return;
        }

        let cancel = CancellationToken::new();
        let (period_tx, period_rx) = watch::channel(period);

        let immediate = self.cycle.clone();
        tokio::spawn(async move {
            immediate.run_immediate().await.log("Initial");
        });

        let handle = tokio::spawn(run_loop(
            self.cycle.clone(),
            cancel.clone(),
            period_rx,
            first_tick,
        ));

        *state = SchedulerState::Running {
            cancel,
            period_tx,
            _handle: handle,
        };

        info!("Notifications activated (interval: {:?})", period);
    }

    /// Stop the periodic loop
    ///
    /// No-op when already stopped. Fires the cancellation token once and
    /// returns without waiting: a cycle already in flight finishes on its own.
    pub fn deactivate(&self) {
        let previous = std::mem::take(&mut *self.state.lock());

        match previous {
            SchedulerState::Running { cancel, .. } => {
                cancel.cancel();
                info!("Notifications deactivated");
            }
            SchedulerState::Stopped => {
                debug!("Notifications already inactive");
            }
        }
    }

    /// Change the period of the running timer
    ///
    /// While stopped this does nothing; the next `activate()` reads the
    /// interval from the config store. Periods above [`MAX_INTERVAL`] are
    /// capped.
    pub fn reconfigure_interval(&self, period: Duration) {
        if period.is_zero() {
            debug!("Ignoring zero notification interval");
            return;
        }
        let period = period.min(MAX_INTERVAL);

        if let SchedulerState::Running { period_tx, .. } = &*self.state.lock() {
            period_tx.send_replace(period);
            info!("Notification interval updated to {:?}", period);
        }
    }

    /// Whether the loop is running
    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), SchedulerState::Running { .. })
    }

    /// Period of the live timer, if running
    pub fn current_period(&self) -> Option<Duration> {
        match &*self.state.lock() {
            SchedulerState::Running { period_tx, .. } => Some(*period_tx.borrow()),
            SchedulerState::Stopped => None,
        }
    }
}

impl Drop for NotificationScheduler {
    fn drop(&mut self) {
        if let SchedulerState::Running { cancel, .. } = &*self.state.get_mut() {
            cancel.cancel();
        }
    }
}

impl std::fmt::Debug for NotificationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationScheduler")
            .field("running", &self.is_running())
            .field("period", &self.current_period())
            .finish()
    }
}

/// The recurring loop: wait for cancel, a period change or a tick
async fn run_loop(
    cycle: DeliveryCycle,
    cancel: CancellationToken,
    mut period_rx: watch::Receiver<Duration>,
    first_tick: Instant,
) {
    let period = *period_rx.borrow_and_update();
    let mut ticker = new_ticker(first_tick, period);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("Notification loop stopped");
                break;
            }

            Ok(()) = period_rx.changed() => {
                let period = *period_rx.borrow_and_update();
                ticker = new_ticker(deadline_after(period), period);
                debug!("Notification timer restarted with period {:?}", period);
            }

            _ = ticker.tick() => {
                cycle.run_scheduled().await.log("Scheduled");
            }
        }
    }
}

// Instant arithmetic panics on overflow and would take the loop down with it
fn deadline_after(period: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(period)
        .or_else(|| now.checked_add(MAX_INTERVAL))
        .unwrap_or(now)
}

fn new_ticker(start: Instant, period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
