use crate::state::messages::PollOutcome;
use crate::state::synchronizer::MasterBracketSynchronizer;
use chrono::{Local, Timelike};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Inclusive range of local hours considered active tournament play. A start
/// later than the end wraps past midnight (e.g. 18-2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakHours {
    pub start: u32,
    pub end: u32,
}

impl PeakHours {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            (self.start..=self.end).contains(&hour)
        } else {
            hour >= self.start || hour <= self.end
        }
    }
}

impl Default for PeakHours {
    fn default() -> Self {
        Self { start: 12, end: 23 }
    }
}

/// Time-of-day sensitive poll cadence.
#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    pub peak_interval: Duration,
    pub peak_hours: PeakHours,
    pub off_peak_multiplier: u32,
}

impl PollSchedule {
    pub fn interval_for_hour(&self, hour: u32) -> Duration {
        if self.peak_hours.contains(hour) {
            self.peak_interval
        } else {
            self.peak_interval.saturating_mul(self.off_peak_multiplier.max(1))
        }
    }

    pub fn interval_at<T: Timelike>(&self, now: &T) -> Duration {
        self.interval_for_hour(now.hour())
    }
}

/// Background task driving `MasterBracketSynchronizer::poll`.
///
/// The next tick is only scheduled after the previous one finished, so a slow
/// fetch delays the schedule instead of overlapping with another.
pub struct Poller {
    sync: Arc<MasterBracketSynchronizer>,
    schedule: PollSchedule,
    running: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl Poller {
    pub fn new(sync: Arc<MasterBracketSynchronizer>, schedule: PollSchedule) -> Self {
        Self {
            sync,
            schedule,
            running: Mutex::new(None),
        }
    }

    /// Spawn the poll loop. Does nothing if it is already running.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.is_some() {
            return;
        }
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run(self.sync.clone(), self.schedule, rx));
        *running = Some((tx, task));
        info!("master bracket polling started");
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().as_ref().is_some_and(|(_, task)| !task.is_finished())
    }

    /// Cancel polling and wait for the loop to exit. An in-flight tick is
    /// abandoned. Safe to call repeatedly or before `start`.
    pub async fn stop(&self) {
        let Some((tx, task)) = self.running.lock().take() else {
            return;
        };
        let _ = tx.send(true);
        if let Err(e) = task.await
            && !e.is_cancelled()
        {
            error!("poll loop ended abnormally: {e}");
        }
        info!("master bracket polling stopped");
    }
}

async fn run(
    sync: Arc<MasterBracketSynchronizer>,
    schedule: PollSchedule,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        // Re-evaluated every tick so the cadence follows the clock across the
        // peak window boundary.
        let delay = schedule.interval_at(&Local::now());
        debug!("next master bracket poll in {delay:?}");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }

        tokio::select! {
            outcome = sync.poll() => match &outcome {
                PollOutcome::Failed { .. } => warn!("poll tick {outcome}"),
                _ => debug!("poll tick {outcome}"),
            },
            _ = shutdown.changed() => {
                info!("abandoning in-flight poll on shutdown");
                break;
            }
        }
    }
}
