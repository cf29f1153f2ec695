//! Session scheduler
//!
//! Polls the [`SessionSchedule`] and opens or closes the trading day on the
//! shared [`SessionRunner`].

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::aggregation::session::SessionRunner;
use crate::clock::Clock;
use crate::config::SessionSchedule;
use crate::trading_core::book::PositionBook;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleTransition {
    Started,
    Ended,
}

/// Bring the runner in line with the schedule at `clock`'s current time
pub fn apply_schedule(
    runner: &mut SessionRunner,
    schedule: &SessionSchedule,
    clock: &dyn Clock,
) -> Option<ScheduleTransition> {
    let open = schedule.is_session_open(clock.now());
    match (open, runner.is_active()) {
        (true, false) => {
            runner.start_day();
            Some(ScheduleTransition::Started)
        }
        (false, true) => {
            if let Err(e) = runner.end_day() {
                error!("End of day export failed: {:#}", e);
            }
            Some(ScheduleTransition::Ended)
        }
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub schedule: SessionSchedule,
    pub poll: Duration,
    /// Write the daily table on every poll while the session is open
    pub daily_checkpoint: bool,
}

/// Drive the session from the schedule. On every close the position
/// ladders in `positions` are cleared along with the session state.
pub fn spawn_scheduler(
    runner: Arc<Mutex<SessionRunner>>,
    positions: Option<Arc<Mutex<PositionBook>>>,
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Session scheduler: {} - {} {} (poll {:?})",
            config.schedule.start, config.schedule.end, config.schedule.timezone, config.poll
        );
        let mut interval = tokio::time::interval(config.poll);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let transition = {
                        let mut runner = runner.lock().await;
                        let transition = apply_schedule(&mut runner, &config.schedule, clock.as_ref());
                        match transition {
                            Some(transition) => info!("Schedule transition: {:?}", transition),
                            None => debug!("Schedule unchanged, active={}", runner.is_active()),
                        }
                        if config.daily_checkpoint && runner.is_active() {
                            if let Err(e) = runner.snapshot_daily() {
                                warn!("Daily checkpoint failed: {:#}", e);
                            }
                        }
                        transition
                    };
                    if transition == Some(ScheduleTransition::Ended) {
                        if let Some(book) = &positions {
                            book.lock().await.reset_bars();
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("Session scheduler stopped");
    })
}
