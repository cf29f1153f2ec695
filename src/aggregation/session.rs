//! Daily session lifecycle
//!
//! The runner gates ingestion on an Active/Inactive state and, at the end
//! of the day, hands the accumulated minute and daily tables to a
//! [`SessionExporter`] before clearing all aggregators.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::aggregation::set::AggregatorSet;
use crate::types::{DailyRow, MarketEvent, MinuteRow, TimedBar, Trade};

/// Destination for end-of-day tables
pub trait SessionExporter: Send {
    fn export_minute(&mut self, rows: &[MinuteRow]) -> Result<()>;
    fn export_daily(&mut self, rows: &[DailyRow]) -> Result<()>;
}

/// Discards everything. End of day only clears state.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExporter;

impl SessionExporter for NoopExporter {
    fn export_minute(&mut self, _rows: &[MinuteRow]) -> Result<()> {
        Ok(())
    }

    fn export_daily(&mut self, _rows: &[DailyRow]) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Inactive,
}

/// What happened to one inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Applied,
    /// Dropped because the session is closed
    SessionInactive,
    /// Dropped because aggregation rejected it
    Rejected,
}

pub struct SessionRunner {
    state: SessionState,
    aggregators: AggregatorSet,
    exporter: Box<dyn SessionExporter>,
}

impl SessionRunner {
    pub fn new(
        aggregators: AggregatorSet,
        exporter: Box<dyn SessionExporter>,
        initial: SessionState,
    ) -> Self {
        Self {
            state: initial,
            aggregators,
            exporter,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn aggregators(&self) -> &AggregatorSet {
        &self.aggregators
    }

    pub fn start_day(&mut self) {
        if self.is_active() {
            debug!("start_day called while already active");
        }
        self.state = SessionState::Active;
        info!("Session started");
    }

    /// Close the session, export both tables and reset.
    ///
    /// State is cleared even when an export fails; the first export error
    /// is returned.
    pub fn end_day(&mut self) -> Result<()> {
        if !self.is_active() {
            warn!("end_day called while inactive, nothing to do");
            return Ok(());
        }
        self.state = SessionState::Inactive;

        let minute_rows = self.aggregators.minute_series_all();
        let daily_rows = self.aggregators.daily_summary_all();
        info!(
            "Ending session: {} minute rows, {} daily rows ({})",
            minute_rows.len(),
            daily_rows.len(),
            self.aggregators.status_summary()
        );

        let minute_result = self.exporter.export_minute(&minute_rows);
        let daily_result = self.exporter.export_daily(&daily_rows);
        self.aggregators.reset();

        minute_result?;
        daily_result?;
        Ok(())
    }

    /// Export the daily table without changing state
    pub fn snapshot_daily(&mut self) -> Result<()> {
        let daily_rows = self.aggregators.daily_summary_all();
        debug!("Daily checkpoint: {} rows", daily_rows.len());
        self.exporter.export_daily(&daily_rows)
    }

    pub fn on_trade(&mut self, trade: &Trade) -> IngestOutcome {
        if !self.is_active() {
            return IngestOutcome::SessionInactive;
        }
        match self.aggregators.on_trade(trade) {
            Ok(()) => IngestOutcome::Applied,
            Err(e) => {
                warn!("Dropping trade for {}: {}", trade.symbol, e);
                IngestOutcome::Rejected
            }
        }
    }

    pub fn on_bar_snapshot(&mut self, snapshot: &TimedBar) -> IngestOutcome {
        if !self.is_active() {
            return IngestOutcome::SessionInactive;
        }
        match self.aggregators.on_bar_snapshot(snapshot) {
            Ok(()) => IngestOutcome::Applied,
            Err(e) => {
                warn!("Dropping bar for {}: {}", snapshot.symbol(), e);
                IngestOutcome::Rejected
            }
        }
    }

    pub fn on_event(&mut self, event: &MarketEvent) -> IngestOutcome {
        match event {
            MarketEvent::Trade(trade) => self.on_trade(trade),
            MarketEvent::Bar(snapshot) => self.on_bar_snapshot(snapshot),
        }
    }
}
