//! Per-symbol position state machine
//!
//! A [`PositionEngine`] owns one symbol's minute ladder and, at most once per
//! wall-clock minute, asks a [`SignalHook`] for the desired position mode.
//! The diff between the previous and the new mode becomes a
//! [`TradingAction`].
//!
//! Evaluation is edge-triggered on the injected clock, not on the timestamps
//! carried by the data.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::aggregation::symbol::{BarField, SymbolAggregator};
use crate::clock::Clock;
use crate::error::AggregationError;
use crate::types::{minute_index, MarketEvent, TimedBar, Trade};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketSignal {
    Long,
    Short,
    NoSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionMode {
    #[default]
    NoPosition,
    ShortSeekingEntry,
    ShortEntered,
    LongSeekingEntry,
    LongEntered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingAction {
    NoAction,
    EnterLong,
    EnterShort,
    ExitLong,
    ExitShort,
}

impl fmt::Display for TradingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TradingAction::NoAction => "NO_ACTION",
            TradingAction::EnterLong => "ENTER_LONG",
            TradingAction::EnterShort => "ENTER_SHORT",
            TradingAction::ExitLong => "EXIT_LONG",
            TradingAction::ExitShort => "EXIT_SHORT",
        };
        f.write_str(name)
    }
}

/// Strategy extension point. Both defaults keep the engine flat.
pub trait SignalHook: Send + Sync {
    fn market_signal(&self, _bars: &SymbolAggregator) -> MarketSignal {
        MarketSignal::NoSignal
    }

    fn next_position_mode(
        &self,
        _current: PositionMode,
        _signal: MarketSignal,
        _bars: &SymbolAggregator,
    ) -> PositionMode {
        PositionMode::NoPosition
    }
}

/// Hook that never signals
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSignalHook;

impl SignalHook for NoSignalHook {}

/// Mode transition to action
pub fn derive_action(previous: PositionMode, next: PositionMode) -> TradingAction {
    if previous == next {
        return TradingAction::NoAction;
    }
    match (previous, next) {
        (_, PositionMode::ShortEntered) => TradingAction::EnterShort,
        (_, PositionMode::LongEntered) => TradingAction::EnterLong,
        (PositionMode::ShortEntered, PositionMode::NoPosition) => TradingAction::ExitShort,
        (PositionMode::LongEntered, PositionMode::NoPosition) => TradingAction::ExitLong,
        _ => TradingAction::NoAction,
    }
}

/// Price and time an entry was taken at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    pub price: f64,
    pub epoch_seconds: i64,
}

pub struct PositionEngine {
    bars: SymbolAggregator,
    position_size: f64,
    mode: PositionMode,
    long_entry: Option<Entry>,
    short_entry: Option<Entry>,
    last_evaluated_minute: Option<i64>,
    hook: Arc<dyn SignalHook>,
    clock: Arc<dyn Clock>,
}

impl PositionEngine {
    pub fn new(
        bars: SymbolAggregator,
        position_size: f64,
        hook: Arc<dyn SignalHook>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bars,
            position_size,
            mode: PositionMode::NoPosition,
            long_entry: None,
            short_entry: None,
            last_evaluated_minute: None,
            hook,
            clock,
        }
    }

    pub fn symbol(&self) -> &str {
        self.bars.symbol()
    }

    pub fn bars(&self) -> &SymbolAggregator {
        &self.bars
    }

    pub fn mode(&self) -> PositionMode {
        self.mode
    }

    pub fn position_size(&self) -> f64 {
        self.position_size
    }

    pub fn long_entry(&self) -> Option<Entry> {
        self.long_entry
    }

    pub fn short_entry(&self) -> Option<Entry> {
        self.short_entry
    }

    /// Start a fresh ladder for a new trading day. Mode and entries carry over.
    pub fn reset_bars(&mut self) {
        self.bars.clear();
    }

    pub fn on_trade(&mut self, trade: &Trade) -> Result<Option<TradingAction>, AggregationError> {
        self.bars.apply_trade(trade)?;
        Ok(self.evaluate_if_new_minute())
    }

    pub fn on_bar_snapshot(
        &mut self,
        snapshot: &TimedBar,
    ) -> Result<Option<TradingAction>, AggregationError> {
        self.bars.apply_bar_snapshot(snapshot)?;
        Ok(self.evaluate_if_new_minute())
    }

    pub fn on_event(&mut self, event: &MarketEvent) -> Result<Option<TradingAction>, AggregationError> {
        match event {
            MarketEvent::Trade(trade) => self.on_trade(trade),
            MarketEvent::Bar(snapshot) => self.on_bar_snapshot(snapshot),
        }
    }

    /// Evaluate when the clock has entered a minute later than the last
    /// evaluated one. Returns `None` when nothing fired.
    pub fn evaluate_if_new_minute(&mut self) -> Option<TradingAction> {
        let now = self.clock.now_epoch_seconds();
        let minute = minute_index(now);
        if self.last_evaluated_minute.is_some_and(|last| minute <= last) {
            return None;
        }
        self.last_evaluated_minute = Some(minute);
        Some(self.evaluate(now))
    }

    fn evaluate(&mut self, now_epoch_seconds: i64) -> TradingAction {
        let signal = self.hook.market_signal(&self.bars);
        let previous = self.mode;
        self.mode = self.hook.next_position_mode(previous, signal, &self.bars);
        let action = derive_action(previous, self.mode);

        let entry = Entry {
            price: self.bars.last_close().unwrap_or(0.0),
            epoch_seconds: now_epoch_seconds,
        };
        match action {
            TradingAction::EnterLong => self.long_entry = Some(entry),
            TradingAction::EnterShort => self.short_entry = Some(entry),
            _ => {}
        }

        if action != TradingAction::NoAction {
            info!(
                "{} {} (size {}, price {:.4}, mode {:?})",
                self.symbol(),
                action,
                self.position_size,
                entry.price,
                self.mode
            );
        }
        action
    }

    /// Relative close change over `change_window_minutes` at the newest bucket.
    /// `None` when no bucket is retained.
    pub fn latest_change(&self, change_window_minutes: usize) -> Option<f64> {
        self.bars
            .change_series(BarField::Close, change_window_minutes, 1)
            .last()
            .map(|(_, change)| *change)
    }

    pub fn change_series(
        &self,
        field: BarField,
        change_window_minutes: usize,
        query_range_minutes: usize,
    ) -> Vec<(DateTime<Utc>, f64)> {
        self.bars
            .change_series(field, change_window_minutes, query_range_minutes)
    }

    pub fn quantity_series(&self, query_range_minutes: usize) -> Vec<(DateTime<Utc>, f64)> {
        self.bars.quantity_series(query_range_minutes)
    }

    pub fn cumulative_quantity(&self, query_range_minutes: usize) -> f64 {
        self.bars.cumulative_quantity(query_range_minutes)
    }
}
