//! Per-symbol minute bar ladder
//!
//! A [`SymbolAggregator`] keeps one symbol's buckets as a contiguous
//! one-minute ladder: every minute between the oldest and newest retained
//! bucket is present. Silent minutes are forward-filled with flat,
//! zero-volume bars carrying the last known price.
//!
//! Two merge modes feed the ladder:
//! - trades are incremental and merge into their bucket
//! - provider bar snapshots are running totals and replace their bucket

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::VecDeque;
use tracing::trace;

use crate::error::AggregationError;
use crate::types::{truncate_to_minute, Bar, DailyRow, MinuteRow, TimedBar, Trade};

/// Default number of retained minute buckets
pub const DEFAULT_MAX_BARS: usize = 300;

/// Largest gap (in minutes) a bar snapshot may forward-fill
pub const MAX_SNAPSHOT_FILL: usize = 100;

/// Column selector for rolling analytics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl BarField {
    pub fn value(self, bar: &Bar) -> f64 {
        match self {
            BarField::Open => bar.open,
            BarField::High => bar.high,
            BarField::Low => bar.low,
            BarField::Close => bar.close,
            BarField::Volume => bar.volume,
        }
    }
}

/// Where a bucket time falls relative to the retained ladder
enum Slot {
    /// Already retained at this index
    Retained(usize),
    /// Newer than the last bucket by this many minutes
    Ahead(i64),
    /// Older than the first retained bucket
    Stale,
}

#[derive(Debug, Clone)]
pub struct SymbolAggregator {
    symbol: String,
    bars: VecDeque<TimedBar>,
    max_bars: usize,
    now_override: Option<DateTime<Utc>>,
}

impl SymbolAggregator {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self::with_max_bars(symbol, DEFAULT_MAX_BARS)
    }

    /// Create with a custom retention cap (at least one bucket)
    pub fn with_max_bars(symbol: impl Into<String>, max_bars: usize) -> Self {
        Self {
            symbol: symbol.into(),
            bars: VecDeque::new(),
            max_bars: max_bars.max(1),
            now_override: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn max_bars(&self) -> usize {
        self.max_bars
    }

    /// Retained buckets, oldest first
    pub fn bars(&self) -> &VecDeque<TimedBar> {
        &self.bars
    }

    pub fn last(&self) -> Option<&TimedBar> {
        self.bars.back()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.back().map(|b| b.bar.close)
    }

    /// Drop every retained bucket, keeping symbol and retention cap
    pub fn clear(&mut self) {
        self.bars.clear();
    }

    /// Pin "now" for windowed queries. `None` restores the wall clock.
    pub fn set_now(&mut self, now: Option<DateTime<Utc>>) {
        self.now_override = now;
    }

    fn now(&self) -> DateTime<Utc> {
        self.now_override.unwrap_or_else(Utc::now)
    }

    fn check_symbol(&self, symbol: &str) -> Result<(), AggregationError> {
        if symbol != self.symbol {
            return Err(AggregationError::SymbolMismatch {
                expected: self.symbol.clone(),
                actual: symbol.to_string(),
            });
        }
        Ok(())
    }

    fn locate(&self, time: DateTime<Utc>) -> Slot {
        let (Some(first), Some(last)) = (self.bars.front(), self.bars.back()) else {
            return Slot::Stale;
        };
        if time > last.time {
            return Slot::Ahead((time - last.time).num_minutes());
        }
        if time < first.time {
            return Slot::Stale;
        }
        Slot::Retained((time - first.time).num_minutes() as usize)
    }

    fn stale_error(&self, time: DateTime<Utc>) -> AggregationError {
        AggregationError::StaleEvent {
            symbol: self.symbol.clone(),
            time,
            oldest: self.bars.front().map(|b| b.time).unwrap_or(time),
        }
    }

    /// Append flat zero-volume buckets up to and including `target`.
    ///
    /// Intermediate minutes carry the prior close; the `target` bucket opens
    /// at `target_price` because it is about to receive data.
    fn fill_to(&mut self, target: DateTime<Utc>, target_price: f64) {
        let (last_time, prior_close) = match self.bars.back() {
            Some(last) => (last.time, last.bar.close),
            None => return,
        };
        let gap = (target - last_time).num_minutes();
        if gap <= 0 {
            return;
        }

        // Buckets older than the cap would be trimmed right away, so skip
        // materializing them.
        let start = if gap as u64 > self.max_bars as u64 {
            self.bars.clear();
            target - TimeDelta::minutes(self.max_bars as i64 - 1)
        } else {
            last_time + TimeDelta::minutes(1)
        };

        let count = (target - start).num_minutes() + 1;
        for i in 0..count {
            let time = start + TimeDelta::minutes(i);
            let price = if time == target { target_price } else { prior_close };
            self.bars.push_back(TimedBar::new(
                time,
                Bar::from_trade_price(self.symbol.clone(), price, 0.0),
            ));
        }

        if gap > 1 {
            trace!(symbol = %self.symbol, gap, "forward-filled silent minutes");
        }
    }

    fn trim(&mut self) {
        while self.bars.len() > self.max_bars {
            self.bars.pop_front();
        }
    }

    /// Merge one trade into its minute bucket, forward-filling any silent
    /// minutes since the last bucket.
    pub fn apply_trade(&mut self, trade: &Trade) -> Result<(), AggregationError> {
        self.check_symbol(&trade.symbol)?;
        let target = truncate_to_minute(trade.timestamp_seconds);

        if self.bars.is_empty() {
            self.bars.push_back(TimedBar::new(
                target,
                Bar::from_trade_price(self.symbol.clone(), trade.price, 0.0),
            ));
        }

        let idx = match self.locate(target) {
            Slot::Retained(idx) => idx,
            Slot::Ahead(_) => {
                self.fill_to(target, trade.price);
                self.bars.len() - 1
            }
            Slot::Stale => return Err(self.stale_error(target)),
        };

        self.bars[idx].bar.apply_trade(trade)?;
        self.trim();
        Ok(())
    }

    /// Replace a bucket with an authoritative provider bar.
    ///
    /// Gaps wider than [`MAX_SNAPSHOT_FILL`] minutes are rejected with
    /// [`AggregationError::FillRunaway`] and leave the ladder untouched.
    /// A late snapshot replaces its own retained minute, not the newest one.
    pub fn apply_bar_snapshot(&mut self, snapshot: &TimedBar) -> Result<(), AggregationError> {
        self.check_symbol(snapshot.symbol())?;
        let target = truncate_to_minute(snapshot.time.timestamp());

        if self.bars.is_empty() {
            self.bars
                .push_back(TimedBar::new(target, snapshot.bar.clone()));
        }

        let idx = match self.locate(target) {
            Slot::Retained(idx) => idx,
            Slot::Ahead(gap) => {
                if gap > MAX_SNAPSHOT_FILL as i64 {
                    return Err(AggregationError::FillRunaway {
                        symbol: self.symbol.clone(),
                        gap_minutes: gap,
                        cap: MAX_SNAPSHOT_FILL,
                    });
                }
                self.fill_to(target, snapshot.bar.open);
                self.bars.len() - 1
            }
            Slot::Stale => return Err(self.stale_error(target)),
        };

        self.bars[idx].bar.replace_values(&snapshot.bar);
        self.trim();
        Ok(())
    }

    /// Owned copy of the ladder.
    ///
    /// With a window, only buckets younger than `window_minutes` relative to
    /// "now" are kept (walking back from the newest bucket).
    pub fn minute_series(&self, window_minutes: Option<u32>) -> Vec<TimedBar> {
        let Some(window) = window_minutes else {
            return self.bars.iter().cloned().collect();
        };
        let now = self.now();
        let window_seconds = i64::from(window) * 60;
        let keep_from = self
            .bars
            .iter()
            .rposition(|b| (now - b.time).num_seconds() >= window_seconds)
            .map_or(0, |i| i + 1);
        self.bars.range(keep_from..).cloned().collect()
    }

    pub fn minute_rows(&self, window_minutes: Option<u32>) -> Vec<MinuteRow> {
        self.minute_series(window_minutes)
            .iter()
            .map(TimedBar::to_minute_row)
            .collect()
    }

    /// Collapse the whole ladder into one daily row
    pub fn daily_summary(&self) -> Result<DailyRow, AggregationError> {
        let (Some(first), Some(last)) = (self.bars.front(), self.bars.back()) else {
            return Err(AggregationError::EmptyHistory {
                symbol: self.symbol.clone(),
            });
        };

        let (high, low, volume) = self.bars.iter().fold(
            (f64::MIN, f64::MAX, 0.0),
            |(high, low, volume), b| (high.max(b.bar.high), low.min(b.bar.low), volume + b.bar.volume),
        );

        Ok(DailyRow {
            date: first.time.date_naive(),
            symbol: self.symbol.clone(),
            open: first.bar.open,
            high,
            low,
            close: last.bar.close,
            volume,
        })
    }

    /// Raw column values over the trailing `query_range_minutes` buckets
    pub fn value_series(&self, field: BarField, query_range_minutes: usize) -> Vec<(DateTime<Utc>, f64)> {
        let start = self.bars.len().saturating_sub(query_range_minutes);
        self.bars
            .range(start..)
            .map(|b| (b.time, field.value(&b.bar)))
            .collect()
    }

    /// Relative change against the value `change_window_minutes` buckets
    /// earlier, for each of the trailing `query_range_minutes` buckets.
    /// NaN where the earlier bucket is not retained.
    pub fn change_series(
        &self,
        field: BarField,
        change_window_minutes: usize,
        query_range_minutes: usize,
    ) -> Vec<(DateTime<Utc>, f64)> {
        let n = self.bars.len();
        let start = n.saturating_sub(query_range_minutes);
        (start..n)
            .map(|i| {
                let current = field.value(&self.bars[i].bar);
                let change = match i.checked_sub(change_window_minutes) {
                    Some(j) => {
                        let previous = field.value(&self.bars[j].bar);
                        (current - previous) / previous
                    }
                    None => f64::NAN,
                };
                (self.bars[i].time, change)
            })
            .collect()
    }

    /// close * volume per bucket
    pub fn quantity_series(&self, query_range_minutes: usize) -> Vec<(DateTime<Utc>, f64)> {
        let start = self.bars.len().saturating_sub(query_range_minutes);
        self.bars
            .range(start..)
            .map(|b| (b.time, b.bar.close * b.bar.volume))
            .collect()
    }

    pub fn cumulative_quantity(&self, query_range_minutes: usize) -> f64 {
        self.quantity_series(query_range_minutes)
            .iter()
            .map(|(_, q)| q)
            .sum()
    }
}
