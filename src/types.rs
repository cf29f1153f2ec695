use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AggregationError;

/// Width of one bucket
pub const BUCKET_SECONDS: i64 = 60;

/// A single trade print
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp_seconds: i64,
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
}

impl Trade {
    pub fn new(timestamp_seconds: i64, symbol: impl Into<String>, price: f64, volume: f64) -> Self {
        Self {
            timestamp_seconds,
            symbol: symbol.into(),
            price,
            volume,
        }
    }
}

/// OHLCV for one symbol over one bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        symbol: impl Into<String>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Flat bar where every price equals `price`
    pub fn from_trade_price(symbol: impl Into<String>, price: f64, volume: f64) -> Self {
        Self::new(symbol, price, price, price, price, volume)
    }

    /// Merge one trade into the bar
    pub fn apply_trade(&mut self, trade: &Trade) -> Result<(), AggregationError> {
        if self.symbol != trade.symbol {
            return Err(AggregationError::SymbolMismatch {
                expected: self.symbol.clone(),
                actual: trade.symbol.clone(),
            });
        }
        self.high = self.high.max(trade.price);
        self.low = self.low.min(trade.price);
        self.close = trade.price;
        self.volume += trade.volume;
        Ok(())
    }

    /// Overwrite prices and volume with an authoritative snapshot
    pub(crate) fn replace_values(&mut self, snapshot: &Bar) {
        self.open = snapshot.open;
        self.high = snapshot.high;
        self.low = snapshot.low;
        self.close = snapshot.close;
        self.volume = snapshot.volume;
    }
}

/// A bar paired with the start of its minute bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedBar {
    pub time: DateTime<Utc>,
    pub bar: Bar,
}

impl TimedBar {
    pub fn new(time: DateTime<Utc>, bar: Bar) -> Self {
        Self { time, bar }
    }

    /// Build from an epoch-seconds bucket start, truncating to the minute
    pub fn at_epoch_seconds(epoch_seconds: i64, bar: Bar) -> Self {
        Self::new(truncate_to_minute(epoch_seconds), bar)
    }

    pub fn symbol(&self) -> &str {
        &self.bar.symbol
    }

    pub fn next_bucket_time(&self) -> DateTime<Utc> {
        self.time + TimeDelta::minutes(1)
    }

    pub fn to_minute_row(&self) -> MinuteRow {
        MinuteRow {
            time: self.time,
            symbol: self.bar.symbol.clone(),
            open: self.bar.open,
            high: self.bar.high,
            low: self.bar.low,
            close: self.bar.close,
            volume: self.bar.volume,
        }
    }
}

/// Inbound events the aggregation core understands
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    /// Incremental trade print
    Trade(Trade),
    /// Provider-built bar that replaces its bucket
    Bar(TimedBar),
}

impl MarketEvent {
    pub fn symbol(&self) -> &str {
        match self {
            MarketEvent::Trade(trade) => &trade.symbol,
            MarketEvent::Bar(timed) => timed.symbol(),
        }
    }
}

/// Row of the minute-level export table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinuteRow {
    pub time: DateTime<Utc>,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Row of the daily-level export table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRow {
    pub date: NaiveDate,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Floor an epoch-seconds timestamp to its UTC minute.
///
/// Timestamps outside chrono's range clamp to the nearest representable instant.
pub fn truncate_to_minute(epoch_seconds: i64) -> DateTime<Utc> {
    let min_minute = DateTime::<Utc>::MIN_UTC.timestamp().div_euclid(BUCKET_SECONDS) + 1;
    let max_minute = DateTime::<Utc>::MAX_UTC.timestamp().div_euclid(BUCKET_SECONDS);
    let minute = epoch_seconds
        .div_euclid(BUCKET_SECONDS)
        .clamp(min_minute, max_minute);
    DateTime::from_timestamp(minute * BUCKET_SECONDS, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Wall-clock minute index used for edge-triggered evaluation
pub fn minute_index(epoch_seconds: i64) -> i64 {
    epoch_seconds.div_euclid(BUCKET_SECONDS)
}
