//! Symbol-keyed collection of aggregators

use std::collections::HashMap;
use std::fmt;

use crate::aggregation::symbol::{SymbolAggregator, DEFAULT_MAX_BARS};
use crate::error::AggregationError;
use crate::types::{DailyRow, MarketEvent, MinuteRow, TimedBar, Trade};

/// One-line health snapshot for heartbeat logs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSummary {
    pub symbol_count: usize,
    /// Mean retained buckets per symbol (0 when empty)
    pub mean_bars: f64,
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} symbols, {:.1} bars/symbol",
            self.symbol_count, self.mean_bars
        )
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorSet {
    aggregators: HashMap<String, SymbolAggregator>,
    max_bars: usize,
}

impl Default for AggregatorSet {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BARS)
    }
}

impl AggregatorSet {
    pub fn new(max_bars: usize) -> Self {
        Self {
            aggregators: HashMap::new(),
            max_bars,
        }
    }

    fn entry(&mut self, symbol: &str) -> &mut SymbolAggregator {
        let max_bars = self.max_bars;
        self.aggregators
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolAggregator::with_max_bars(symbol, max_bars))
    }

    pub fn on_trade(&mut self, trade: &Trade) -> Result<(), AggregationError> {
        self.entry(&trade.symbol).apply_trade(trade)
    }

    pub fn on_bar_snapshot(&mut self, snapshot: &TimedBar) -> Result<(), AggregationError> {
        self.entry(snapshot.symbol()).apply_bar_snapshot(snapshot)
    }

    pub fn on_event(&mut self, event: &MarketEvent) -> Result<(), AggregationError> {
        match event {
            MarketEvent::Trade(trade) => self.on_trade(trade),
            MarketEvent::Bar(snapshot) => self.on_bar_snapshot(snapshot),
        }
    }

    /// Drop every aggregator
    pub fn reset(&mut self) {
        self.aggregators.clear();
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolAggregator> {
        self.aggregators.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.aggregators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregators.is_empty()
    }

    /// Symbols in sorted order
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.aggregators.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }

    pub fn status_summary(&self) -> StatusSummary {
        let symbol_count = self.aggregators.len();
        let total: usize = self.aggregators.values().map(SymbolAggregator::len).sum();
        let mean_bars = if symbol_count == 0 {
            0.0
        } else {
            total as f64 / symbol_count as f64
        };
        StatusSummary {
            symbol_count,
            mean_bars,
        }
    }

    /// Minute rows for every symbol, grouped by symbol in sorted order
    pub fn minute_series_all(&self) -> Vec<MinuteRow> {
        self.symbols()
            .into_iter()
            .filter_map(|symbol| self.aggregators.get(symbol))
            .flat_map(|agg| agg.minute_rows(None))
            .collect()
    }

    /// One daily row per non-empty symbol, sorted by symbol
    pub fn daily_summary_all(&self) -> Vec<DailyRow> {
        self.symbols()
            .into_iter()
            .filter_map(|symbol| self.aggregators.get(symbol))
            .filter_map(|agg| agg.daily_summary().ok())
            .collect()
    }
}
