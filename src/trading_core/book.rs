//! Symbol-keyed book of position engines

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::position::{PositionEngine, PositionMode, SignalHook, TradingAction};
use crate::aggregation::symbol::SymbolAggregator;
use crate::clock::Clock;
use crate::error::AggregationError;
use crate::types::{minute_index, MarketEvent};

/// An action emitted by one engine
#[derive(Debug, Clone, PartialEq)]
pub struct PositionUpdate {
    pub symbol: String,
    pub action: TradingAction,
    pub mode: PositionMode,
    /// Latest close at evaluation time
    pub price: Option<f64>,
}

pub struct PositionBook {
    engines: HashMap<String, PositionEngine>,
    position_size: f64,
    max_bars: usize,
    hook: Arc<dyn SignalHook>,
    clock: Arc<dyn Clock>,
    last_tick_minute: Option<i64>,
}

impl PositionBook {
    pub fn new(
        position_size: f64,
        max_bars: usize,
        hook: Arc<dyn SignalHook>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engines: HashMap::new(),
            position_size,
            max_bars,
            hook,
            clock,
            last_tick_minute: None,
        }
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn engine(&self, symbol: &str) -> Option<&PositionEngine> {
        self.engines.get(symbol)
    }

    /// Route an event to its engine, creating it on first sight.
    /// Returns an update only when the engine emitted a real action.
    pub fn on_event(&mut self, event: &MarketEvent) -> Result<Option<PositionUpdate>, AggregationError> {
        let symbol = event.symbol();
        if !self.engines.contains_key(symbol) {
            debug!("Tracking positions for {}", symbol);
            let engine = PositionEngine::new(
                SymbolAggregator::with_max_bars(symbol, self.max_bars),
                self.position_size,
                self.hook.clone(),
                self.clock.clone(),
            );
            self.engines.insert(symbol.to_string(), engine);
        }
        let Some(engine) = self.engines.get_mut(symbol) else {
            return Ok(None);
        };
        let action = engine.on_event(event)?;
        Ok(action.and_then(|action| to_update(engine, action)))
    }

    /// Clear every engine's ladder at the end of a trading day.
    ///
    /// Without this the first snapshot of the next day would sit behind an
    /// overnight gap wider than any allowed fill.
    pub fn reset_bars(&mut self) {
        for engine in self.engines.values_mut() {
            engine.reset_bars();
        }
        info!("Position ladders cleared for {} symbols", self.engines.len());
    }

    /// Periodic evaluation for every engine, once per wall-clock minute.
    ///
    /// Engines already evaluated this minute by ingestion do not fire again.
    pub fn on_tick(&mut self) -> Vec<PositionUpdate> {
        let minute = minute_index(self.clock.now_epoch_seconds());
        if self.last_tick_minute.is_some_and(|last| minute <= last) {
            return Vec::new();
        }
        self.last_tick_minute = Some(minute);

        let mut symbols: Vec<&String> = self.engines.keys().collect();
        symbols.sort_unstable();
        let symbols: Vec<String> = symbols.into_iter().cloned().collect();

        let mut updates = Vec::new();
        for symbol in symbols {
            if let Some(engine) = self.engines.get_mut(&symbol) {
                if let Some(update) = engine
                    .evaluate_if_new_minute()
                    .and_then(|action| to_update(engine, action))
                {
                    updates.push(update);
                }
            }
        }
        updates
    }
}

fn to_update(engine: &PositionEngine, action: TradingAction) -> Option<PositionUpdate> {
    if action == TradingAction::NoAction {
        return None;
    }
    Some(PositionUpdate {
        symbol: engine.symbol().to_string(),
        action,
        mode: engine.mode(),
        price: engine.bars().last_close(),
    })
}
