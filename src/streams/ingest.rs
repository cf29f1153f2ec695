//! Single-consumer ingest loop and its periodic companions
//!
//! Every feed sends into one mpsc channel. One task drains it, so all
//! aggregation and position mutations happen in program order. The minute
//! ticker and the heartbeat take the same locks.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aggregation::session::{IngestOutcome, SessionRunner};
use crate::aggregation::shard::ShardRouter;
use crate::trading_core::book::{PositionBook, PositionUpdate};
use crate::types::MarketEvent;

/// Counters for one ingest run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub received: u64,
    /// Owned by another shard
    pub filtered: u64,
    pub applied: u64,
    /// Arrived while the session was closed
    pub inactive: u64,
    pub rejected: u64,
}

fn log_update(update: &PositionUpdate) {
    info!(
        "Position {} {} -> {:?} at {:?}",
        update.symbol, update.action, update.mode, update.price
    );
}

/// Drain `rx` until every sender is gone
pub async fn run_ingest_loop(
    mut rx: mpsc::Receiver<MarketEvent>,
    router: ShardRouter,
    session: Arc<Mutex<SessionRunner>>,
    positions: Option<Arc<Mutex<PositionBook>>>,
) -> IngestStats {
    let mut stats = IngestStats::default();

    while let Some(event) = rx.recv().await {
        stats.received += 1;
        if !router.owns_symbol(event.symbol()) {
            stats.filtered += 1;
            continue;
        }

        let outcome = session.lock().await.on_event(&event);
        match outcome {
            IngestOutcome::Applied => stats.applied += 1,
            IngestOutcome::SessionInactive => {
                stats.inactive += 1;
                continue;
            }
            IngestOutcome::Rejected => stats.rejected += 1,
        }

        if let Some(book) = &positions {
            match book.lock().await.on_event(&event) {
                Ok(Some(update)) => log_update(&update),
                Ok(None) => {}
                Err(e) => debug!("Position engine skipped event: {}", e),
            }
        }
    }

    info!(
        "Ingest finished: {} received, {} applied, {} filtered, {} inactive, {} rejected",
        stats.received, stats.applied, stats.filtered, stats.inactive, stats.rejected
    );
    stats
}

/// Evaluate every position engine on each new wall-clock minute
pub fn spawn_minute_ticker(
    book: Arc<Mutex<PositionBook>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for update in book.lock().await.on_tick() {
                        log_update(&update);
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("Minute ticker stopped");
    })
}

/// Periodic liveness log with the aggregation status
pub fn spawn_heartbeat(
    session: Arc<Mutex<SessionRunner>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // Skip the immediate first tick
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let runner = session.lock().await;
                    info!(
                        "Heartbeat: session {:?}, {}",
                        runner.state(),
                        runner.aggregators().status_summary()
                    );
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("Heartbeat stopped");
    })
}

/// Log and drop a background task's failure
pub async fn join_logged(name: &str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        warn!("{} task failed: {}", name, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::session::{NoopExporter, SessionState};
    use crate::aggregation::set::AggregatorSet;
    use crate::aggregation::shard::owns;
    use crate::aggregation::symbol::SymbolAggregator;
    use crate::clock::ManualClock;
    use crate::trading_core::position::{MarketSignal, PositionMode, SignalHook};
    use crate::types::Trade;

    struct AlwaysLong;

    impl SignalHook for AlwaysLong {
        fn next_position_mode(
            &self,
            _current: PositionMode,
            _signal: MarketSignal,
            _bars: &SymbolAggregator,
        ) -> PositionMode {
            PositionMode::LongEntered
        }
    }

    fn session(initial: SessionState) -> Arc<Mutex<SessionRunner>> {
        Arc::new(Mutex::new(SessionRunner::new(
            AggregatorSet::default(),
            Box::new(NoopExporter),
            initial,
        )))
    }

    fn trade(t: i64, symbol: &str) -> MarketEvent {
        MarketEvent::Trade(Trade::new(t, symbol, 10.0, 1.0))
    }

    #[tokio::test]
    async fn test_ingest_applies_and_feeds_positions() {
        let runner = session(SessionState::Active);
        let clock = Arc::new(ManualClock::new(0));
        let book = Arc::new(Mutex::new(PositionBook::new(1.0, 300, Arc::new(AlwaysLong), clock)));

        let (tx, rx) = mpsc::channel(16);
        tx.send(trade(0, "AAA")).await.unwrap();
        tx.send(trade(60, "AAA")).await.unwrap();
        tx.send(trade(0, "BBB")).await.unwrap();
        drop(tx);

        let stats = run_ingest_loop(rx, ShardRouter::single(), runner.clone(), Some(book.clone())).await;
        assert_eq!(stats.received, 3);
        assert_eq!(stats.applied, 3);
        assert_eq!(runner.lock().await.aggregators().len(), 2);

        let book = book.lock().await;
        assert_eq!(book.len(), 2);
        assert_eq!(book.engine("AAA").map(|e| e.mode()), Some(PositionMode::LongEntered));
    }

    #[tokio::test]
    async fn test_ingest_drops_foreign_shard_and_inactive() {
        let symbols = ["AAPL", "MSFT", "NVDA", "TSLA", "SPY", "QQQ"];
        let router = ShardRouter::new(1, 2).unwrap();
        let owned = symbols.iter().filter(|s| owns(s, 1, 2)).count() as u64;

        let runner = session(SessionState::Active);
        let (tx, rx) = mpsc::channel(16);
        for s in symbols {
            tx.send(trade(0, s)).await.unwrap();
        }
        drop(tx);
        let stats = run_ingest_loop(rx, router, runner.clone(), None).await;
        assert_eq!(stats.filtered, symbols.len() as u64 - owned);
        assert_eq!(stats.applied, owned);
        assert_eq!(runner.lock().await.aggregators().len() as u64, owned);

        let closed = session(SessionState::Inactive);
        let (tx, rx) = mpsc::channel(4);
        tx.send(trade(0, "AAA")).await.unwrap();
        drop(tx);
        let stats = run_ingest_loop(rx, ShardRouter::single(), closed.clone(), None).await;
        assert_eq!(stats.inactive, 1);
        assert!(closed.lock().await.aggregators().is_empty());
    }

    /// Flips between long and flat on every evaluation
    struct Toggle;

    impl SignalHook for Toggle {
        fn next_position_mode(
            &self,
            current: PositionMode,
            _signal: MarketSignal,
            _bars: &SymbolAggregator,
        ) -> PositionMode {
            match current {
                PositionMode::LongEntered => PositionMode::NoPosition,
                _ => PositionMode::LongEntered,
            }
        }
    }

    #[tokio::test]
    async fn test_minute_ticker_evaluates_and_stops() {
        let clock = Arc::new(ManualClock::new(0));
        let book = Arc::new(Mutex::new(PositionBook::new(1.0, 300, Arc::new(Toggle), clock.clone())));

        // Ingestion evaluates minute 0
        book.lock().await.on_event(&trade(0, "AAA")).unwrap();
        assert_eq!(
            book.lock().await.engine("AAA").map(|e| e.mode()),
            Some(PositionMode::LongEntered)
        );

        // The ticker evaluates minute 1 without any new data
        clock.advance(60);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_minute_ticker(book.clone(), Duration::from_millis(5), shutdown_rx);
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let guard = book.lock().await;
        assert_eq!(guard.engine("AAA").map(|e| e.mode()), Some(PositionMode::NoPosition));
    }

    #[tokio::test]
    async fn test_heartbeat_stops_on_shutdown() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_heartbeat(session(SessionState::Active), Duration::from_millis(5), shutdown_rx);
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).unwrap();
        join_logged("heartbeat", handle).await;
    }
}
