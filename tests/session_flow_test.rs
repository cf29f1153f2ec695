use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use bar_miner::aggregation::{AggregatorSet, SessionRunner, SessionState, ShardRouter};
use bar_miner::export::{CsvExporter, DAILY_FILE, MINUTE_FILE};
use bar_miner::streams::{run_feed, run_ingest_loop, FeedSource};
use bar_miner::types::DailyRow;
use tokio::sync::{mpsc, Mutex};

const FEED: &str = r#"{"ev":"status","status":"connected","message":"Connected Successfully"}
{"ev":"T","sym":"AAPL","p":100.0,"s":10,"t":1710336600000}
{"ev":"T","sym":"AAPL","p":101.5,"s":5,"t":1710336630000}
{"ev":"T","sym":"AAPL","p":99.0,"s":5,"t":1710336780000}
"{\"ev\":\"T\",\"sym\":\"MSFT\",\"p\":400.0,\"s\":1,\"t\":1710336600000}"
{"e":"kline","E":1710336605000,"s":"BTCUSDT","k":{"t":1710336600000,"s":"BTCUSDT","o":"70000.0","h":"70100.0","l":"69900.0","c":"70050.0","v":"12.5"}}
{"e":"kline","E":1710336625000,"s":"BTCUSDT","k":{"t":1710336600000,"s":"BTCUSDT","o":"70000.0","h":"70200.0","l":"69900.0","c":"70150.0","v":"20.0"}}
garbage
"#;

#[tokio::test]
async fn test_feed_to_csv_end_of_day() {
    let dir = tempfile::tempdir().unwrap();
    let feed_path = dir.path().join("feed.ndjson");
    File::create(&feed_path)
        .unwrap()
        .write_all(FEED.as_bytes())
        .unwrap();

    let export_dir = dir.path().join("data");
    let session = Arc::new(Mutex::new(SessionRunner::new(
        AggregatorSet::default(),
        Box::new(CsvExporter::new(export_dir.clone())),
        SessionState::Active,
    )));

    let (tx, rx) = mpsc::channel(8);
    let feed = tokio::spawn(run_feed(FeedSource::File(feed_path), tx));
    let stats = run_ingest_loop(rx, ShardRouter::single(), session.clone(), None).await;
    let feed_stats = feed.await.unwrap().unwrap();

    assert_eq!(feed_stats.rejected, 1);
    assert_eq!(stats.received, 6);
    assert_eq!(stats.applied, 6);

    {
        let runner = session.lock().await;
        let aapl = runner.aggregators().get("AAPL").unwrap();
        // 13:30, 13:31 (filled), 13:32 (filled), 13:33 UTC
        assert_eq!(aapl.len(), 4);
        let btc = runner.aggregators().get("BTCUSDT").unwrap();
        assert_eq!(btc.len(), 1);
        assert_eq!(btc.last_close(), Some(70150.0));
        assert_eq!(btc.bars()[0].bar.volume, 20.0);
    }

    session.lock().await.end_day().unwrap();
    assert!(session.lock().await.aggregators().is_empty());

    let minute_csv = std::fs::read_to_string(export_dir.join(MINUTE_FILE)).unwrap();
    // header + 4 AAPL + 1 BTCUSDT + 1 MSFT
    assert_eq!(minute_csv.lines().count(), 7);

    let mut reader = csv::Reader::from_path(export_dir.join(DAILY_FILE)).unwrap();
    let daily: Vec<DailyRow> = reader.deserialize().collect::<Result<_, _>>().unwrap();
    let symbols: Vec<&str> = daily.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["AAPL", "BTCUSDT", "MSFT"]);

    let aapl = &daily[0];
    assert_eq!(aapl.date.to_string(), "2024-03-13");
    assert_eq!(
        (aapl.open, aapl.high, aapl.low, aapl.close, aapl.volume),
        (100.0, 101.5, 99.0, 99.0, 20.0)
    );
}

#[tokio::test]
async fn test_inactive_session_ignores_feed() {
    let dir = tempfile::tempdir().unwrap();
    let feed_path = dir.path().join("feed.ndjson");
    File::create(&feed_path)
        .unwrap()
        .write_all(FEED.as_bytes())
        .unwrap();

    let session = Arc::new(Mutex::new(SessionRunner::new(
        AggregatorSet::default(),
        Box::new(CsvExporter::new(dir.path().join("data"))),
        SessionState::Inactive,
    )));
    let (tx, rx) = mpsc::channel(8);
    let feed = tokio::spawn(run_feed(FeedSource::File(feed_path), tx));
    let stats = run_ingest_loop(rx, ShardRouter::single(), session.clone(), None).await;
    feed.await.unwrap().unwrap();

    assert_eq!(stats.inactive, 6);
    // Nothing to flush, nothing written
    session.lock().await.end_day().unwrap();
    assert!(!dir.path().join("data").exists());
}
