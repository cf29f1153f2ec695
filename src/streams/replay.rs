//! Line-delimited provider feed from stdin or a file
//!
//! Each line holds provider JSON (see [`super::messages`]). Files ending in
//! `.zst` are decompressed on the fly.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::decode_events;
use crate::types::MarketEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    Stdin,
    File(PathBuf),
}

impl FeedSource {
    /// `-` means stdin
    pub fn parse(input: &str) -> Self {
        if input == "-" {
            FeedSource::Stdin
        } else {
            FeedSource::File(PathBuf::from(input))
        }
    }
}

/// Counters for one feed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub lines: u64,
    pub events: u64,
    /// Unparsable lines plus malformed messages inside parsable ones
    pub rejected: u64,
}

fn is_zstd(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "zst")
}

fn open_reader(source: &FeedSource) -> Result<Box<dyn BufRead + Send>> {
    match source {
        FeedSource::Stdin => Ok(Box::new(BufReader::new(std::io::stdin()))),
        FeedSource::File(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open feed file: {:?}", path))?;
            if is_zstd(path) {
                let decoder = zstd::stream::Decoder::new(file)
                    .with_context(|| format!("Failed to create zstd decoder for: {:?}", path))?;
                Ok(Box::new(BufReader::new(decoder)))
            } else {
                Ok(Box::new(BufReader::new(file)))
            }
        }
    }
}

/// Decode every line and push events into `tx`. Stops early when the
/// receiver is gone.
pub fn pump_lines(reader: impl BufRead, tx: &mpsc::Sender<MarketEvent>) -> Result<FeedStats> {
    let mut stats = FeedStats::default();
    for line in reader.lines() {
        let line = line.context("Failed to read feed line")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.lines += 1;

        let decoded = match decode_events(line) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Skipping feed line {}: {}", stats.lines, e);
                stats.rejected += 1;
                continue;
            }
        };
        for e in &decoded.errors {
            warn!("Skipping message on feed line {}: {}", stats.lines, e);
        }
        stats.rejected += decoded.errors.len() as u64;

        for event in decoded.events {
            if tx.blocking_send(event).is_err() {
                debug!("Event receiver closed, stopping feed");
                return Ok(stats);
            }
            stats.events += 1;
        }
    }
    Ok(stats)
}

/// Run a feed to completion on the blocking pool
pub async fn run_feed(source: FeedSource, tx: mpsc::Sender<MarketEvent>) -> Result<FeedStats> {
    info!("Reading feed from {:?}", source);
    let reader = open_reader(&source)?;
    let stats = tokio::task::spawn_blocking(move || pump_lines(reader, &tx))
        .await
        .context("Feed task panicked")??;
    info!(
        "Feed finished: {} lines, {} events, {} rejected",
        stats.lines, stats.events, stats.rejected
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    const LINES: &str = concat!(
        r#"{"ev":"T","sym":"AAA","p":10.0,"s":1,"t":60000}"#,
        "\n\n",
        "not json\n",
        r#"[{"ev":"T","sym":"BBB","p":2.0,"s":1,"t":61000},{"ev":"status","status":"ok"}]"#,
        "\n",
        r#"[{"ev":"T","sym":"CCC","p":3.0,"t":62000},{"ev":"T","sym":"DDD","p":4.0,"s":1,"t":62000}]"#,
        "\n",
    );

    #[test]
    fn test_feed_source_parse() {
        assert_eq!(FeedSource::parse("-"), FeedSource::Stdin);
        assert_eq!(
            FeedSource::parse("data/feed.ndjson"),
            FeedSource::File(PathBuf::from("data/feed.ndjson"))
        );
        assert!(is_zstd(Path::new("feed.ndjson.zst")));
        assert!(!is_zstd(Path::new("feed.ndjson")));
    }

    #[test]
    fn test_pump_lines_counts() {
        let (tx, mut rx) = mpsc::channel(16);
        let stats = pump_lines(Cursor::new(LINES), &tx).unwrap();
        assert_eq!(
            stats,
            FeedStats {
                lines: 4,
                events: 3,
                rejected: 2
            }
        );
        assert_eq!(rx.try_recv().unwrap().symbol(), "AAA");
        assert_eq!(rx.try_recv().unwrap().symbol(), "BBB");
        // CCC lacks a size, its neighbour still goes through
        assert_eq!(rx.try_recv().unwrap().symbol(), "DDD");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_pump_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let stats = pump_lines(Cursor::new(LINES), &tx).unwrap();
        assert_eq!(stats.events, 0);
    }

    #[tokio::test]
    async fn test_run_feed_zstd_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.ndjson.zst");
        let compressed = zstd::encode_all(LINES.as_bytes(), 3).unwrap();
        File::create(&path).unwrap().write_all(&compressed).unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let stats = run_feed(FeedSource::File(path), tx).await.unwrap();
        assert_eq!(stats.events, 3);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_run_feed_missing_file() {
        let (tx, _rx) = mpsc::channel(1);
        let result = run_feed(FeedSource::File(PathBuf::from("/nonexistent/feed")), tx).await;
        assert!(result.is_err());
    }
}
