use anyhow::{anyhow, Context, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, info, warn};

use bar_miner::aggregation::{
    AggregatorSet, NoopExporter, SessionExporter, SessionRunner, SessionState, ShardRouter,
};
use bar_miner::clock::{Clock, SystemClock};
use bar_miner::config::{EngineConfig, SessionSchedule};
use bar_miner::export::CsvExporter;
use bar_miner::streams::ingest::join_logged;
use bar_miner::streams::{
    run_feed, run_ingest_loop, spawn_heartbeat, spawn_minute_ticker, spawn_scheduler, FeedSource,
    SchedulerConfig,
};
use bar_miner::trading_core::{NoSignalHook, PositionBook};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Provider feed (NDJSON, optionally .zst). `-` reads stdin
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Directory for minute.csv and daily.csv
    #[arg(long, default_value = "data", env = "EXPORT_DIR")]
    export_dir: PathBuf,

    /// Clear state at end of day without writing files
    #[arg(long)]
    no_export: bool,

    /// This process's shard
    #[arg(long, default_value = "0", env = "SHARD_ID")]
    shard_id: u32,

    /// Total number of shards
    #[arg(long, default_value = "1", env = "SHARD_COUNT")]
    shard_count: u32,

    /// Retained minute bars per symbol
    #[arg(long, default_value = "300")]
    max_bars: usize,

    /// Session open, local time (HH:MM:SS)
    #[arg(long, default_value = "09:30:00")]
    session_start: String,

    /// Session close, local time (HH:MM:SS)
    #[arg(long, default_value = "16:00:00")]
    session_end: String,

    /// IANA timezone of the session hours
    #[arg(long, default_value = "America/New_York")]
    timezone: String,

    /// Ignore the schedule and keep the session open
    #[arg(long)]
    always_on: bool,

    /// Open the session on Saturday and Sunday too
    #[arg(long)]
    include_weekends: bool,

    /// Write the daily table on every schedule poll
    #[arg(long)]
    daily_checkpoint: bool,

    /// Run the position state machine
    #[arg(long)]
    positions: bool,

    /// Position size per symbol
    #[arg(long, default_value = "100")]
    position_size: f64,

    /// Minute ticker poll interval (seconds)
    #[arg(long, default_value = "10")]
    tick_secs: u64,

    /// Heartbeat log interval (minutes)
    #[arg(long, default_value = "30")]
    heartbeat_mins: u64,

    /// Session schedule poll interval (seconds)
    #[arg(long, default_value = "60")]
    schedule_poll_secs: u64,

    /// Event channel capacity
    #[arg(long, default_value = "10000")]
    channel_capacity: usize,
}

fn parse_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .with_context(|| format!("Invalid time of day: {}", value))
}

impl Args {
    fn schedule(&self) -> Result<SessionSchedule> {
        let timezone: Tz = self
            .timezone
            .parse()
            .map_err(|e| anyhow!("Invalid timezone {}: {}", self.timezone, e))?;
        Ok(SessionSchedule {
            start: parse_time(&self.session_start)?,
            end: parse_time(&self.session_end)?,
            timezone,
            skip_weekends: !self.include_weekends,
        })
    }

    fn engine(&self) -> EngineConfig {
        EngineConfig {
            max_bars: self.max_bars,
            position_size: self.position_size,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bar_miner=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let router = ShardRouter::new(args.shard_id, args.shard_count)
        .context("Invalid shard parameters")?;
    let schedule = args.schedule()?;
    let engine = args.engine();

    info!("Starting bar-miner");
    info!("Input: {}", args.input);
    info!("Shard: {}/{}", router.shard_id(), router.shard_count());
    info!("Max bars: {}", engine.max_bars);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let exporter: Box<dyn SessionExporter> = if args.no_export {
        Box::new(NoopExporter)
    } else {
        info!("Export dir: {:?}", args.export_dir);
        Box::new(CsvExporter::new(args.export_dir.clone()))
    };
    let initial = if args.always_on {
        SessionState::Active
    } else {
        SessionState::Inactive
    };
    let session = Arc::new(Mutex::new(SessionRunner::new(
        AggregatorSet::new(engine.max_bars),
        exporter,
        initial,
    )));

    let positions = args.positions.then(|| {
        Arc::new(Mutex::new(PositionBook::new(
            engine.position_size,
            engine.max_bars,
            Arc::new(NoSignalHook),
            clock.clone(),
        )))
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background = Vec::new();

    if !args.always_on {
        let config = SchedulerConfig {
            schedule,
            poll: Duration::from_secs(args.schedule_poll_secs.max(1)),
            daily_checkpoint: args.daily_checkpoint,
        };
        background.push((
            "scheduler",
            spawn_scheduler(
                session.clone(),
                positions.clone(),
                config,
                clock.clone(),
                shutdown_rx.clone(),
            ),
        ));
    }
    if let Some(book) = &positions {
        background.push((
            "minute ticker",
            spawn_minute_ticker(
                book.clone(),
                Duration::from_secs(args.tick_secs.max(1)),
                shutdown_rx.clone(),
            ),
        ));
    }
    background.push((
        "heartbeat",
        spawn_heartbeat(
            session.clone(),
            Duration::from_secs(args.heartbeat_mins.max(1) * 60),
            shutdown_rx.clone(),
        ),
    ));

    let (tx, rx) = mpsc::channel(args.channel_capacity.max(1));
    let source = FeedSource::parse(&args.input);
    let feed = tokio::spawn(async move {
        if let Err(e) = run_feed(source, tx).await {
            error!("Feed error: {:#}", e);
        }
    });
    let mut ingest = tokio::spawn(run_ingest_loop(rx, router, session.clone(), positions.clone()));

    let interrupted = tokio::select! {
        result = &mut ingest => {
            if let Err(e) = result {
                error!("Ingest task failed: {}", e);
            }
            false
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            true
        }
    };

    let _ = shutdown_tx.send(true);
    for (name, handle) in background {
        join_logged(name, handle).await;
    }

    if let Err(e) = session.lock().await.end_day() {
        warn!("Final end of day failed: {:#}", e);
    }
    if let Some(book) = &positions {
        book.lock().await.reset_bars();
    }

    if interrupted {
        // A blocking stdin read cannot be cancelled
        info!("Stopped");
        std::process::exit(0);
    }

    join_logged("feed", feed).await;
    info!("Stopped");
    Ok(())
}
