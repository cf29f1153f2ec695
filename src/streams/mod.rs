//! Feeds and background tasks around the aggregation core

pub mod ingest;
pub mod messages;
pub mod replay;
pub mod scheduler;

pub use ingest::{run_ingest_loop, spawn_heartbeat, spawn_minute_ticker, IngestStats};
pub use messages::{decode_events, decode_line, DecodedLine, InboundMessage};
pub use replay::{run_feed, FeedSource, FeedStats};
pub use scheduler::{apply_schedule, spawn_scheduler, ScheduleTransition, SchedulerConfig};
