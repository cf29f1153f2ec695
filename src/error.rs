//! Error types for the aggregation core

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Per-event aggregation errors. None of these are fatal to the process:
/// callers log them and drop the offending event.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregationError {
    #[error("symbol mismatch: aggregator for {expected} received an event for {actual}")]
    SymbolMismatch { expected: String, actual: String },

    #[error("no bars retained for {symbol}")]
    EmptyHistory { symbol: String },

    #[error("gap fill for {symbol} needs {gap_minutes} buckets, above the cap of {cap}")]
    FillRunaway {
        symbol: String,
        gap_minutes: i64,
        cap: usize,
    },

    #[error("event for {symbol} at {time} is older than retained history starting {oldest}")]
    StaleEvent {
        symbol: String,
        time: DateTime<Utc>,
        oldest: DateTime<Utc>,
    },
}

/// Invalid shard parameters
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShardError {
    #[error("shard count must be at least 1")]
    ZeroShards,

    #[error("shard id {shard_id} is out of range for {shard_count} shards")]
    ShardOutOfRange { shard_id: u32, shard_count: u32 },
}

/// Provider message translation errors
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unrecognized message shape: {0}")]
    UnknownShape(String),

    #[error("field {field} is not a number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid timestamp: {0} ms")]
    InvalidTimestamp(i64),
}
