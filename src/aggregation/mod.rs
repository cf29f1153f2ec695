//! Streaming minute-bar aggregation
//!
//! - `symbol`: one symbol's gap-free minute ladder
//! - `set`: symbol routing and export tables
//! - `session`: Active/Inactive day lifecycle
//! - `shard`: hash partitioning of symbols across processes

pub mod session;
pub mod set;
pub mod shard;
pub mod symbol;

pub use session::{IngestOutcome, NoopExporter, SessionExporter, SessionRunner, SessionState};
pub use set::{AggregatorSet, StatusSummary};
pub use shard::{owns, symbol_hash, ShardRouter};
pub use symbol::{BarField, SymbolAggregator, DEFAULT_MAX_BARS, MAX_SNAPSHOT_FILL};
