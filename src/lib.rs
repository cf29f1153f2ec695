// Library crate - exports the aggregation core, position engine and feeds

pub mod aggregation;
pub mod clock;
pub mod config;
pub mod error;
pub mod export;
pub mod streams;
pub mod trading_core;
pub mod types;

// Re-export commonly used types
pub use aggregation::{AggregatorSet, SessionRunner, ShardRouter, SymbolAggregator};
pub use error::{AggregationError, MessageError, ShardError};
pub use types::*;
