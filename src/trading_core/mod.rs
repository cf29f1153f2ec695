//! Trading Core - position state machine on top of the minute ladders
//!
//! - `position`: per-symbol engine, signal hook and action derivation
//! - `book`: symbol routing and the periodic minute tick

pub mod book;
pub mod position;

// Re-export commonly used types
pub use book::{PositionBook, PositionUpdate};
pub use position::{
    derive_action, Entry, MarketSignal, NoSignalHook, PositionEngine, PositionMode, SignalHook,
    TradingAction,
};
