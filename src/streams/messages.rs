//! Provider message translation
//!
//! Decodes Binance kline and Polygon trade/aggregate JSON into
//! [`MarketEvent`]s. One feed line may hold a single message, an array of
//! messages, or a JSON string wrapping either (pub/sub payloads arrive
//! double-encoded).

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::MessageError;
use crate::types::{Bar, MarketEvent, TimedBar, Trade};

/// Nesting allowed for string-wrapped payloads
const MAX_ENCODING_DEPTH: usize = 3;

/// Numeric field that may arrive as a JSON number or a decimal string
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Decimal {
    Number(f64),
    Text(String),
}

impl Decimal {
    fn parse(&self, field: &'static str) -> Result<f64, MessageError> {
        let value = match self {
            Decimal::Number(n) => *n,
            Decimal::Text(s) => s.trim().parse::<f64>().map_err(|_| MessageError::InvalidNumber {
                field,
                value: s.clone(),
            })?,
        };
        if !value.is_finite() {
            return Err(MessageError::InvalidNumber {
                field,
                value: value.to_string(),
            });
        }
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinanceKline {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "o")]
    pub open: Decimal,
    #[serde(rename = "h")]
    pub high: Decimal,
    #[serde(rename = "l")]
    pub low: Decimal,
    #[serde(rename = "c")]
    pub close: Decimal,
    #[serde(rename = "v")]
    pub volume: Decimal,
    /// Kline start time (ms)
    #[serde(rename = "t")]
    pub start_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "e")]
pub enum BinanceMessage {
    #[serde(rename = "kline")]
    Kline {
        #[serde(rename = "k")]
        kline: BinanceKline,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PolygonTrade {
    #[serde(rename = "sym")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price: f64,
    #[serde(rename = "s")]
    pub size: f64,
    #[serde(rename = "t")]
    pub timestamp_ms: i64,
}

/// Per-second aggregate, ingested as a trade at its close
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PolygonAggregate {
    #[serde(rename = "sym")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v")]
    pub volume: f64,
    #[serde(rename = "s")]
    pub start_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PolygonMinuteAggregate {
    #[serde(rename = "sym")]
    pub symbol: String,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v")]
    pub volume: f64,
    #[serde(rename = "s")]
    pub start_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "ev")]
pub enum PolygonMessage {
    #[serde(rename = "T")]
    Trade(PolygonTrade),
    #[serde(rename = "A")]
    Aggregate(PolygonAggregate),
    #[serde(rename = "AM")]
    MinuteAggregate(PolygonMinuteAggregate),
    #[serde(rename = "Q")]
    Quote {
        #[serde(rename = "sym", default)]
        symbol: Option<String>,
    },
    #[serde(rename = "status")]
    Status {
        #[serde(default)]
        status: String,
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Binance(BinanceMessage),
    Polygon(PolygonMessage),
}

fn ms_to_seconds(ms: i64) -> Result<i64, MessageError> {
    if ms < 0 {
        return Err(MessageError::InvalidTimestamp(ms));
    }
    Ok(ms / 1000)
}

impl InboundMessage {
    /// Translate into a market event. Control and unsupported messages are
    /// logged and yield `None`.
    pub fn into_event(self) -> Result<Option<MarketEvent>, MessageError> {
        match self {
            InboundMessage::Binance(BinanceMessage::Kline { kline }) => {
                let bar = Bar::new(
                    kline.symbol,
                    kline.open.parse("o")?,
                    kline.high.parse("h")?,
                    kline.low.parse("l")?,
                    kline.close.parse("c")?,
                    kline.volume.parse("v")?,
                );
                let seconds = ms_to_seconds(kline.start_ms)?;
                Ok(Some(MarketEvent::Bar(TimedBar::at_epoch_seconds(seconds, bar))))
            }
            InboundMessage::Binance(BinanceMessage::Unknown) => {
                warn!("Skipping unsupported Binance event");
                Ok(None)
            }
            InboundMessage::Polygon(PolygonMessage::Trade(t)) => Ok(Some(MarketEvent::Trade(
                Trade::new(ms_to_seconds(t.timestamp_ms)?, t.symbol, t.price, t.size),
            ))),
            InboundMessage::Polygon(PolygonMessage::Aggregate(a)) => Ok(Some(MarketEvent::Trade(
                Trade::new(ms_to_seconds(a.start_ms)?, a.symbol, a.close, a.volume),
            ))),
            InboundMessage::Polygon(PolygonMessage::MinuteAggregate(am)) => {
                let seconds = ms_to_seconds(am.start_ms)?;
                let bar = Bar::new(am.symbol, am.open, am.high, am.low, am.close, am.volume);
                Ok(Some(MarketEvent::Bar(TimedBar::at_epoch_seconds(seconds, bar))))
            }
            InboundMessage::Polygon(PolygonMessage::Quote { symbol }) => {
                debug!("Ignoring quote for {}", symbol.as_deref().unwrap_or("?"));
                Ok(None)
            }
            InboundMessage::Polygon(PolygonMessage::Status { status, message }) => {
                info!("Provider status: {} {}", status, message);
                Ok(None)
            }
            InboundMessage::Polygon(PolygonMessage::Unknown) => {
                warn!("Skipping unsupported Polygon event");
                Ok(None)
            }
        }
    }
}

fn classify(value: Value) -> Result<InboundMessage, MessageError> {
    let Value::Object(map) = &value else {
        return Err(MessageError::UnknownShape(value.to_string()));
    };
    // Polygon aggregates carry an "e" (end time) field too
    if map.contains_key("ev") {
        return Ok(InboundMessage::Polygon(serde_json::from_value(value)?));
    }
    if map.contains_key("e") {
        return Ok(InboundMessage::Binance(serde_json::from_value(value)?));
    }
    Err(MessageError::UnknownShape(value.to_string()))
}

/// Decode one feed line into provider messages.
///
/// Only an unparsable line fails as a whole. Each element of an array is
/// classified on its own, so one malformed record does not hide the rest.
pub fn decode_line(line: &str) -> Result<Vec<Result<InboundMessage, MessageError>>, MessageError> {
    let mut value: Value = serde_json::from_str(line)?;
    for _ in 0..MAX_ENCODING_DEPTH {
        match value {
            Value::String(inner) => value = serde_json::from_str(&inner)?,
            _ => break,
        }
    }

    match value {
        Value::Array(items) => Ok(items.into_iter().map(classify).collect()),
        other => Ok(vec![classify(other)]),
    }
}

/// Market events of one line plus the messages that were rejected
#[derive(Debug, Default)]
pub struct DecodedLine {
    pub events: Vec<MarketEvent>,
    pub errors: Vec<MessageError>,
}

/// Decode a line straight to market events, skipping control messages
pub fn decode_events(line: &str) -> Result<DecodedLine, MessageError> {
    let mut decoded = DecodedLine::default();
    for message in decode_line(line)? {
        match message.and_then(InboundMessage::into_event) {
            Ok(Some(event)) => decoded.events.push(event),
            Ok(None) => {}
            Err(e) => decoded.errors.push(e),
        }
    }
    Ok(decoded)
}
