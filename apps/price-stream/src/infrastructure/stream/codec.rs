//! Stream Codec Module
//!
//! Encoding and decoding for the market data WebSocket stream.
//!
//! The stream speaks single JSON objects with a `type` discriminator:
//!
//! ```json
//! {"type":"price_update","symbol":"BTC-USD","price":50000,"change24h":1200}
//! ```
//!
//! Keep-alive is application level: the client sends `{"type":"ping"}`
//! and the server answers `{"type":"pong"}`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::price::PriceUpdate;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Message was valid JSON but not an object.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    /// A price tick was missing a required field.
    #[error("price tick missing field: {0}")]
    MissingField(&'static str),
}

/// Wire shape of a price tick.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceTickFrame {
    symbol: String,
    price: Decimal,
    #[serde(default)]
    change24h: Option<Decimal>,
    #[serde(default)]
    change_percent24h: Option<Decimal>,
    #[serde(default)]
    high24h: Option<Decimal>,
    #[serde(default)]
    low24h: Option<Decimal>,
    #[serde(default)]
    volume24h: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    timestamp: Option<DateTime<Utc>>,
}

/// Accept RFC 3339 timestamps and naive ISO 8601 ones (the backend
/// stamps ticks without a timezone offset; those are UTC). Anything
/// unparseable becomes `None`, so the merge falls back to the local
/// observation time instead of dropping the tick.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| raw.parse::<chrono::NaiveDateTime>().ok().map(|n| n.and_utc()))
}

impl From<PriceTickFrame> for PriceUpdate {
    fn from(frame: PriceTickFrame) -> Self {
        Self {
            symbol: frame.symbol,
            price: frame.price,
            change_24h: frame.change24h,
            change_percent_24h: frame.change_percent24h,
            high_24h: frame.high24h,
            low_24h: frame.low24h,
            volume_24h: frame.volume24h,
            timestamp: frame.timestamp,
        }
    }
}

/// JSON codec for the price stream.
#[derive(Debug, Default, Clone)]
pub struct TickCodec;

impl TickCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// Returns `Ok(Some(update))` for a price tick, `Ok(None)` for
    /// control frames (`pong`, `ping`, `subscribed`) and unknown types.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON parsing fails, the frame is not an
    /// object, or a price tick lacks `symbol` or `price`.
    pub fn decode(&self, text: &str) -> Result<Option<PriceUpdate>, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text.trim())?;

        let Some(object) = value.as_object() else {
            // Truncate on char boundaries; frames may carry multibyte text.
            let preview: String = text.trim().chars().take(50).collect();
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {preview}..."
            )));
        };

        match object.get("type").and_then(|v| v.as_str()) {
            Some("price_update" | "price_tick" | "priceTick") => {
                if !object.contains_key("symbol") {
                    return Err(CodecError::MissingField("symbol"));
                }
                if !object.contains_key("price") {
                    return Err(CodecError::MissingField("price"));
                }
                let frame: PriceTickFrame = serde_json::from_value(value)?;
                Ok(Some(frame.into()))
            }
            // Control traffic carries no price data.
            Some("pong" | "ping" | "subscribed") => Ok(None),
            Some(other) => {
                tracing::trace!(message_type = other, "ignoring unknown stream frame");
                Ok(None)
            }
            None => Err(CodecError::MissingField("type")),
        }
    }

    /// Encode the keep-alive ping frame.
    #[must_use]
    pub fn encode_ping(&self) -> String {
        r#"{"type":"ping"}"#.to_string()
    }
}
