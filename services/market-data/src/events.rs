//! Upstream trade execution events
//!
//! The matching engine emits one `TRADE_EXECUTED` event per fill. Prices,
//! quantities and fees travel as decimal strings; symbols use the
//! `BASE/QUOTE` form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use types::trade::Side;

pub const TRADE_EXECUTED: &str = "TRADE_EXECUTED";

/// Envelope of a trade execution event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeExecutedEvent {
    pub event_id: String,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_version: Option<String>,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub payload: TradePayload,
}

/// Fill details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradePayload {
    pub trade_id: String,
    /// `BASE/QUOTE`, e.g. "BTC/USDT".
    pub symbol: String,
    pub price: String,
    pub quantity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_fee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_fee: Option<String>,
    /// "BUY" or "SELL"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maker_side: Option<String>,
    /// Execution time. Falls back to the envelope timestamp when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TradeExecutedEvent {
    pub fn is_trade_executed(&self) -> bool {
        self.event_type == TRADE_EXECUTED
    }

    pub fn trade_time(&self) -> DateTime<Utc> {
        self.payload.timestamp.unwrap_or(self.timestamp)
    }

    /// The aggressor is the opposite of the maker.
    pub fn taker_side(&self) -> Option<Side> {
        self.payload
            .maker_side
            .as_deref()
            .and_then(Side::from_code)
            .map(|maker| maker.opposite())
    }
}
