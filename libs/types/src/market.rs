//! Depth and ticker payloads
//!
//! Produced by collaborators outside the aggregation engine and pushed
//! unchanged on the `depth`, `ticker` and `stats_24h` channels.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::Symbol;

/// A single aggregated price level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// A snapshot of the order book depth at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthSnapshot {
    pub symbol: Symbol,
    /// Bids in descending price order (best first).
    pub bids: Vec<PriceLevel>,
    /// Asks in ascending price order (best first).
    pub asks: Vec<PriceLevel>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl DepthSnapshot {
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Bids strictly descending, asks strictly ascending, book not crossed.
    pub fn is_ordered(&self) -> bool {
        let bids_desc = self.bids.windows(2).all(|w| w[0].price > w[1].price);
        let asks_asc = self.asks.windows(2).all(|w| w[0].price < w[1].price);
        let uncrossed = match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price < ask.price,
            _ => true,
        };
        bids_desc && asks_asc && uncrossed
    }
}

/// Rolling ticker statistics for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub symbol: Symbol,
    pub last_price: Decimal,
    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl Ticker {
    /// Percentage change from open to last, `None` when open is zero.
    pub fn price_change_percent(&self) -> Option<Decimal> {
        if self.open_price.is_zero() {
            return None;
        }
        Some((self.last_price - self.open_price) / self.open_price * Decimal::ONE_HUNDRED)
    }
}
