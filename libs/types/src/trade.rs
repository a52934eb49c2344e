//! Trade inputs and outputs
//!
//! `TradeTick` is what the aggregation engine consumes. `PublicTrade` is the
//! payload pushed on the `trade` channel; it carries no order or account
//! references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::AggregationError;
use crate::ids::Symbol;

/// Trade side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Case-insensitive lookup ("buy", "BUY", "Sell", ...).
    pub fn from_code(code: &str) -> Option<Self> {
        if code.eq_ignore_ascii_case("buy") {
            Some(Side::Buy)
        } else if code.eq_ignore_ascii_case("sell") {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

/// A single executed trade as seen by the aggregation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeTick {
    pub symbol: Symbol,
    pub price: Decimal,
    pub quantity: Decimal,
    pub trade_time: DateTime<Utc>,
}

impl TradeTick {
    pub fn new(symbol: Symbol, price: Decimal, quantity: Decimal, trade_time: DateTime<Utc>) -> Self {
        Self {
            symbol,
            price,
            quantity,
            trade_time,
        }
    }

    /// Price must be positive, quantity non-negative.
    pub fn validate(&self) -> Result<(), AggregationError> {
        if self.price <= Decimal::ZERO {
            return Err(AggregationError::InvalidTrade {
                reason: format!("non-positive price {}", self.price),
            });
        }
        if self.quantity < Decimal::ZERO {
            return Err(AggregationError::InvalidTrade {
                reason: format!("negative quantity {}", self.quantity),
            });
        }
        Ok(())
    }

    /// Trade value (price × quantity).
    pub fn notional(&self) -> Result<Decimal, AggregationError> {
        self.price
            .checked_mul(self.quantity)
            .ok_or_else(|| AggregationError::InvalidTrade {
                reason: format!("notional overflows at price {} quantity {}", self.price, self.quantity),
            })
    }
}

/// A public trade event for broadcasting to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicTrade {
    pub trade_id: String,
    pub symbol: Symbol,
    pub price: Decimal,
    pub quantity: Decimal,
    /// Trade value (price × quantity).
    pub amount: Decimal,
    /// Side of the aggressor, the opposite of the resting maker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taker_side: Option<Side>,
    /// Execution time, epoch milliseconds.
    pub timestamp: i64,
}

impl PublicTrade {
    pub fn from_tick(
        trade_id: impl Into<String>,
        tick: &TradeTick,
        taker_side: Option<Side>,
    ) -> Result<Self, AggregationError> {
        Ok(Self {
            trade_id: trade_id.into(),
            symbol: tick.symbol.clone(),
            price: tick.price,
            quantity: tick.quantity,
            amount: tick.notional()?,
            taker_side,
            timestamp: tick.trade_time.timestamp_millis(),
        })
    }
}
