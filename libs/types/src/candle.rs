//! OHLCV candle
//!
//! A candle is identified by (symbol, interval, open_time). Prices and
//! volumes are `Decimal` and serialize as strings; times are epoch seconds.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::AggregationError;
use crate::ids::{CandleId, Symbol};
use crate::interval::{Bucket, KlineInterval};

/// Natural key of a candle: one per (symbol, interval, bucket).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleKey {
    pub symbol: Symbol,
    pub interval: KlineInterval,
    pub open_time: i64,
}

impl CandleKey {
    pub fn new(symbol: Symbol, interval: KlineInterval, open_time: i64) -> Self {
        Self {
            symbol,
            interval,
            open_time,
        }
    }

    /// Hot cache key: `market:kline:{symbol}:{interval}:{openTime}`.
    pub fn cache_key(&self) -> String {
        format!(
            "market:kline:{}:{}:{}",
            self.symbol,
            self.interval.code(),
            self.open_time
        )
    }
}

impl fmt::Display for CandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.symbol, self.interval, self.open_time)
    }
}

/// A single OHLCV candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    /// Assigned by the durable store on first insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CandleId>,
    pub symbol: Symbol,
    pub interval: KlineInterval,
    pub open_time: i64,
    pub close_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub quote_amount: Decimal,
    pub trade_count: u64,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Candle {
    /// Seed an empty candle for a bucket. All four prices start at the
    /// first trade's price; volume, amount and count start at zero and are
    /// filled in by [`Candle::apply_trade`].
    pub fn open_bucket(
        symbol: Symbol,
        interval: KlineInterval,
        bucket: Bucket,
        price: Decimal,
    ) -> Self {
        Self {
            id: None,
            symbol,
            interval,
            open_time: bucket.open_time,
            close_time: bucket.close_time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: Decimal::ZERO,
            quote_amount: Decimal::ZERO,
            trade_count: 0,
            completed: false,
            created_at: None,
            updated_at: None,
        }
    }

    /// Fold one trade into the candle. On overflow the candle is left
    /// unchanged.
    pub fn apply_trade(&mut self, price: Decimal, quantity: Decimal) -> Result<(), AggregationError> {
        let overflow = |what: &str| AggregationError::InvalidTrade {
            reason: format!("{what} overflows at price {price} quantity {quantity}"),
        };
        let volume = self
            .volume
            .checked_add(quantity)
            .ok_or_else(|| overflow("volume"))?;
        let quote_amount = price
            .checked_mul(quantity)
            .and_then(|amount| self.quote_amount.checked_add(amount))
            .ok_or_else(|| overflow("quote amount"))?;

        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;
        self.volume = volume;
        self.quote_amount = quote_amount;
        self.trade_count += 1;
        Ok(())
    }

    pub fn key(&self) -> CandleKey {
        CandleKey::new(self.symbol.clone(), self.interval, self.open_time)
    }

    /// Check OHLC consistency.
    pub fn is_valid(&self) -> bool {
        self.high >= self.open
            && self.high >= self.close
            && self.high >= self.low
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= Decimal::ZERO
            && self.quote_amount >= Decimal::ZERO
            && self.close_time > self.open_time
    }
}
