//! Subscription topics
//!
//! A topic is `(channel, symbol, optional interval)`. Its string form is
//! `channel:symbol` or `channel:symbol:interval`; an empty interval is the
//! same as no interval.

use std::fmt;

use serde::{Deserialize, Serialize};
use types::ids::Symbol;
use types::interval::KlineInterval;

use crate::protocol::MessageType;

/// Channels available for subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Kline,
    Depth,
    Ticker,
    Trade,
    #[serde(rename = "stats_24h")]
    Stats24h,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Kline,
        Channel::Depth,
        Channel::Ticker,
        Channel::Trade,
        Channel::Stats24h,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Channel::Kline => "kline",
            Channel::Depth => "depth",
            Channel::Ticker => "ticker",
            Channel::Trade => "trade",
            Channel::Stats24h => "stats_24h",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    /// Message type used for push frames on this channel.
    pub fn message_type(&self) -> MessageType {
        match self {
            Channel::Kline => MessageType::Kline,
            Channel::Depth => MessageType::Depth,
            Channel::Ticker => MessageType::Ticker,
            Channel::Trade => MessageType::Trade,
            Channel::Stats24h => MessageType::Stats24h,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Subscription key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic {
    pub channel: Channel,
    pub symbol: Symbol,
    pub interval: Option<String>,
}

impl Topic {
    /// Build a topic; `Some("")` collapses to `None`.
    pub fn new(channel: Channel, symbol: Symbol, interval: Option<String>) -> Self {
        Self {
            channel,
            symbol,
            interval: interval.filter(|i| !i.is_empty()),
        }
    }

    pub fn kline(symbol: Symbol, interval: KlineInterval) -> Self {
        Self::new(Channel::Kline, symbol, Some(interval.code().to_string()))
    }

    pub fn trade(symbol: Symbol) -> Self {
        Self::new(Channel::Trade, symbol, None)
    }

    pub fn depth(symbol: Symbol) -> Self {
        Self::new(Channel::Depth, symbol, None)
    }

    pub fn ticker(symbol: Symbol) -> Self {
        Self::new(Channel::Ticker, symbol, None)
    }

    pub fn interval(&self) -> Option<&str> {
        self.interval.as_deref()
    }

    /// String form, e.g. `kline:BTC-USDT:1m` or `depth:ETH-USDT`.
    pub fn key(&self) -> String {
        match &self.interval {
            Some(interval) => format!("{}:{}:{}", self.channel, self.symbol, interval),
            None => format!("{}:{}", self.channel, self.symbol),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
