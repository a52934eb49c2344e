//! Identifier types for market data entities
//!
//! Candle ids use UUID v7 so persisted rows sort chronologically by
//! creation. Connection ids are process-local and only need to be unique
//! and cheap to hash.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Identity assigned to a candle by the durable store on first insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandleId(Uuid);

impl CandleId {
    /// Create a new CandleId with current timestamp
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create from existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Stable, comparable identity of a live push connection.
///
/// The transport layer owns the connection itself; everything else refers
/// to it by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next process-unique connection id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Trading symbol (e.g., "BTC-USDT").
///
/// Symbols appear inside topic keys and cache keys, both of which use ':'
/// as a separator, so a symbol may not contain ':' or whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Try to create a Symbol, returning None if empty or containing
    /// a separator character.
    pub fn try_new(symbol: impl Into<String>) -> Option<Self> {
        let s = symbol.into();
        if s.is_empty() || s.chars().any(|c| c == ':' || c.is_whitespace()) {
            None
        } else {
            Some(Self(s))
        }
    }

    /// Normalize an upstream `BASE/QUOTE` pair into the `BASE-QUOTE` form
    /// used on the wire and in storage.
    pub fn from_pair(pair: &str) -> Option<Self> {
        Self::try_new(pair.trim().replace('/', "-"))
    }

    /// Get the symbol string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
