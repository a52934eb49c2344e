//! Market Data Service
//!
//! Consumes executed trades and produces:
//! - OHLCV candle aggregation across nine intervals (1m to 1M)
//! - Two-tier candle storage (TTL cache in front of a durable repository)
//! - Public trade, depth, ticker and 24h stats push channels
//! - WebSocket push sessions with per-connection backpressure
//!
//! # Architecture
//!
//! ```text
//! TRADE_EXECUTED events
//!        │
//!    ┌───▼───┐
//!    │Ingest │  ← Validates, normalizes symbols, dedupes by event id
//!    └───┬───┘
//!        │
//!   ┌────┴──────────┐
//!   │               │
//! ┌─▼──────────┐ ┌──▼────┐
//! │Aggregator  │ │Trades │
//! │(9 intervals)│ └──┬────┘
//! └─┬────────┬─┘    │
//!   │        │      │
//! ┌─▼────┐   │      │
//! │Store │   │      │
//! └──────┘   │      │
//! ┌──────────▼──────▼─────────┐
//! │   Fan-out Dispatcher      │  ← Registry lookup, one encode per publish
//! └──────────┬────────────────┘
//!            │
//! ┌──────────▼────────────────┐
//! │  Push sessions (WebSocket)│
//! └───────────────────────────┘
//! ```

pub mod aggregation;
pub mod backpressure;
pub mod config;
pub mod dispatcher;
pub mod events;
pub mod ingestion;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod store;
pub mod topic;
pub mod websocket;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
