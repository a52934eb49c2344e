//! Types library for the market data service
//!
//! Shared type definitions used by the kline aggregation engine, the
//! subscription registry and the push gateway. Everything here is pure
//! data and policy: no I/O, no clocks other than what callers pass in.
//!
//! # Modules
//! - `ids`: Identifiers (CandleId, ConnectionId, Symbol)
//! - `interval`: The nine kline intervals and their alignment rules
//! - `candle`: OHLCV candle and its storage key
//! - `trade`: Trade ticks fed into aggregation, public trades pushed out
//! - `market`: Depth and ticker payloads for the push channels
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod interval;
pub mod candle;
pub mod trade;
pub mod market;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::interval::*;
    pub use crate::candle::*;
    pub use crate::trade::*;
    pub use crate::market::*;
    pub use crate::errors::*;
}
