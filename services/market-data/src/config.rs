//! Runtime configuration for the push layer and the aggregation engine

use std::time::Duration;

use types::interval::KlineInterval;

use crate::backpressure::DropPolicy;

/// Configuration for the WebSocket push sessions.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Interval at which clients are expected to ping (default: 30s).
    pub heartbeat_interval: Duration,
    /// Session is closed after this long without any inbound frame
    /// (default: 2 × heartbeat).
    pub idle_timeout: Duration,
    /// Per-connection outbound queue capacity, in frames.
    pub queue_capacity: usize,
    /// What to do when a connection's outbound queue is full.
    pub drop_policy: DropPolicy,
    /// Max subscriptions per connection.
    pub max_subscriptions_per_connection: usize,
    /// Max inbound frame size in bytes.
    pub max_frame_size: usize,
}

impl WsConfig {
    /// Derive the idle timeout from the client heartbeat interval.
    pub fn from_heartbeat(heartbeat_interval: Duration) -> Self {
        Self {
            heartbeat_interval,
            idle_timeout: heartbeat_interval * 2,
            ..Self::default()
        }
    }
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            queue_capacity: 1024,
            drop_policy: DropPolicy::Disconnect,
            max_subscriptions_per_connection: 100,
            max_frame_size: 65_536,
        }
    }
}

/// Cache TTL policy for candles.
#[derive(Debug, Clone)]
pub struct AggregationConfig {
    /// Open candles live in the cache for this many nominal intervals.
    pub open_ttl_multiplier: u64,
    /// Cache TTL once a candle is marked completed.
    pub completed_ttl: Duration,
}

impl AggregationConfig {
    /// Cache TTL for a candle that is still receiving trades.
    pub fn open_ttl(&self, interval: KlineInterval) -> Duration {
        Duration::from_secs(interval.nominal_seconds().unsigned_abs() * self.open_ttl_multiplier)
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            open_ttl_multiplier: 2,
            completed_ttl: Duration::from_secs(3600),
        }
    }
}
