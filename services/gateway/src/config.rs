//! Gateway configuration, read from the environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use market_data::backpressure::DropPolicy;
use market_data::config::{AggregationConfig, WsConfig};
use market_data::ingestion::IngesterConfig;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8010";
const DEFAULT_WS_PATH: &str = "/ws/market";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    /// Route of the WebSocket upgrade endpoint.
    pub ws_path: String,
    pub ws: WsConfig,
    pub aggregation: AggregationConfig,
    pub ingester: IngesterConfig,
}

impl GatewayConfig {
    /// Load `.env` if present, then read `MARKET_*` variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind_addr = parse_or(&lookup, "MARKET_BIND_ADDR", DEFAULT_BIND_ADDR.parse::<SocketAddr>()?)?;

        let ws_path = lookup("MARKET_WS_PATH").unwrap_or_else(|| DEFAULT_WS_PATH.to_string());
        if !ws_path.starts_with('/') {
            bail!("MARKET_WS_PATH must start with '/': {ws_path}");
        }

        let defaults = WsConfig::default();
        let heartbeat_ms = parse_or(
            &lookup,
            "MARKET_WS_HEARTBEAT_MS",
            defaults.heartbeat_interval.as_millis() as u64,
        )?;
        if heartbeat_ms == 0 {
            bail!("MARKET_WS_HEARTBEAT_MS must be positive");
        }

        let mut ws = WsConfig::from_heartbeat(Duration::from_millis(heartbeat_ms));
        ws.max_frame_size = parse_or(&lookup, "MARKET_WS_MAX_FRAME_SIZE", defaults.max_frame_size)?;
        ws.queue_capacity = parse_or(&lookup, "MARKET_WS_QUEUE_CAPACITY", defaults.queue_capacity)?;
        ws.max_subscriptions_per_connection = parse_or(
            &lookup,
            "MARKET_WS_MAX_SUBSCRIPTIONS",
            defaults.max_subscriptions_per_connection,
        )?;
        if let Some(raw) = lookup("MARKET_WS_DROP_POLICY") {
            ws.drop_policy = raw
                .parse::<DropPolicy>()
                .map_err(|e| anyhow::anyhow!("MARKET_WS_DROP_POLICY: {e}"))?;
        }

        let ingester = IngesterConfig {
            dedup_window: parse_or(
                &lookup,
                "MARKET_DEDUP_WINDOW",
                IngesterConfig::default().dedup_window,
            )?,
        };

        Ok(Self {
            bind_addr,
            ws_path,
            ws,
            aggregation: AggregationConfig::default(),
            ingester,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw}")),
        None => Ok(default),
    }
}
