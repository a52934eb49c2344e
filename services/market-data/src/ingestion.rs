//! Trade event ingestion
//!
//! Turns upstream `TRADE_EXECUTED` events into trade ticks: validates the
//! event type and decimals, normalizes `BASE/QUOTE` symbols to
//! `BASE-QUOTE`, drops redelivered events by `event_id`, publishes the
//! public trade, then hands the tick to the aggregation engine.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use types::candle::Candle;
use types::ids::Symbol;
use types::trade::{PublicTrade, TradeTick};

use crate::aggregation::KlineAggregator;
use crate::dispatcher::FanoutDispatcher;
use crate::events::TradeExecutedEvent;
use crate::metrics::ServiceMetrics;

/// Errors that can occur during event ingestion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestionError {
    #[error("unexpected event type: {event_type}")]
    UnexpectedEventType { event_type: String },

    #[error("invalid symbol: {symbol}")]
    InvalidSymbol { symbol: String },

    #[error("invalid {field}: {value}")]
    InvalidDecimal { field: &'static str, value: String },
}

/// Result of ingesting a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionResult {
    /// Event aggregated; carries the candles that were written.
    Accepted { candles: Vec<Candle> },
    /// Duplicate event was dropped.
    Dropped,
}

/// Configuration for the trade ingester.
#[derive(Debug, Clone)]
pub struct IngesterConfig {
    /// Maximum number of recent event ids remembered for dedup.
    pub dedup_window: usize,
}

impl Default for IngesterConfig {
    fn default() -> Self {
        Self {
            dedup_window: 10_000,
        }
    }
}

/// Bounded set of recently seen event ids, evicted oldest first.
struct DedupWindow {
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl DedupWindow {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Returns false if `id` was already in the window.
    fn insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.seen.insert(id.to_string());
        true
    }
}

pub struct TradeIngester {
    aggregator: Arc<KlineAggregator>,
    dispatcher: Option<Arc<FanoutDispatcher>>,
    window: Mutex<DedupWindow>,
    metrics: Arc<ServiceMetrics>,
}

impl TradeIngester {
    pub fn new(
        aggregator: Arc<KlineAggregator>,
        config: IngesterConfig,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        info!(dedup_window = config.dedup_window, "TradeIngester initialized");
        Self {
            aggregator,
            dispatcher: None,
            window: Mutex::new(DedupWindow::new(config.dedup_window)),
            metrics,
        }
    }

    /// Also publish each trade on `trade:{symbol}`.
    pub fn with_dispatcher(mut self, dispatcher: Arc<FanoutDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub async fn ingest_event(
        &self,
        event: &TradeExecutedEvent,
    ) -> Result<IngestionResult, IngestionError> {
        let tick = match Self::to_tick(event) {
            Ok(tick) => tick,
            Err(e) => {
                self.metrics.record_rejected_trade();
                warn!(event_id = %event.event_id, error = %e, "Rejecting trade event");
                return Err(e);
            }
        };

        if !self.remember(&event.event_id) {
            self.metrics.record_duplicate_trade();
            debug!(event_id = %event.event_id, "Dropping duplicate trade event");
            return Ok(IngestionResult::Dropped);
        }

        if let Some(dispatcher) = &self.dispatcher {
            match PublicTrade::from_tick(&event.payload.trade_id, &tick, event.taker_side()) {
                Ok(public) => {
                    dispatcher.publish_trade(&public);
                }
                Err(e) => warn!(event_id = %event.event_id, error = %e, "Skipping public trade"),
            }
        }

        let candles = self.aggregator.ingest(&tick).await;
        debug!(
            event_id = %event.event_id,
            trade_id = %event.payload.trade_id,
            symbol = %tick.symbol,
            candles = candles.len(),
            "Trade event ingested"
        );
        Ok(IngestionResult::Accepted { candles })
    }

    fn remember(&self, event_id: &str) -> bool {
        match self.window.lock() {
            Ok(mut window) => window.insert(event_id),
            Err(poisoned) => poisoned.into_inner().insert(event_id),
        }
    }

    fn to_tick(event: &TradeExecutedEvent) -> Result<TradeTick, IngestionError> {
        if !event.is_trade_executed() {
            return Err(IngestionError::UnexpectedEventType {
                event_type: event.event_type.clone(),
            });
        }

        let payload = &event.payload;
        let symbol = Symbol::from_pair(&payload.symbol).ok_or_else(|| IngestionError::InvalidSymbol {
            symbol: payload.symbol.clone(),
        })?;
        let price = parse_positive("price", &payload.price)?;
        let quantity = parse_positive("quantity", &payload.quantity)?;

        Ok(TradeTick::new(symbol, price, quantity, event.trade_time()))
    }
}

fn parse_positive(field: &'static str, value: &str) -> Result<Decimal, IngestionError> {
    value
        .trim()
        .parse::<Decimal>()
        .ok()
        .filter(|d| *d > Decimal::ZERO)
        .ok_or_else(|| IngestionError::InvalidDecimal {
            field,
            value: value.to_string(),
        })
}
