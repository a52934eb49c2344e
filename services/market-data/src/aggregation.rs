//! Kline aggregation engine
//!
//! Every trade is folded into the open candle of all nine intervals. Each
//! interval is an independent read-modify-write through [`CandleStore`]:
//! align, locate (cache, then durable, then create), update OHLCV,
//! persist, notify.
//!
//! Updates to one (symbol, interval) series are serialized by a per-series
//! async mutex, so concurrent trades for the same symbol never interleave
//! their read-modify-write. Different series proceed in parallel.
//!
//! A failure in one interval is logged and counted; the other intervals
//! are still attempted and `ingest` itself never fails.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use types::candle::{Candle, CandleKey};
use types::errors::AggregationError;
use types::ids::Symbol;
use types::interval::KlineInterval;
use types::trade::TradeTick;

use crate::config::AggregationConfig;
use crate::metrics::ServiceMetrics;
use crate::store::{CandleStore, Located};

/// Receives every candle the engine writes.
pub trait CandleListener: Send + Sync {
    fn on_candle(&self, candle: &Candle);
}

type SeriesKey = (Symbol, KlineInterval);

pub struct KlineAggregator {
    store: CandleStore,
    config: AggregationConfig,
    series_locks: DashMap<SeriesKey, Arc<Mutex<()>>>,
    listener: Option<Arc<dyn CandleListener>>,
    metrics: Arc<ServiceMetrics>,
}

impl KlineAggregator {
    pub fn new(store: CandleStore, config: AggregationConfig, metrics: Arc<ServiceMetrics>) -> Self {
        info!(
            open_ttl_multiplier = config.open_ttl_multiplier,
            completed_ttl_secs = config.completed_ttl.as_secs(),
            "KlineAggregator initialized"
        );
        Self {
            store,
            config,
            series_locks: DashMap::new(),
            listener: None,
            metrics,
        }
    }

    /// Attach the sink notified after each successful write.
    pub fn with_listener(mut self, listener: Arc<dyn CandleListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn store(&self) -> &CandleStore {
        &self.store
    }

    /// Aggregate one trade into all intervals. Returns the candles that
    /// were written; intervals that failed are absent.
    pub async fn ingest(&self, tick: &TradeTick) -> Vec<Candle> {
        let started = Instant::now();

        if let Err(e) = tick.validate() {
            error!(symbol = %tick.symbol, error = %e, "Rejecting trade");
            self.metrics.record_rejected_trade();
            return Vec::new();
        }

        let results = join_all(
            KlineInterval::all()
                .iter()
                .map(|interval| self.aggregate_interval(tick, *interval)),
        )
        .await;

        let mut written = Vec::with_capacity(results.len());
        for (interval, result) in KlineInterval::all().iter().zip(results) {
            match result {
                Ok(candle) => written.push(candle),
                Err(e) => {
                    self.metrics.record_interval_failure();
                    error!(
                        symbol = %tick.symbol,
                        interval = %interval,
                        error = %e,
                        "Failed to aggregate trade into interval"
                    );
                }
            }
        }

        self.metrics
            .record_trade_ingested(started.elapsed().as_nanos() as u64);
        debug!(
            symbol = %tick.symbol,
            price = %tick.price,
            quantity = %tick.quantity,
            intervals = written.len(),
            "Trade aggregated"
        );
        written
    }

    async fn aggregate_interval(
        &self,
        tick: &TradeTick,
        interval: KlineInterval,
    ) -> Result<Candle, AggregationError> {
        let bucket = interval.bucket(tick.trade_time);
        let lock = self.series_lock(&tick.symbol, interval);
        let _guard = lock.lock().await;

        let (mut candle, located) = self
            .store
            .get_or_create(&tick.symbol, interval, bucket, tick.price)
            .await?;

        candle.apply_trade(tick.price, tick.quantity)?;

        let stored = self
            .store
            .persist(&candle, self.config.open_ttl(interval))
            .await?;

        match located {
            Located::Created => self.metrics.record_candle_created(),
            Located::Cache | Located::Durable => self.metrics.record_candle_updated(),
        }

        if let Some(listener) = &self.listener {
            listener.on_candle(&stored);
        }
        Ok(stored)
    }

    /// Flag a candle as completed and re-cache it with the completed TTL.
    /// Returns `Ok(None)` when no such candle exists.
    pub async fn mark_completed(
        &self,
        symbol: &Symbol,
        interval: KlineInterval,
        open_time: i64,
    ) -> Result<Option<Candle>, AggregationError> {
        let lock = self.series_lock(symbol, interval);
        let _guard = lock.lock().await;

        let key = CandleKey::new(symbol.clone(), interval, open_time);
        let Some(mut candle) = self.store.load(&key).await? else {
            debug!(key = %key, "No candle to complete");
            return Ok(None);
        };

        candle.completed = true;
        let stored = self.store.persist(&candle, self.config.completed_ttl).await?;
        self.metrics.record_candle_completed();
        info!(
            symbol = %symbol,
            interval = %interval,
            open_time,
            "Candle completed"
        );

        if let Some(listener) = &self.listener {
            listener.on_candle(&stored);
        }
        Ok(Some(stored))
    }

    /// Number of (symbol, interval) series seen so far.
    pub fn series_count(&self) -> usize {
        self.series_locks.len()
    }

    fn series_lock(&self, symbol: &Symbol, interval: KlineInterval) -> Arc<Mutex<()>> {
        self.series_locks
            .entry((symbol.clone(), interval))
            .or_default()
            .clone()
    }
}
