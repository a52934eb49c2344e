//! Aggregation tests for the Market Data Service
//!
//! Drives the kline engine through its public API with in-memory tiers
//! and a deliberately failing repository.
//!
//! Tests include:
//! - OHLCV fold over arbitrary trade sequences
//! - Multi-interval alignment of a single trade
//! - Failure containment to one interval
//! - Concurrent trades on the same series
//! - Late trades landing in an earlier bucket
//! - Completion and read-back through the store

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use market_data::aggregation::KlineAggregator;
use market_data::config::AggregationConfig;
use market_data::metrics::ServiceMetrics;
use market_data::store::{CandleRepository, CandleStore, MemoryCache, MemoryRepository};
use proptest::prelude::*;
use rust_decimal::Decimal;
use types::candle::{Candle, CandleKey};
use types::errors::StoreError;
use types::ids::Symbol;
use types::interval::KlineInterval;
use types::trade::TradeTick;

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn btc() -> Symbol {
    Symbol::try_new("BTC-USDT").unwrap()
}

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 17, h, m, s).unwrap()
}

fn aggregator() -> KlineAggregator {
    KlineAggregator::new(
        CandleStore::in_memory(),
        AggregationConfig::default(),
        Arc::new(ServiceMetrics::new()),
    )
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn find(candles: &[Candle], interval: KlineInterval) -> &Candle {
    candles
        .iter()
        .find(|c| c.interval == interval)
        .unwrap_or_else(|| panic!("no {interval} candle"))
}

/// Repository that rejects every write for one interval.
struct FailingRepository {
    inner: MemoryRepository,
    failing: KlineInterval,
}

#[async_trait]
impl CandleRepository for FailingRepository {
    async fn find(&self, key: &CandleKey) -> Result<Option<Candle>, StoreError> {
        self.inner.find(key).await
    }

    async fn upsert(&self, candle: &Candle) -> Result<Candle, StoreError> {
        if candle.interval == self.failing {
            return Err(StoreError::Durable {
                message: "disk full".to_string(),
            });
        }
        self.inner.upsert(candle).await
    }

    async fn find_range(
        &self,
        symbol: &Symbol,
        interval: KlineInterval,
        start: i64,
        end: i64,
        limit: usize,
    ) -> Result<Vec<Candle>, StoreError> {
        self.inner.find_range(symbol, interval, start, end, limit).await
    }

    async fn find_latest(
        &self,
        symbol: &Symbol,
        interval: KlineInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, StoreError> {
        self.inner.find_latest(symbol, interval, limit).await
    }

    async fn count(&self, symbol: &Symbol, interval: KlineInterval) -> Result<usize, StoreError> {
        self.inner.count(symbol, interval).await
    }
}

#[tokio::test]
async fn test_reference_trade_alignment() {
    let agg = aggregator();
    let written = agg
        .ingest(&TradeTick::new(btc(), d("50000"), d("0.1"), at(10, 32, 45)))
        .await;

    assert_eq!(written.len(), 9);
    assert_eq!(find(&written, KlineInterval::M1).open_time, at(10, 32, 0).timestamp());
    assert_eq!(find(&written, KlineInterval::M5).open_time, at(10, 30, 0).timestamp());
    assert_eq!(find(&written, KlineInterval::M15).open_time, at(10, 30, 0).timestamp());
    assert_eq!(find(&written, KlineInterval::H1).open_time, at(10, 0, 0).timestamp());
    assert_eq!(find(&written, KlineInterval::D1).open_time, at(0, 0, 0).timestamp());

    // 2024-11-17 is a Sunday; the week opened on Monday the 11th.
    let week = Utc.with_ymd_and_hms(2024, 11, 11, 0, 0, 0).unwrap();
    assert_eq!(find(&written, KlineInterval::W1).open_time, week.timestamp());

    let month = find(&written, KlineInterval::Mo1);
    assert_eq!(month.open_time, Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap().timestamp());
    assert_eq!(month.close_time, Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap().timestamp());
}

#[tokio::test]
async fn test_late_trade_updates_earlier_bucket() {
    let agg = aggregator();
    agg.ingest(&TradeTick::new(btc(), d("100"), d("1"), at(10, 32, 10)))
        .await;
    agg.ingest(&TradeTick::new(btc(), d("110"), d("1"), at(10, 33, 5)))
        .await;

    let written = agg
        .ingest(&TradeTick::new(btc(), d("90"), d("2"), at(10, 32, 30)))
        .await;
    assert_eq!(written.len(), 9);

    let earlier = find(&written, KlineInterval::M1);
    assert_eq!(earlier.open_time, at(10, 32, 0).timestamp());
    assert_eq!(earlier.trade_count, 2);
    assert_eq!(earlier.open, d("100"));
    assert_eq!(earlier.close, d("90"));
    assert_eq!(earlier.low, d("90"));
    assert_eq!(earlier.volume, d("3"));

    let later_key = CandleKey::new(btc(), KlineInterval::M1, at(10, 33, 0).timestamp());
    let later = agg.store().load(&later_key).await.unwrap().unwrap();
    assert_eq!(later.trade_count, 1);
    assert_eq!(later.open, d("110"));
    assert_eq!(later.close, d("110"));
    assert_eq!(later.volume, d("1"));

    let hour = find(&written, KlineInterval::H1);
    assert_eq!(hour.trade_count, 3);
    assert_eq!(hour.volume, d("4"));
    // arrival order, not trade time, decides the close
    assert_eq!(hour.close, d("90"));
}

#[tokio::test]
async fn test_reference_two_trade_bucket() {
    let agg = aggregator();
    agg.ingest(&TradeTick::new(btc(), d("50000"), d("0.1"), at(10, 32, 5)))
        .await;
    let written = agg
        .ingest(&TradeTick::new(btc(), d("51000"), d("0.2"), at(10, 32, 35)))
        .await;

    let candle = find(&written, KlineInterval::M1);
    assert_eq!(candle.open, d("50000"));
    assert_eq!(candle.high, d("51000"));
    assert_eq!(candle.low, d("50000"));
    assert_eq!(candle.close, d("51000"));
    assert_eq!(candle.volume, d("0.3"));
    assert_eq!(candle.quote_amount, d("15200"));
    assert_eq!(candle.trade_count, 2);
}

#[tokio::test]
async fn test_new_bucket_starts_fresh() {
    let agg = aggregator();
    agg.ingest(&TradeTick::new(btc(), d("100"), d("1"), at(10, 32, 59)))
        .await;
    let written = agg
        .ingest(&TradeTick::new(btc(), d("90"), d("2"), at(10, 33, 0)))
        .await;

    let minute = find(&written, KlineInterval::M1);
    assert_eq!(minute.open, d("90"));
    assert_eq!(minute.trade_count, 1);

    let hour = find(&written, KlineInterval::H1);
    assert_eq!(hour.open, d("100"));
    assert_eq!(hour.low, d("90"));
    assert_eq!(hour.trade_count, 2);

    let stored = agg.store().latest(&btc(), KlineInterval::M1, 10).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored[0].open_time > stored[1].open_time, "newest first");
}

#[tokio::test]
async fn test_failing_interval_is_contained() {
    init_tracing();
    let repository = Arc::new(FailingRepository {
        inner: MemoryRepository::new(),
        failing: KlineInterval::H4,
    });
    let store = CandleStore::new(Arc::new(MemoryCache::new()), repository);
    let metrics = Arc::new(ServiceMetrics::new());
    let agg = KlineAggregator::new(store, AggregationConfig::default(), metrics.clone());

    let written = agg
        .ingest(&TradeTick::new(btc(), d("1"), d("1"), at(10, 0, 0)))
        .await;

    assert_eq!(written.len(), 8);
    assert!(written.iter().all(|c| c.interval != KlineInterval::H4));
    let exported = metrics.export();
    assert_eq!(exported["interval_failures"], 1);
    assert_eq!(exported["trades_ingested"], 1);
}

#[tokio::test]
async fn test_symbols_are_independent() {
    let agg = aggregator();
    let eth = Symbol::try_new("ETH-USDT").unwrap();
    agg.ingest(&TradeTick::new(btc(), d("50000"), d("1"), at(1, 0, 0)))
        .await;
    agg.ingest(&TradeTick::new(eth.clone(), d("3000"), d("2"), at(1, 0, 0)))
        .await;

    let key = CandleKey::new(btc(), KlineInterval::M1, at(1, 0, 0).timestamp());
    let btc_minute = agg.store().load(&key).await.unwrap().unwrap();
    assert_eq!(btc_minute.volume, d("1"));

    let key = CandleKey::new(eth, KlineInterval::M1, at(1, 0, 0).timestamp());
    let eth_minute = agg.store().load(&key).await.unwrap().unwrap();
    assert_eq!(eth_minute.volume, d("2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_trades_same_series() {
    init_tracing();
    let agg = Arc::new(aggregator());
    let start = at(12, 0, 0);

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let agg = agg.clone();
            let time = start + Duration::milliseconds(i * 100);
            tokio::spawn(async move {
                agg.ingest(&TradeTick::new(btc(), Decimal::from(100 + i), d("1"), time))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let key = CandleKey::new(btc(), KlineInterval::M1, start.timestamp());
    let candle = agg.store().load(&key).await.unwrap().unwrap();
    assert_eq!(candle.trade_count, 50);
    assert_eq!(candle.volume, d("50"));
    assert_eq!(candle.high, d("149"));
    assert_eq!(candle.low, d("100"));
    assert!(candle.is_valid());
}

#[tokio::test]
async fn test_completed_candle_read_back() {
    let agg = aggregator();
    agg.ingest(&TradeTick::new(btc(), d("10"), d("1"), at(9, 0, 0)))
        .await;

    let open_time = at(9, 0, 0).timestamp();
    let done = agg
        .mark_completed(&btc(), KlineInterval::H1, open_time)
        .await
        .unwrap()
        .unwrap();
    assert!(done.completed);

    let key = CandleKey::new(btc(), KlineInterval::H1, open_time);
    let stored = agg.store().load(&key).await.unwrap().unwrap();
    assert!(stored.completed);
    assert_eq!(stored.id, done.id);

    // Late trades still land in the completed bucket.
    let written = agg
        .ingest(&TradeTick::new(btc(), d("12"), d("1"), at(9, 30, 0)))
        .await;
    let hour = find(&written, KlineInterval::H1);
    assert_eq!(hour.trade_count, 2);
    assert_eq!(hour.high, d("12"));
}

fn trade_strategy() -> impl Strategy<Value = Vec<(u32, u32)>> {
    prop::collection::vec((1u32..100_000, 1u32..1_000), 1..30)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_ohlcv_fold(trades in trade_strategy()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let candle = runtime.block_on(async {
            let agg = aggregator();
            for (i, (price, qty)) in trades.iter().enumerate() {
                let tick = TradeTick::new(
                    btc(),
                    Decimal::from(*price),
                    Decimal::new(*qty as i64, 3),
                    at(8, 0, 0) + Duration::milliseconds(i as i64),
                );
                agg.ingest(&tick).await;
            }
            let key = CandleKey::new(btc(), KlineInterval::M1, at(8, 0, 0).timestamp());
            agg.store().load(&key).await.unwrap().unwrap()
        });

        let prices: Vec<Decimal> = trades.iter().map(|(p, _)| Decimal::from(*p)).collect();
        let qtys: Vec<Decimal> = trades.iter().map(|(_, q)| Decimal::new(*q as i64, 3)).collect();

        prop_assert_eq!(candle.open, prices[0]);
        prop_assert_eq!(candle.close, *prices.last().unwrap());
        prop_assert_eq!(candle.high, *prices.iter().max().unwrap());
        prop_assert_eq!(candle.low, *prices.iter().min().unwrap());
        prop_assert_eq!(candle.volume, qtys.iter().copied().sum::<Decimal>());
        prop_assert_eq!(
            candle.quote_amount,
            prices.iter().zip(&qtys).map(|(p, q)| p * q).sum::<Decimal>()
        );
        prop_assert_eq!(candle.trade_count, trades.len() as u64);
    }
}
