//! Two-tier candle storage
//!
//! `CandleStore` puts a TTL cache in front of a durable repository and
//! exposes the single read-through `get_or_create` path the aggregation
//! engine uses. Both tiers are traits so the service can be wired to real
//! backends; in-memory implementations ship for tests and single-node runs.
//!
//! Writes go durable first, then cache. A cache failure after a successful
//! durable write is logged and tolerated: the next read falls through to
//! the durable tier and repopulates the cache.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::time::Instant;
use tracing::{debug, warn};
use types::candle::{Candle, CandleKey};
use types::errors::StoreError;
use types::ids::{CandleId, Symbol};
use types::interval::{Bucket, KlineInterval};

/// Fast key/value tier with per-entry TTL.
#[async_trait]
pub trait CandleCache: Send + Sync {
    async fn get(&self, key: &CandleKey) -> Result<Option<Candle>, StoreError>;

    async fn put(&self, candle: &Candle, ttl: Duration) -> Result<(), StoreError>;
}

/// Durable, queryable tier keyed by (symbol, interval, open_time).
#[async_trait]
pub trait CandleRepository: Send + Sync {
    async fn find(&self, key: &CandleKey) -> Result<Option<Candle>, StoreError>;

    /// Insert or update by natural key. Assigns an id on first insert and
    /// returns the stored row.
    async fn upsert(&self, candle: &Candle) -> Result<Candle, StoreError>;

    /// Candles with `start <= open_time < end`, oldest first.
    async fn find_range(
        &self,
        symbol: &Symbol,
        interval: KlineInterval,
        start: i64,
        end: i64,
        limit: usize,
    ) -> Result<Vec<Candle>, StoreError>;

    /// Most recent candles, newest first.
    async fn find_latest(
        &self,
        symbol: &Symbol,
        interval: KlineInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, StoreError>;

    async fn find_latest_one(
        &self,
        symbol: &Symbol,
        interval: KlineInterval,
    ) -> Result<Option<Candle>, StoreError> {
        Ok(self.find_latest(symbol, interval, 1).await?.into_iter().next())
    }

    async fn count(&self, symbol: &Symbol, interval: KlineInterval) -> Result<usize, StoreError>;
}

/// Minimum time between expiry sweeps triggered from `put`.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct CacheEntry {
    json: String,
    expires_at: Instant,
}

/// In-process cache. Candles are stored serialized, the way they would sit
/// in an external key/value store, under [`CandleKey::cache_key`].
///
/// An expired entry is dropped when it is read, and `put` sweeps the whole
/// map at most once per [`SWEEP_INTERVAL`].
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    last_sweep: Mutex<Instant>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let live = entry.expires_at > now;
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    fn maybe_sweep(&self, now: Instant) {
        // another put is already sweeping
        let Ok(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        if now.duration_since(*last) < SWEEP_INTERVAL {
            return;
        }
        *last = now;
        drop(last);

        let removed = self.purge_expired_at(now);
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "Swept expired cache entries");
        }
    }

    /// Number of entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remaining TTL of a live entry.
    pub fn ttl(&self, key: &CandleKey) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(&key.cache_key())
            .and_then(|entry| entry.expires_at.checked_duration_since(now))
    }
}

#[async_trait]
impl CandleCache for MemoryCache {
    async fn get(&self, key: &CandleKey) -> Result<Option<Candle>, StoreError> {
        let cache_key = key.cache_key();
        let now = Instant::now();

        let json = match self.entries.get(&cache_key) {
            Some(entry) if entry.expires_at > now => Some(entry.json.clone()),
            Some(_) => None,
            None => return Ok(None),
        };

        match json {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StoreError::Serialization {
                    message: e.to_string(),
                }),
            None => {
                self.entries.remove_if(&cache_key, |_, entry| entry.expires_at <= now);
                debug!(key = %cache_key, "Evicted expired cache entry");
                Ok(None)
            }
        }
    }

    async fn put(&self, candle: &Candle, ttl: Duration) -> Result<(), StoreError> {
        let json = serde_json::to_string(candle).map_err(|e| StoreError::Serialization {
            message: e.to_string(),
        })?;
        let now = Instant::now();
        self.entries.insert(
            candle.key().cache_key(),
            CacheEntry {
                json,
                expires_at: now + ttl,
            },
        );
        self.maybe_sweep(now);
        Ok(())
    }
}

/// In-process durable tier backed by an ordered map.
#[derive(Default)]
pub struct MemoryRepository {
    rows: RwLock<BTreeMap<CandleKey, Candle>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::Durable {
            message: "candle table lock poisoned".to_string(),
        }
    }

    fn series_bounds(symbol: &Symbol, interval: KlineInterval, start: i64, end: i64) -> (CandleKey, CandleKey) {
        (
            CandleKey::new(symbol.clone(), interval, start),
            CandleKey::new(symbol.clone(), interval, end),
        )
    }
}

#[async_trait]
impl CandleRepository for MemoryRepository {
    async fn find(&self, key: &CandleKey) -> Result<Option<Candle>, StoreError> {
        let rows = self.rows.read().map_err(|_| Self::poisoned())?;
        Ok(rows.get(key).cloned())
    }

    async fn upsert(&self, candle: &Candle) -> Result<Candle, StoreError> {
        let mut rows = self.rows.write().map_err(|_| Self::poisoned())?;
        let now = Utc::now();
        let key = candle.key();

        let mut stored = candle.clone();
        match rows.get(&key) {
            Some(existing) => {
                stored.id = existing.id.or(candle.id);
                stored.created_at = existing.created_at.or(Some(now));
            }
            None => stored.created_at = Some(now),
        }
        stored.id = Some(stored.id.unwrap_or_else(CandleId::new));
        stored.updated_at = Some(now);

        rows.insert(key, stored.clone());
        Ok(stored)
    }

    async fn find_range(
        &self,
        symbol: &Symbol,
        interval: KlineInterval,
        start: i64,
        end: i64,
        limit: usize,
    ) -> Result<Vec<Candle>, StoreError> {
        if start >= end {
            return Ok(Vec::new());
        }
        let rows = self.rows.read().map_err(|_| Self::poisoned())?;
        let (lo, hi) = Self::series_bounds(symbol, interval, start, end);
        Ok(rows.range(lo..hi).take(limit).map(|(_, c)| c.clone()).collect())
    }

    async fn find_latest(
        &self,
        symbol: &Symbol,
        interval: KlineInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, StoreError> {
        let rows = self.rows.read().map_err(|_| Self::poisoned())?;
        let (lo, hi) = Self::series_bounds(symbol, interval, i64::MIN, i64::MAX);
        Ok(rows
            .range(lo..=hi)
            .rev()
            .take(limit)
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn count(&self, symbol: &Symbol, interval: KlineInterval) -> Result<usize, StoreError> {
        let rows = self.rows.read().map_err(|_| Self::poisoned())?;
        let (lo, hi) = Self::series_bounds(symbol, interval, i64::MIN, i64::MAX);
        Ok(rows.range(lo..=hi).count())
    }
}

/// Where `get_or_create` found the candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Located {
    Cache,
    Durable,
    Created,
}

/// Cache-then-durable candle store.
#[derive(Clone)]
pub struct CandleStore {
    cache: Arc<dyn CandleCache>,
    repository: Arc<dyn CandleRepository>,
}

impl CandleStore {
    pub fn new(cache: Arc<dyn CandleCache>, repository: Arc<dyn CandleRepository>) -> Self {
        Self { cache, repository }
    }

    /// Both tiers in memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCache::new()), Arc::new(MemoryRepository::new()))
    }

    /// Read through cache then durable store; on a miss in both, seed a new
    /// candle for `bucket` with every price set to `seed_price`. The new
    /// candle is not written until [`CandleStore::persist`].
    ///
    /// A cache read failure is treated as a miss.
    pub async fn get_or_create(
        &self,
        symbol: &Symbol,
        interval: KlineInterval,
        bucket: Bucket,
        seed_price: Decimal,
    ) -> Result<(Candle, Located), StoreError> {
        let key = CandleKey::new(symbol.clone(), interval, bucket.open_time);

        match self.cache.get(&key).await {
            Ok(Some(candle)) => return Ok((candle, Located::Cache)),
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Cache read failed, falling back to durable store"),
        }

        if let Some(candle) = self.repository.find(&key).await? {
            return Ok((candle, Located::Durable));
        }

        Ok((
            Candle::open_bucket(symbol.clone(), interval, bucket, seed_price),
            Located::Created,
        ))
    }

    /// Upsert into the durable tier, then refresh the cache with `ttl`.
    /// Returns the stored candle, carrying its assigned id.
    pub async fn persist(&self, candle: &Candle, ttl: Duration) -> Result<Candle, StoreError> {
        let stored = self.repository.upsert(candle).await?;
        if let Err(e) = self.cache.put(&stored, ttl).await {
            warn!(
                symbol = %stored.symbol,
                interval = %stored.interval,
                open_time = stored.open_time,
                error = %e,
                "Cache write failed after durable upsert"
            );
        }
        Ok(stored)
    }

    /// Durable read, bypassing the cache.
    pub async fn load(&self, key: &CandleKey) -> Result<Option<Candle>, StoreError> {
        self.repository.find(key).await
    }

    /// Most recent candles, newest first.
    pub async fn latest(
        &self,
        symbol: &Symbol,
        interval: KlineInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, StoreError> {
        self.repository.find_latest(symbol, interval, limit).await
    }

    pub async fn range(
        &self,
        symbol: &Symbol,
        interval: KlineInterval,
        start: i64,
        end: i64,
        limit: usize,
    ) -> Result<Vec<Candle>, StoreError> {
        self.repository.find_range(symbol, interval, start, end, limit).await
    }

    pub async fn count(&self, symbol: &Symbol, interval: KlineInterval) -> Result<usize, StoreError> {
        self.repository.count(symbol, interval).await
    }
}
