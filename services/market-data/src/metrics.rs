//! Observability counters for the market data service
//!
//! Plain atomics, exported as a flat name → value map for the stats
//! endpoint.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Core metrics for the market data service.
pub struct ServiceMetrics {
    // Aggregation
    pub trades_ingested: AtomicU64,
    pub trades_duplicate: AtomicU64,
    pub trades_rejected: AtomicU64,
    pub interval_failures: AtomicU64,
    pub candles_created: AtomicU64,
    pub candles_updated: AtomicU64,
    pub candles_completed: AtomicU64,
    pub ingest_latency_ns: Mutex<LatencyTracker>,

    // Fan-out
    pub frames_published: AtomicU64,
    pub frames_enqueued: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub slow_disconnects: AtomicU64,

    // Sessions
    pub connections_opened: AtomicU64,
    pub connections_closed: AtomicU64,
    pub idle_timeouts: AtomicU64,
    pub protocol_errors: AtomicU64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            trades_ingested: AtomicU64::new(0),
            trades_duplicate: AtomicU64::new(0),
            trades_rejected: AtomicU64::new(0),
            interval_failures: AtomicU64::new(0),
            candles_created: AtomicU64::new(0),
            candles_updated: AtomicU64::new(0),
            candles_completed: AtomicU64::new(0),
            ingest_latency_ns: Mutex::new(LatencyTracker::new(1000)),
            frames_published: AtomicU64::new(0),
            frames_enqueued: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            slow_disconnects: AtomicU64::new(0),
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            idle_timeouts: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
        }
    }

    /// Record one trade run through all intervals.
    pub fn record_trade_ingested(&self, latency_ns: u64) {
        self.trades_ingested.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut tracker) = self.ingest_latency_ns.lock() {
            tracker.record(latency_ns);
        }
    }

    pub fn record_duplicate_trade(&self) {
        self.trades_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_trade(&self) {
        self.trades_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_interval_failure(&self) {
        self.interval_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_candle_created(&self) {
        self.candles_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_candle_updated(&self) {
        self.candles_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_candle_completed(&self) {
        self.candles_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one publish and how many connections accepted the frame.
    pub fn record_publish(&self, enqueued: u64) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
        self.frames_enqueued.fetch_add(enqueued, Ordering::Relaxed);
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slow_disconnect(&self) {
        self.slow_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_idle_timeout(&self) {
        self.idle_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Connections opened and not yet closed.
    pub fn active_connections(&self) -> u64 {
        let opened = self.connections_opened.load(Ordering::Relaxed);
        let closed = self.connections_closed.load(Ordering::Relaxed);
        opened.saturating_sub(closed)
    }

    /// Export metrics as a BTreeMap for Prometheus-style exposition.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        let counters = [
            ("trades_ingested", &self.trades_ingested),
            ("trades_duplicate", &self.trades_duplicate),
            ("trades_rejected", &self.trades_rejected),
            ("interval_failures", &self.interval_failures),
            ("candles_created", &self.candles_created),
            ("candles_updated", &self.candles_updated),
            ("candles_completed", &self.candles_completed),
            ("frames_published", &self.frames_published),
            ("frames_enqueued", &self.frames_enqueued),
            ("frames_dropped", &self.frames_dropped),
            ("slow_disconnects", &self.slow_disconnects),
            ("connections_opened", &self.connections_opened),
            ("connections_closed", &self.connections_closed),
            ("idle_timeouts", &self.idle_timeouts),
            ("protocol_errors", &self.protocol_errors),
        ];
        for (name, counter) in counters {
            m.insert(name.to_string(), counter.load(Ordering::Relaxed));
        }
        m.insert("active_connections".to_string(), self.active_connections());

        if let Ok(tracker) = self.ingest_latency_ns.lock() {
            if let Some(p50) = tracker.percentile(50) {
                m.insert("ingest_latency_p50_ns".to_string(), p50);
            }
            if let Some(p99) = tracker.percentile(99) {
                m.insert("ingest_latency_p99_ns".to_string(), p99);
            }
        }
        m
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Sliding window of latency samples for percentile calculation.
pub struct LatencyTracker {
    samples: VecDeque<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record a latency sample, evicting the oldest once full.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (p.min(100) * (sorted.len() - 1)) / 100;
        sorted.get(idx).copied()
    }

    pub fn average(&self) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u64 = self.samples.iter().sum();
        Some(sum / self.samples.len() as u64)
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}
