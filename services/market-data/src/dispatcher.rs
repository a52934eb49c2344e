//! Fan-out dispatcher
//!
//! Serializes a push frame once per publish and enqueues it on every
//! subscriber of the topic. Enqueueing never waits on the network, so a
//! slow connection only affects itself: its frame is dropped or the
//! connection is flagged for teardown, per its drop policy. Failed
//! deliveries are not retried; the next update re-pushes current state.

use std::sync::Arc;

use tracing::{debug, warn};
use types::candle::Candle;
use types::errors::EnqueueError;
use types::market::{DepthSnapshot, Ticker};
use types::trade::PublicTrade;

use crate::aggregation::CandleListener;
use crate::backpressure::OutboundFrame;
use crate::metrics::ServiceMetrics;
use crate::protocol::{PushPayload, ServerMessage};
use crate::registry::SubscriptionRegistry;
use crate::topic::{Channel, Topic};

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub subscribers: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct FanoutDispatcher {
    registry: Arc<SubscriptionRegistry>,
    metrics: Arc<ServiceMetrics>,
}

impl FanoutDispatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>, metrics: Arc<ServiceMetrics>) -> Self {
        Self { registry, metrics }
    }

    pub fn publish(&self, topic: &Topic, payload: &PushPayload) -> PublishReport {
        let subscribers = self.registry.subscribers(topic);
        let mut report = PublishReport {
            subscribers: subscribers.len(),
            ..PublishReport::default()
        };
        if subscribers.is_empty() {
            return report;
        }

        let frame = match ServerMessage::push(payload).encode() {
            Ok(json) => OutboundFrame::from(json),
            Err(e) => {
                warn!(topic = %topic, error = %e, "Failed to encode push frame");
                return report;
            }
        };

        for handle in subscribers {
            match handle.enqueue(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    if matches!(e, EnqueueError::Full { .. }) {
                        self.metrics.record_frame_dropped();
                    }
                    warn!(
                        connection = %handle.id(),
                        topic = %topic,
                        error = %e,
                        "Push not delivered"
                    );
                }
            }
        }

        self.metrics.record_publish(report.delivered as u64);
        debug!(
            topic = %topic,
            subscribers = report.subscribers,
            delivered = report.delivered,
            "Published"
        );
        report
    }

    /// Push on `kline:{symbol}:{interval}`.
    pub fn publish_candle(&self, candle: &Candle) -> PublishReport {
        let topic = Topic::kline(candle.symbol.clone(), candle.interval);
        self.publish(&topic, &PushPayload::Kline(candle.clone()))
    }

    /// Push on `trade:{symbol}`.
    pub fn publish_trade(&self, trade: &PublicTrade) -> PublishReport {
        let topic = Topic::trade(trade.symbol.clone());
        self.publish(&topic, &PushPayload::Trade(trade.clone()))
    }

    /// Push on `depth:{symbol}`.
    pub fn publish_depth(&self, depth: &DepthSnapshot) -> PublishReport {
        let topic = Topic::depth(depth.symbol.clone());
        self.publish(&topic, &PushPayload::Depth(depth.clone()))
    }

    /// Push on `ticker:{symbol}`.
    pub fn publish_ticker(&self, ticker: &Ticker) -> PublishReport {
        let topic = Topic::ticker(ticker.symbol.clone());
        self.publish(&topic, &PushPayload::Ticker(ticker.clone()))
    }

    /// Push on `stats_24h:{symbol}`.
    pub fn publish_stats_24h(&self, stats: &Ticker) -> PublishReport {
        let topic = Topic::new(Channel::Stats24h, stats.symbol.clone(), None);
        self.publish(&topic, &PushPayload::Stats24h(stats.clone()))
    }
}

impl CandleListener for FanoutDispatcher {
    fn on_candle(&self, candle: &Candle) {
        self.publish_candle(candle);
    }
}
