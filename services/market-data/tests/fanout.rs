//! Fan-out tests for the Market Data Service
//!
//! Exercises sessions, the subscription registry and the dispatcher
//! together, without a network transport.
//!
//! Tests include:
//! - Topic-scoped delivery
//! - Teardown of every subscription of a connection
//! - Subscribe/unsubscribe/subscribe round-trip
//! - Slash-separated pairs resolve to the published topic
//! - Malformed frames leave the session intact
//! - Trade event to pushed kline, end to end

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use market_data::aggregation::KlineAggregator;
use market_data::backpressure::{outbound_channel, DropPolicy, OutboundFrame};
use market_data::config::AggregationConfig;
use market_data::dispatcher::FanoutDispatcher;
use market_data::events::TradeExecutedEvent;
use market_data::ingestion::{IngesterConfig, IngestionResult, TradeIngester};
use market_data::metrics::ServiceMetrics;
use market_data::registry::SubscriptionRegistry;
use market_data::session::{CloseReason, Session};
use market_data::store::CandleStore;
use market_data::topic::Topic;
use serde_json::Value;
use tokio::sync::mpsc::Receiver;
use types::candle::Candle;
use types::ids::{ConnectionId, Symbol};
use types::interval::KlineInterval;

struct Harness {
    registry: Arc<SubscriptionRegistry>,
    metrics: Arc<ServiceMetrics>,
    dispatcher: Arc<FanoutDispatcher>,
}

impl Harness {
    fn new() -> Self {
        let registry = Arc::new(SubscriptionRegistry::new(100));
        let metrics = Arc::new(ServiceMetrics::new());
        let dispatcher = Arc::new(FanoutDispatcher::new(registry.clone(), metrics.clone()));
        Self {
            registry,
            metrics,
            dispatcher,
        }
    }

    fn connect(&self) -> (Session, Receiver<OutboundFrame>) {
        let (outbound, rx) = outbound_channel(ConnectionId::next(), 64, DropPolicy::Disconnect);
        let session = Session::open(self.registry.clone(), self.metrics.clone(), outbound);
        (session, rx)
    }
}

fn drain(rx: &mut Receiver<OutboundFrame>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(serde_json::from_str(frame.as_str()).unwrap());
    }
    frames
}

fn btc() -> Symbol {
    Symbol::try_new("BTC-USDT").unwrap()
}

fn candle() -> Candle {
    let time = Utc.with_ymd_and_hms(2024, 11, 17, 10, 32, 45).unwrap();
    let mut candle = Candle::open_bucket(
        btc(),
        KlineInterval::M1,
        KlineInterval::M1.bucket(time),
        "50000".parse().unwrap(),
    );
    candle
        .apply_trade("50000".parse().unwrap(), "0.1".parse().unwrap())
        .unwrap();
    candle
}

const SUB_KLINE: &str = r#"{"type":"subscribe","channel":"kline","symbol":"BTC-USDT","interval":"1m"}"#;
const UNSUB_KLINE: &str = r#"{"type":"unsubscribe","channel":"kline","symbol":"BTC-USDT","interval":"1m"}"#;
const SUB_DEPTH_ETH: &str = r#"{"type":"subscribe","channel":"depth","symbol":"ETH-USDT"}"#;

#[test]
fn test_publish_delivers_to_topic_subscribers_only() {
    let h = Harness::new();
    let (c, mut rx_c) = h.connect();
    let (other, mut rx_other) = h.connect();
    c.handle_text(SUB_KLINE).unwrap();
    other.handle_text(SUB_DEPTH_ETH).unwrap();
    drain(&mut rx_c);
    drain(&mut rx_other);

    h.dispatcher.publish_candle(&candle());

    let frames = drain(&mut rx_c);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "kline");
    assert_eq!(frames[0]["symbol"], "BTC-USDT");
    assert_eq!(frames[0]["data"]["interval"], "1m");
    assert_eq!(frames[0]["data"]["tradeCount"], 1);
    assert!(frames[0]["timestamp"].is_number());
    assert!(drain(&mut rx_other).is_empty());
}

#[test]
fn test_close_removes_connection_everywhere() {
    let h = Harness::new();
    let (c, mut rx_c) = h.connect();
    let (other, mut rx_other) = h.connect();
    c.handle_text(SUB_KLINE).unwrap();
    c.handle_text(r#"{"type":"subscribe","channel":"trade","symbol":"BTC-USDT"}"#)
        .unwrap();
    other
        .handle_text(r#"{"type":"subscribe","channel":"trade","symbol":"BTC-USDT"}"#)
        .unwrap();
    drain(&mut rx_c);
    drain(&mut rx_other);

    assert_eq!(h.registry.total_connections(), 2);
    assert_eq!(h.registry.total_subscriptions(), 2);

    let c_id = c.id();
    assert_eq!(c.close(CloseReason::PeerClosed), 2);

    assert_eq!(h.registry.total_connections(), 1);
    // kline topic had only C; the trade topic is still held by `other`.
    assert_eq!(h.registry.total_subscriptions(), 1);
    assert!(h.registry.topics_of(c_id).is_empty());
    assert!(h.registry.is_consistent());

    let report = h.dispatcher.publish_candle(&candle());
    assert_eq!(report.subscribers, 0);
    assert!(drain(&mut rx_c).is_empty());
}

#[test]
fn test_resubscribe_restores_delivery() {
    let h = Harness::new();
    let (c, mut rx) = h.connect();

    c.handle_text(SUB_KLINE).unwrap();
    c.handle_text(UNSUB_KLINE).unwrap();
    c.handle_text(SUB_KLINE).unwrap();
    let replies: Vec<_> = drain(&mut rx).iter().map(|f| f["type"].clone()).collect();
    assert_eq!(replies, ["subscribed", "unsubscribed", "subscribed"]);

    h.dispatcher.publish_candle(&candle());
    assert_eq!(drain(&mut rx).len(), 1);
}

#[test]
fn test_slash_pair_subscription_receives_pushes() {
    let h = Harness::new();
    let (c, mut rx) = h.connect();

    c.handle_text(r#"{"type":"subscribe","channel":"kline","symbol":"BTC/USDT","interval":"1m"}"#)
        .unwrap();
    let replies = drain(&mut rx);
    assert_eq!(replies[0]["type"], "subscribed");
    assert_eq!(replies[0]["symbol"], "BTC-USDT");

    let report = h.dispatcher.publish_candle(&candle());
    assert_eq!(report.subscribers, 1);
    assert_eq!(drain(&mut rx).len(), 1);

    c.handle_text(r#"{"type":"unsubscribe","channel":"kline","symbol":"BTC/USDT","interval":"1m"}"#)
        .unwrap();
    assert_eq!(h.registry.total_subscriptions(), 0);
}

#[test]
fn test_malformed_frame_yields_one_error() {
    let h = Harness::new();
    let (c, mut rx) = h.connect();
    c.handle_text(SUB_KLINE).unwrap();
    drain(&mut rx);

    assert!(c.handle_text("this is not json").is_err());
    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "error");
    assert_eq!(frames[0]["code"], "INVALID_MESSAGE");

    assert!(!c.outbound().is_closing());
    let topic = Topic::kline(btc(), KlineInterval::M1);
    assert!(h.registry.is_subscribed(c.id(), &topic));

    h.dispatcher.publish_candle(&candle());
    assert_eq!(drain(&mut rx).len(), 1);
}

#[test]
fn test_protocol_errors_by_code() {
    let h = Harness::new();
    let (c, mut rx) = h.connect();

    let cases = [
        (r#"{"type":"hello"}"#, "UNSUPPORTED_MESSAGE_TYPE"),
        (r#"{"channel":"kline"}"#, "INVALID_MESSAGE"),
        (r#"{"type":"subscribe","channel":"kline"}"#, "INVALID_PARAMS"),
        (r#"{"type":"subscribe","channel":"news","symbol":"BTC-USDT"}"#, "INVALID_PARAMS"),
        (
            r#"{"type":"subscribe","channel":"kline","symbol":"BTC-USDT","interval":"2m"}"#,
            "INVALID_PARAMS",
        ),
    ];
    for (text, code) in cases {
        assert!(c.handle_text(text).is_err(), "{text}");
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1, "{text}");
        assert_eq!(frames[0]["code"], code, "{text}");
    }
    assert_eq!(h.metrics.export()["protocol_errors"], cases.len() as u64);
}

#[tokio::test]
async fn test_trade_event_reaches_subscribers() {
    let h = Harness::new();
    let aggregator = Arc::new(
        KlineAggregator::new(
            CandleStore::in_memory(),
            AggregationConfig::default(),
            h.metrics.clone(),
        )
        .with_listener(h.dispatcher.clone()),
    );
    let ingester = TradeIngester::new(aggregator, IngesterConfig::default(), h.metrics.clone())
        .with_dispatcher(h.dispatcher.clone());

    let (c, mut rx) = h.connect();
    c.handle_text(SUB_KLINE).unwrap();
    c.handle_text(r#"{"type":"subscribe","channel":"trade","symbol":"BTC-USDT"}"#)
        .unwrap();
    drain(&mut rx);

    let event: TradeExecutedEvent = serde_json::from_str(
        r#"{
            "event_id": "evt-1",
            "event_type": "TRADE_EXECUTED",
            "timestamp": "2024-11-17T10:32:45Z",
            "payload": {
                "trade_id": "trade_001",
                "symbol": "BTC/USDT",
                "price": "50000.00",
                "quantity": "0.1",
                "maker_side": "SELL"
            }
        }"#,
    )
    .unwrap();

    let result = ingester.ingest_event(&event).await.unwrap();
    assert!(matches!(result, IngestionResult::Accepted { .. }));

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["type"], "trade");
    assert_eq!(frames[0]["data"]["tradeId"], "trade_001");
    assert_eq!(frames[0]["data"]["takerSide"], "BUY");
    assert_eq!(frames[1]["type"], "kline");
    assert_eq!(frames[1]["data"]["open"], "50000.00");

    // Redelivery is dropped before anything is pushed.
    assert_eq!(ingester.ingest_event(&event).await.unwrap(), IngestionResult::Dropped);
    assert!(drain(&mut rx).is_empty());
}
