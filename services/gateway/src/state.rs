use std::sync::Arc;

use market_data::aggregation::KlineAggregator;
use market_data::config::WsConfig;
use market_data::dispatcher::FanoutDispatcher;
use market_data::ingestion::TradeIngester;
use market_data::metrics::ServiceMetrics;
use market_data::registry::SubscriptionRegistry;
use market_data::store::CandleStore;
use market_data::websocket::SessionContext;
use tokio::sync::watch;

use crate::config::GatewayConfig;

/// Shared handles for every request and socket.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SubscriptionRegistry>,
    pub metrics: Arc<ServiceMetrics>,
    pub aggregator: Arc<KlineAggregator>,
    pub dispatcher: Arc<FanoutDispatcher>,
    pub ingester: Arc<TradeIngester>,
    pub ws_config: WsConfig,
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    /// Wire the service graph over `store`: ingester → aggregator →
    /// dispatcher → registry.
    pub fn new(config: &GatewayConfig, store: CandleStore, shutdown: watch::Receiver<bool>) -> Self {
        let metrics = Arc::new(ServiceMetrics::new());
        let registry = Arc::new(SubscriptionRegistry::new(
            config.ws.max_subscriptions_per_connection,
        ));
        let dispatcher = Arc::new(FanoutDispatcher::new(registry.clone(), metrics.clone()));
        let aggregator = Arc::new(
            KlineAggregator::new(store, config.aggregation.clone(), metrics.clone())
                .with_listener(dispatcher.clone()),
        );
        let ingester = Arc::new(
            TradeIngester::new(aggregator.clone(), config.ingester.clone(), metrics.clone())
                .with_dispatcher(dispatcher.clone()),
        );

        Self {
            registry,
            metrics,
            aggregator,
            dispatcher,
            ingester,
            ws_config: config.ws.clone(),
            shutdown,
        }
    }

    pub fn session_context(&self) -> SessionContext {
        SessionContext {
            registry: self.registry.clone(),
            metrics: self.metrics.clone(),
            config: self.ws_config.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}
