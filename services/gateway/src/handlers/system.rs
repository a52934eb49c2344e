use axum::{Json, extract::State};
use chrono::Utc;
use market_data::SERVICE_VERSION;
use serde_json::{Value, json};

use crate::state::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "UP",
        "service": "market-service",
        "version": SERVICE_VERSION,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Live connection and subscription counts plus the exported counters.
pub async fn websocket_stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "connections": state.registry.total_connections(),
        "subscriptions": state.registry.total_subscriptions(),
        "metrics": state.metrics.export(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
