//! Entry points for the upstream trade feed and the bucket-boundary
//! scheduler.

use axum::{Json, extract::State};
use market_data::events::TradeExecutedEvent;
use market_data::ingestion::IngestionResult;
use serde::Deserialize;
use serde_json::{Value, json};
use types::candle::Candle;
use types::ids::Symbol;
use types::interval::KlineInterval;

use crate::error::AppError;
use crate::state::AppState;

pub async fn ingest_trade(
    State(state): State<AppState>,
    Json(event): Json<TradeExecutedEvent>,
) -> Result<Json<Value>, AppError> {
    let body = match state.ingester.ingest_event(&event).await? {
        IngestionResult::Accepted { candles } => json!({
            "status": "accepted",
            "eventId": event.event_id,
            "candles": candles.len(),
        }),
        IngestionResult::Dropped => json!({
            "status": "duplicate",
            "eventId": event.event_id,
        }),
    };
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub symbol: String,
    pub interval: String,
    pub open_time: i64,
}

pub async fn complete_kline(
    State(state): State<AppState>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<Candle>, AppError> {
    let symbol = Symbol::from_pair(&request.symbol)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid symbol: {}", request.symbol)))?;
    let interval = KlineInterval::from_code(&request.interval).ok_or_else(|| {
        AppError::BadRequest(format!("Unsupported interval: {}", request.interval))
    })?;

    state
        .aggregator
        .mark_completed(&symbol, interval, request.open_time)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No candle for {symbol} {interval} at {}",
                request.open_time
            ))
        })
}
