use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use types::candle::Candle;
use types::ids::Symbol;
use types::interval::KlineInterval;

use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KlineQuery {
    pub symbol: String,
    pub interval: String,
    pub limit: Option<usize>,
    /// Epoch seconds, inclusive.
    pub start_time: Option<i64>,
    /// Epoch seconds, exclusive.
    pub end_time: Option<i64>,
}

/// Latest candles newest first, or a time range oldest first when both
/// `startTime` and `endTime` are given.
pub async fn get_klines(
    State(state): State<AppState>,
    Query(query): Query<KlineQuery>,
) -> Result<Json<Vec<Candle>>, AppError> {
    let symbol = Symbol::from_pair(&query.symbol)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid symbol: {}", query.symbol)))?;
    let interval = KlineInterval::from_code(&query.interval)
        .ok_or_else(|| AppError::BadRequest(format!("Unsupported interval: {}", query.interval)))?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }

    let store = state.aggregator.store();
    let candles = match (query.start_time, query.end_time) {
        (Some(start), Some(end)) => {
            if start >= end {
                return Err(AppError::BadRequest(
                    "startTime must be before endTime".to_string(),
                ));
            }
            store.range(&symbol, interval, start, end, limit).await?
        }
        (None, None) => store.latest(&symbol, interval, limit).await?,
        _ => {
            return Err(AppError::BadRequest(
                "startTime and endTime must be given together".to_string(),
            ));
        }
    };

    Ok(Json(candles))
}
