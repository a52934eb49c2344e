use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use market_data::ingestion::IngestionError;
use serde_json::json;
use thiserror::Error;
use types::errors::{AggregationError, StoreError};

/// Central error type for the HTTP handlers
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::InternalError(e.into())
    }
}

impl From<IngestionError> for AppError {
    fn from(e: IngestionError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl From<AggregationError> for AppError {
    fn from(e: AggregationError) -> Self {
        match e {
            AggregationError::InvalidTrade { reason } => AppError::BadRequest(reason),
            other => AppError::InternalError(other.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BAD_REQUEST"),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND"),
            AppError::InternalError(e) => {
                tracing::error!(error = %e, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "INTERNAL_ERROR",
                )
            }
        };

        let body = Json(json!({
            "error": code,
            "message": message
        }));

        (status, body).into_response()
    }
}
