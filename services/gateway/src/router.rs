use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{internal, klines, system, ws};
use crate::state::AppState;

pub fn create_router(state: AppState, ws_path: &str) -> Router {
    let api_routes = Router::new()
        .route("/health", get(system::health))
        .route("/websocket/stats", get(system::websocket_stats))
        .route("/klines", get(klines::get_klines))
        .route("/internal/trades", post(internal::ingest_trade))
        .route("/internal/klines/complete", post(internal::complete_kline));

    Router::new()
        .route(ws_path, get(ws::ws_handler))
        .nest("/api/v1", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use market_data::store::CandleStore;
    use serde_json::{Value, json};
    use tokio::sync::watch;
    use tower::ServiceExt;

    use crate::config::GatewayConfig;

    fn app() -> (Router, AppState) {
        let config = GatewayConfig::from_lookup(|_| None).unwrap();
        let (_tx, rx) = watch::channel(false);
        let state = AppState::new(&config, CandleStore::in_memory(), rx);
        (create_router(state.clone(), &config.ws_path), state)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn trade(event_id: &str, price: &str, timestamp: &str) -> Value {
        json!({
            "event_id": event_id,
            "event_type": "TRADE_EXECUTED",
            "timestamp": timestamp,
            "payload": {
                "trade_id": format!("t-{event_id}"),
                "symbol": "BTC/USDT",
                "price": price,
                "quantity": "0.5",
                "maker_side": "BUY"
            }
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let (status, body) = send(&app, get_req("/api/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "UP");
        assert_eq!(body["service"], "market-service");
    }

    #[tokio::test]
    async fn test_stats() {
        let (app, _) = app();
        let (status, body) = send(&app, get_req("/api/v1/websocket/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connections"], 0);
        assert_eq!(body["subscriptions"], 0);
        assert_eq!(body["metrics"]["trades_ingested"], 0);
    }

    #[tokio::test]
    async fn test_ingest_then_query_klines() {
        let (app, _) = app();
        let (status, body) = send(
            &app,
            post_json("/api/v1/internal/trades", trade("e1", "100", "2024-11-17T10:32:45Z")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "accepted");
        assert_eq!(body["candles"], 9);

        send(
            &app,
            post_json("/api/v1/internal/trades", trade("e2", "110", "2024-11-17T10:33:10Z")),
        )
        .await;

        let (status, body) = send(
            &app,
            get_req("/api/v1/klines?symbol=BTC-USDT&interval=1m&limit=10"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let candles = body.as_array().unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0]["open"], "110");
        assert_eq!(candles[1]["open"], "100");

        let (_, body) = send(
            &app,
            get_req("/api/v1/klines?symbol=BTC/USDT&interval=1h"),
        )
        .await;
        let hour = &body.as_array().unwrap()[0];
        assert_eq!(hour["tradeCount"], 2);
        assert_eq!(hour["high"], "110");
    }

    #[tokio::test]
    async fn test_klines_range_query() {
        let (app, _) = app();
        for (id, time) in [
            ("e1", "2024-11-17T10:30:00Z"),
            ("e2", "2024-11-17T10:31:00Z"),
            ("e3", "2024-11-17T10:32:00Z"),
        ] {
            send(&app, post_json("/api/v1/internal/trades", trade(id, "1", time))).await;
        }

        // 10:30:00 to 10:32:00, end exclusive
        let (status, body) = send(
            &app,
            get_req("/api/v1/klines?symbol=BTC-USDT&interval=1m&startTime=1731839400&endTime=1731839520"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let open_times: Vec<i64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["openTime"].as_i64().unwrap())
            .collect();
        assert_eq!(open_times, vec![1_731_839_400, 1_731_839_460]);
    }

    #[tokio::test]
    async fn test_duplicate_and_invalid_trades() {
        let (app, _) = app();
        let event = trade("dup", "100", "2024-11-17T10:32:45Z");
        send(&app, post_json("/api/v1/internal/trades", event.clone())).await;
        let (status, body) = send(&app, post_json("/api/v1/internal/trades", event)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "duplicate");

        let (status, body) = send(
            &app,
            post_json("/api/v1/internal/trades", trade("bad", "-1", "2024-11-17T10:32:45Z")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_klines_validation() {
        let (app, _) = app();
        for uri in [
            "/api/v1/klines?symbol=BTC-USDT&interval=7m",
            "/api/v1/klines?symbol=BTC-USDT&interval=1m&limit=5000",
            "/api/v1/klines?symbol=BTC-USDT&interval=1m&limit=0",
            "/api/v1/klines?symbol=BTC-USDT&interval=1m&startTime=10",
            "/api/v1/klines?symbol=BTC-USDT&interval=1m&startTime=10&endTime=5",
        ] {
            let (status, body) = send(&app, get_req(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["error"], "BAD_REQUEST");
        }
    }

    #[tokio::test]
    async fn test_complete_kline() {
        let (app, state) = app();
        send(
            &app,
            post_json("/api/v1/internal/trades", trade("e1", "100", "2024-11-17T10:32:45Z")),
        )
        .await;

        let (status, body) = send(
            &app,
            post_json(
                "/api/v1/internal/klines/complete",
                json!({"symbol": "BTC-USDT", "interval": "1m", "openTime": 1_731_839_520}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["completed"], true);
        assert_eq!(state.metrics.export()["candles_completed"], 1);

        let (status, body) = send(
            &app,
            post_json(
                "/api/v1/internal/klines/complete",
                json!({"symbol": "BTC-USDT", "interval": "1m", "openTime": 0}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }
}
