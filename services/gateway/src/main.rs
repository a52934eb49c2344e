mod config;
mod error;
mod handlers;
mod router;
mod state;

use config::GatewayConfig;
use market_data::store::CandleStore;
use router::create_router;
use state::AppState;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Loads .env first so RUST_LOG from the file applies
    let config = GatewayConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(
        version = market_data::SERVICE_VERSION,
        ws_path = %config.ws_path,
        idle_timeout_ms = config.ws.idle_timeout.as_millis() as u64,
        queue_capacity = config.ws.queue_capacity,
        drop_policy = ?config.ws.drop_policy,
        "Starting market data gateway"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = AppState::new(&config, CandleStore::in_memory(), shutdown_rx);
    let app = create_router(state, &config.ws_path);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

/// Resolves on Ctrl-C and tells every push session to close.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
    let _ = shutdown_tx.send(true);
}
