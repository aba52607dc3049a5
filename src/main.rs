// =============================================================================
// aurafx-engine — real-time FX trading pipeline entry point
// =============================================================================
//
// Wires every subsystem in AppState, spawns the market-data ingestor and the
// HTTP/WS control surface, and waits for Ctrl+C to shut down cooperatively:
// the ingestor flushes open candles and the order dispatcher drains its
// queue before the process exits.
// =============================================================================

mod api;
mod app_state;
mod blackout;
mod broadcast;
mod broker;
mod candles;
mod config;
mod dispatcher;
mod errors;
mod indicators;
mod live_trading;
mod market_stream;
mod positions;
mod rate_limiter;
mod repository;
mod signals;
mod types;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::broker::GmoClient;
use crate::config::{load_trading_config, EngineConfig, TradingConfig};
use crate::repository::{EventRepository, InMemoryEventRepository, JsonFileEventRepository};

const TRADING_CONFIG_PATH: &str = "trading_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("aurafx-engine starting up");

    let engine_config = EngineConfig::default();
    let trading_config = load_trading_config(TRADING_CONFIG_PATH).unwrap_or_else(TradingConfig::default);

    info!(symbols = ?engine_config.symbols, endpoint = %engine_config.websocket_endpoint, "engine configured");

    let broker = match (std::env::var("BROKER_API_KEY"), std::env::var("BROKER_API_SECRET")) {
        (Ok(key), Ok(secret)) if !key.is_empty() && !secret.is_empty() => {
            info!("broker credentials present — live order dispatch enabled");
            Some(Arc::new(GmoClient::new(key, secret)))
        }
        _ => {
            warn!("no broker credentials configured — running signal-only (no live orders will be placed)");
            None
        }
    };

    let repository: Arc<dyn EventRepository> = match std::env::var("AURAFX_EVENT_LOG_PATH") {
        Ok(path) if !path.is_empty() => {
            info!(path = %path, "persisting events to newline-delimited JSON file");
            Arc::new(JsonFileEventRepository::new(path))
        }
        _ => Arc::new(InMemoryEventRepository::default()),
    };

    let state = Arc::new(AppState::new(
        engine_config,
        trading_config,
        TRADING_CONFIG_PATH.into(),
        broker,
        repository,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ingestor_state = state.clone();
    let ingestor_shutdown = shutdown_rx.clone();
    let ingestor = tokio::spawn(async move {
        let stream = ingestor_state.market_stream();
        stream.run(ingestor_shutdown).await;
    });

    let api_state = state.clone();
    let bind_addr = std::env::var("AURAFX_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(listener) => {
                info!(addr = %bind_addr, "API server listening");
                if let Err(err) = axum::serve(listener, app).await {
                    error!(%err, "API server failed");
                }
            }
            Err(err) => error!(%err, addr = %bind_addr, "failed to bind API server"),
        }
    });

    info!("all subsystems running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping gracefully");

    let _ = shutdown_tx.send(true);
    if let Err(err) = ingestor.await {
        error!(%err, "ingestor task panicked during shutdown");
    }

    state.broadcast.close();
    state.dispatcher.stop().await;

    if let Err(err) = state.save_config() {
        error!(%err, "failed to save trading config on shutdown");
    }

    info!("aurafx-engine shut down complete");
    Ok(())
}
