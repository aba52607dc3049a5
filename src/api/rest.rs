// =============================================================================
// REST API — trading config, positions, signal history/summary, health
// =============================================================================
//
// Everything under `/api/v1/` except `/api/v1/healthz` requires a Bearer
// token (see `api::auth::AuthBearer`). CORS is permissive — the HTTP surface
// is a thin control/inspection plane, not itself part of spec.md's scope; it
// exists so the endpoints it names (§6: config, positions, signal history)
// compile against real components instead of being asserted from nowhere.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;
use crate::blackout::BlackoutWindow;
use crate::errors::ApiError;

pub fn router(state: Arc<AppState>) -> Router {
    use tower_http::cors::{Any, CorsLayer};

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/v1/healthz", get(healthz))
        .route("/api/v1/trading/config", get(get_trading_config))
        .route("/api/v1/trading/config", post(update_trading_config))
        .route("/api/v1/positions", get(list_positions))
        .route("/api/v1/positions/:symbol", post(close_position))
        .route("/api/v1/signals/history", get(signal_history))
        .route("/api/v1/signals/summary", get(signal_summary))
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    subscribers: usize,
}

async fn healthz(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.uptime_secs(),
        subscribers: state.broadcast.subscriber_count(),
    })
}

// =============================================================================
// Trading config
// =============================================================================

async fn get_trading_config(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(state.config.read().clone()).unwrap_or(serde_json::Value::Null))
}

#[derive(Deserialize)]
struct BlackoutWindowRequest {
    start: String,
    end: String,
}

#[derive(Deserialize)]
struct TradingConfigUpdate {
    #[serde(default)]
    trading_active: Option<bool>,
    #[serde(default)]
    pip_size: Option<f64>,
    #[serde(default)]
    lot_size: Option<f64>,
    #[serde(default)]
    stop_loss_pips: Option<f64>,
    #[serde(default)]
    take_profit_pips: Option<f64>,
    #[serde(default)]
    fee_rate: Option<f64>,
    #[serde(default)]
    trend_sma_period: Option<usize>,
    #[serde(default)]
    trend_threshold_pips: Option<f64>,
    #[serde(default)]
    atr_threshold_pips: Option<f64>,
    #[serde(default)]
    blackout_windows: Option<Vec<BlackoutWindowRequest>>,
}

/// Partial update of the live `TradingConfig`, persisted atomically.
/// `400` is returned if any `blackout_windows` entry fails to parse or has
/// `start >= end` (spec.md §7: "400 for bad inputs (invalid blackout ...)").
async fn update_trading_config(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(update): Json<TradingConfigUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let parsed_windows = match update.blackout_windows {
        Some(windows) => {
            let mut parsed = Vec::with_capacity(windows.len());
            for w in windows {
                let window = BlackoutWindow::parse(&w.start, &w.end).map_err(ApiError::BadRequest)?;
                parsed.push(window);
            }
            Some(parsed)
        }
        None => None,
    };

    {
        let mut cfg = state.config.write();
        if let Some(v) = update.trading_active {
            cfg.trading_active = v;
        }
        if let Some(v) = update.pip_size {
            cfg.pip_size = v;
        }
        if let Some(v) = update.lot_size {
            cfg.lot_size = v;
        }
        if let Some(v) = update.stop_loss_pips {
            cfg.stop_loss_pips = v;
        }
        if let Some(v) = update.take_profit_pips {
            cfg.take_profit_pips = v;
        }
        if let Some(v) = update.fee_rate {
            cfg.fee_rate = v;
        }
        if let Some(v) = update.trend_sma_period {
            cfg.trend_sma_period = v;
        }
        if let Some(v) = update.trend_threshold_pips {
            cfg.trend_threshold_pips = v;
        }
        if let Some(v) = update.atr_threshold_pips {
            cfg.atr_threshold_pips = v;
        }
        if let Some(windows) = parsed_windows {
            cfg.blackout_windows = Some(windows.clone());
            state.blackout.set_windows(windows);
        }
    }

    if let Err(err) = state.save_config() {
        warn!(%err, "failed to persist trading config");
    }
    info!("trading config updated via API");

    Ok(Json(serde_json::to_value(state.config.read().clone()).unwrap_or(serde_json::Value::Null)))
}

// =============================================================================
// Positions
// =============================================================================

async fn list_positions(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(state.positions.get_open_positions()).unwrap_or(serde_json::Value::Null))
}

#[derive(Deserialize)]
struct ClosePositionRequest {
    price: f64,
}

/// Manually close the first open position on `symbol`, regardless of
/// strategy or SL/TP bounds. `404` if no position is open on that symbol
/// (spec.md §7: "404 for unknown symbol position").
async fn close_position(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Json(req): Json<ClosePositionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pip_size = state.config.read().pip_size;
    let event = state
        .positions
        .close_position(&symbol, req.price, Utc::now(), pip_size)
        .ok_or_else(|| ApiError::NotFound(format!("no open position for symbol '{symbol}'")))?;

    state.broadcast.publish(crate::broadcast::Event::new("position", &event));
    info!(symbol, pnl = event.pnl, "position closed manually via API");
    Ok(Json(serde_json::to_value(&event).unwrap_or(serde_json::Value::Null)))
}

// =============================================================================
// Signal history / summary
// =============================================================================

#[derive(Deserialize)]
struct HistoryQuery {
    strategy: Option<String>,
    #[serde(default = "default_history_limit")]
    limit: usize,
}

fn default_history_limit() -> usize {
    100
}

async fn signal_history(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Json<serde_json::Value> {
    let events = state.signals.get_history(query.strategy.as_deref(), query.limit);
    Json(serde_json::to_value(events).unwrap_or(serde_json::Value::Null))
}

#[derive(Deserialize)]
struct SummaryQuery {
    strategy: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

async fn signal_summary(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SummaryQuery>,
) -> Json<serde_json::Value> {
    let summary = state.signals.get_summary(query.strategy.as_deref(), query.from, query.to);
    Json(serde_json::to_value(summary).unwrap_or(serde_json::Value::Null))
}
