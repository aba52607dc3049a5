// =============================================================================
// WebSocket handler — forwards BroadcastHub events to a connected subscriber
// =============================================================================
//
// Each connection gets its own `broadcast::Subscription` (a bounded,
// drop-oldest-on-full FIFO — see broadcast.rs). Every event the pipeline
// publishes (`ticker`/`candle`/`indicator`/`signal`/`position`) is forwarded
// as `{"type": ..., "data": ...}` the moment it is received; there is no
// periodic snapshot push, since BroadcastHub already carries the ordering
// contract spec.md §4.10 describes.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::api::auth::validate_token;
use crate::app_state::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Validates the `?token=` query parameter (the `Authorization` header is not
/// available to browser WebSocket clients) before upgrading.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let token = query.token.unwrap_or_default();
    if !validate_token(&token) {
        warn!("WebSocket connection rejected: invalid token");
        return (axum::http::StatusCode::FORBIDDEN, "Invalid or missing token").into_response();
    }

    info!("WebSocket connection accepted — upgrading");
    ws.on_upgrade(move |socket| handle_connection(socket, state)).into_response()
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let mut subscription = state.broadcast.subscribe();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    info!("broadcast hub closed subscriber — disconnecting");
                    break;
                };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if let Err(err) = sender.send(Message::Text(json.into())).await {
                            debug!(%err, "websocket send failed — disconnecting");
                            break;
                        }
                    }
                    Err(err) => warn!(%err, "failed to serialise event for websocket subscriber"),
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("websocket closed by client");
                        break;
                    }
                    Some(Err(err)) => {
                        warn!(%err, "websocket receive error — disconnecting");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    state.broadcast.unsubscribe(subscription.id);
}
