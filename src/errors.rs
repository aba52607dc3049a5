// =============================================================================
// Engine error types
// =============================================================================

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Raised by an order-dispatch job factory to mean "don't send this, and
/// don't treat it as a failure either" — e.g. blackout started between
/// enqueue and send. The dispatcher resolves the caller's future with `None`
/// and does not retry.
#[derive(Debug, thiserror::Error)]
#[error("dispatch skipped: {0}")]
pub struct DispatchSkip(pub String);

/// Broker REST failures, split the way the dispatcher needs to decide
/// whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("rate limited or server error (status {0}), retryable")]
    Transient(u16),
    #[error("broker rejected request (status {0}): {1}")]
    Permanent(u16, String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Everything an order-dispatch job factory can fail with.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Skip(#[from] DispatchSkip),
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Errors surfaced by the HTTP API, mapped to status codes in `IntoResponse`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Internal(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
