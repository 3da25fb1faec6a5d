use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::AppState;

pub async fn liveness() -> Response {
    Json(json!({"status": "ok"})).into_response()
}

/// Ready only when the store answers.
pub async fn readiness(State(state): State<Arc<AppState>>) -> Response {
    match state.store.ping().await {
        Ok(()) => Json(json!({"status": "ok"})).into_response(),
        Err(err) => {
            error!("readiness probe failed: {err}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable", "message": "store unreachable"})),
            )
                .into_response()
        }
    }
}
