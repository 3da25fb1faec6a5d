use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::http::dto::SummaryResponse;
use crate::http::error::respond;
use crate::AppState;

pub async fn assignments(State(state): State<Arc<AppState>>) -> Response {
    match state.stats.assignments().await {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => respond(&err),
    }
}

pub async fn summary(State(state): State<Arc<AppState>>) -> Response {
    match state.stats.assignments().await {
        Ok(stats) => Json(SummaryResponse {
            reviewers_count: stats.by_user.len() as u64,
            pull_requests_count: stats.by_pull_request.len() as u64,
            assignments_total: stats.total(),
        })
        .into_response(),
        Err(err) => respond(&err),
    }
}
