use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;

use crate::http::dto::{
    CreatePullRequestRequest, MergePullRequestRequest, PullRequestDto, PullRequestResponse,
    ReassignResponse, ReassignReviewerRequest,
};
use crate::http::error::{invalid_request, respond};
use crate::AppState;

pub async fn create(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreatePullRequestRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = payload else {
        return invalid_request("invalid JSON payload");
    };
    let pr = match req.to_domain(Utc::now()) {
        Ok(pr) => pr,
        Err(err) => return respond(&err.into()),
    };
    match state.pull_requests.create(pr).await {
        Ok(pr) => (
            StatusCode::CREATED,
            Json(PullRequestResponse {
                pr: PullRequestDto::from_domain(&pr),
            }),
        )
            .into_response(),
        Err(err) => respond(&err),
    }
}

pub async fn merge(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MergePullRequestRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = payload else {
        return invalid_request("invalid JSON payload");
    };
    match state
        .pull_requests
        .merge(&req.pull_request_id, Utc::now())
        .await
    {
        Ok(pr) => Json(PullRequestResponse {
            pr: PullRequestDto::from_domain(&pr),
        })
        .into_response(),
        Err(err) => respond(&err),
    }
}

pub async fn reassign(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ReassignReviewerRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = payload else {
        return invalid_request("invalid JSON payload");
    };
    match state
        .pull_requests
        .reassign(&req.pull_request_id, &req.old_user_id)
        .await
    {
        Ok((pr, replaced_by)) => Json(ReassignResponse {
            pr: PullRequestDto::from_domain(&pr),
            replaced_by,
        })
        .into_response(),
        Err(err) => respond(&err),
    }
}
