use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};

use crate::domain::{Requester, UserId};
use crate::http::dto::{
    PullRequestShortDto, ReviewAssignmentsResponse, SetUserActiveRequest, UserDto, UserResponse,
};
use crate::http::error::{forbidden, invalid_request, respond};
use crate::AppState;

pub async fn set_is_active(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SetUserActiveRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = payload else {
        return invalid_request("invalid JSON payload");
    };
    match state.users.set_is_active(&req.user_id, req.is_active).await {
        Ok(user) => Json(UserResponse {
            user: UserDto::from_domain(&user),
        })
        .into_response(),
        Err(err) => respond(&err),
    }
}

pub async fn get_review(
    State(state): State<Arc<AppState>>,
    requester: Option<Extension<Requester>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(user_id) = params.get("user_id").map(|n| n.trim()).filter(|n| !n.is_empty())
    else {
        return invalid_request("user_id query parameter is required");
    };
    let user_id: UserId = user_id.into();
    let requester = requester.map(|Extension(r)| r).unwrap_or_default();
    if !requester.can_view_assignments_of(&user_id) {
        return forbidden("cannot view assignments of another user");
    }

    match state.users.review_assignments(&user_id).await {
        Ok(assigned) => Json(ReviewAssignmentsResponse {
            user_id,
            pull_requests: assigned.iter().map(PullRequestShortDto::from_domain).collect(),
        })
        .into_response(),
        Err(err) => respond(&err),
    }
}
