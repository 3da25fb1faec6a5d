use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};

use crate::domain::Requester;
use crate::http::dto::{TeamDto, TeamResponse};
use crate::http::error::{invalid_request, respond};
use crate::AppState;

pub async fn add_team(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TeamDto>, JsonRejection>,
) -> Response {
    let Ok(Json(dto)) = payload else {
        return invalid_request("invalid JSON payload");
    };
    let team = match dto.to_domain() {
        Ok(team) => team,
        Err(err) => return respond(&err.into()),
    };
    match state.teams.add_team(team).await {
        Ok(team) => (
            StatusCode::CREATED,
            Json(TeamResponse {
                team: TeamDto::from_domain(&team),
            }),
        )
            .into_response(),
        Err(err) => respond(&err),
    }
}

pub async fn get_team(
    State(state): State<Arc<AppState>>,
    requester: Option<Extension<Requester>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(name) = params.get("team_name").map(|n| n.trim()).filter(|n| !n.is_empty())
    else {
        return invalid_request("team_name query parameter is required");
    };
    let requester = requester.map(|Extension(r)| r).unwrap_or_default();

    match state.teams.get_team(&requester, &name.into()).await {
        Ok(team) => Json(TeamDto::from_domain(&team)).into_response(),
        Err(err) => respond(&err),
    }
}
