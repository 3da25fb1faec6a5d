//! HTTP error envelope.
//!
//! Every failure is serialized as `{"error": {"code", "message"}}` with a
//! stable machine-readable code. The mapping from domain errors to codes
//! and status codes lives here and nowhere else.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::domain::DomainError;
use crate::error::Error;

pub const TEAM_EXISTS: &str = "TEAM_EXISTS";
pub const TEAM_MISMATCH: &str = "TEAM_MISMATCH";
pub const TEAM_FORBIDDEN: &str = "TEAM_FORBIDDEN";
pub const PR_EXISTS: &str = "PR_EXISTS";
pub const PR_MERGED: &str = "PR_MERGED";
pub const REVIEWER_LIMIT: &str = "REVIEWER_LIMIT";
pub const REVIEWER_EXISTS: &str = "REVIEWER_EXISTS";
pub const AUTHOR_IS_REVIEWER: &str = "AUTHOR_IS_REVIEWER";
pub const NOT_ASSIGNED: &str = "NOT_ASSIGNED";
pub const NO_CANDIDATE: &str = "NO_CANDIDATE";
pub const NOT_FOUND: &str = "NOT_FOUND";
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
pub const FORBIDDEN: &str = "FORBIDDEN";
pub const RATE_LIMITED: &str = "RATE_LIMITED";

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ApiError,
}

impl ErrorResponse {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ApiError {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }
}

fn reply(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(code, message))).into_response()
}

/// Translate a service error into its response. Internal failures are
/// logged here with their detail; the client only sees a generic message.
pub fn respond(err: &Error) -> Response {
    match err {
        Error::Domain(domain) => respond_domain(domain),
        Error::NotFound(entity) => {
            reply(StatusCode::NOT_FOUND, NOT_FOUND, format!("{entity} not found"))
        }
        Error::Storage { .. } => {
            error!("request failed: {err}");
            internal()
        }
    }
}

fn respond_domain(err: &DomainError) -> Response {
    let (status, code) = match err {
        DomainError::TeamExists => (StatusCode::BAD_REQUEST, TEAM_EXISTS),
        DomainError::TeamMismatch { .. } => (StatusCode::BAD_REQUEST, TEAM_MISMATCH),
        DomainError::TeamAccessDenied => (StatusCode::FORBIDDEN, TEAM_FORBIDDEN),
        DomainError::PullRequestExists => (StatusCode::CONFLICT, PR_EXISTS),
        DomainError::PullRequestAlreadyMerged => (StatusCode::CONFLICT, PR_MERGED),
        DomainError::ReviewerLimitExceeded => (StatusCode::CONFLICT, REVIEWER_LIMIT),
        DomainError::ReviewerAlreadyAssigned => (StatusCode::CONFLICT, REVIEWER_EXISTS),
        DomainError::AuthorIsReviewer => (StatusCode::BAD_REQUEST, AUTHOR_IS_REVIEWER),
        DomainError::ReviewerNotAssigned => (StatusCode::CONFLICT, NOT_ASSIGNED),
        DomainError::NoActiveCandidate => (StatusCode::CONFLICT, NO_CANDIDATE),
        DomainError::InvalidIdentifier(_) | DomainError::InvalidName(_) => {
            (StatusCode::BAD_REQUEST, INVALID_REQUEST)
        }
    };
    reply(status, code, err.to_string())
}

pub fn invalid_request(message: impl Into<String>) -> Response {
    reply(StatusCode::BAD_REQUEST, INVALID_REQUEST, message)
}

pub fn unauthorized() -> Response {
    reply(StatusCode::UNAUTHORIZED, UNAUTHORIZED, "authentication required")
}

pub fn forbidden(message: impl Into<String>) -> Response {
    reply(StatusCode::FORBIDDEN, FORBIDDEN, message)
}

pub fn payload_too_large() -> Response {
    reply(
        StatusCode::PAYLOAD_TOO_LARGE,
        INVALID_REQUEST,
        "request body too large",
    )
}

pub fn rate_limited(retry_after_secs: u64) -> Response {
    let mut response = reply(
        StatusCode::TOO_MANY_REQUESTS,
        RATE_LIMITED,
        "rate limit exceeded",
    );
    if let Ok(value) = retry_after_secs.to_string().parse() {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}

pub fn internal() -> Response {
    reply(
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_ERROR,
        "internal error",
    )
}
