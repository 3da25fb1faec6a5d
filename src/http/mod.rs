//! HTTP surface: router assembly, auth, rate limiting, DTOs and the error
//! envelope.

pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod rate_limit;

pub use auth::Authorization;
pub use rate_limit::RateLimiter;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use crate::idempotency::middleware::idempotency_guard;
use crate::AppState;

/// Assemble the application router.
///
/// Layer order, outermost first: trace, rate limit, idempotency, then the
/// per-route auth guards. Rate limiting runs before any body buffering.
pub fn router(state: Arc<AppState>) -> Router {
    let admin = |s: &Arc<AppState>| middleware::from_fn_with_state(s.clone(), auth::require_admin);
    let user_or_admin =
        |s: &Arc<AppState>| middleware::from_fn_with_state(s.clone(), auth::require_user_or_admin);

    Router::new()
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        .route(
            "/team/add",
            post(handlers::team::add_team).route_layer(admin(&state)),
        )
        .route(
            "/team/get",
            get(handlers::team::get_team).route_layer(user_or_admin(&state)),
        )
        .route(
            "/users/setIsActive",
            post(handlers::user::set_is_active).route_layer(admin(&state)),
        )
        .route(
            "/users/getReview",
            get(handlers::user::get_review).route_layer(user_or_admin(&state)),
        )
        .route(
            "/pullRequest/create",
            post(handlers::pull_request::create).route_layer(admin(&state)),
        )
        .route(
            "/pullRequest/merge",
            post(handlers::pull_request::merge).route_layer(admin(&state)),
        )
        .route(
            "/pullRequest/reassign",
            post(handlers::pull_request::reassign).route_layer(admin(&state)),
        )
        .route(
            "/stats/assignments",
            get(handlers::stats::assignments).route_layer(admin(&state)),
        )
        .route(
            "/stats/summary",
            get(handlers::stats::summary).route_layer(admin(&state)),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            idempotency_guard,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
