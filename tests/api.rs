//! End-to-end router tests over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use reviewer_service::http::{router, Authorization, RateLimiter};
use reviewer_service::selection::RandomSelection;
use reviewer_service::storage::{MemoryIdempotencyStore, MemoryStore};
use reviewer_service::AppState;

fn app() -> Router {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store, Arc::new(RandomSelection::with_seed(11)))
        .with_idempotency(Arc::new(MemoryIdempotencyStore::new()), Duration::from_secs(60));
    router(Arc::new(state))
}

fn post(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_with_key(path: &str, body: Value, key: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .header("Idempotency-Key", key)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(path)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

fn backend_team() -> Value {
    json!({
        "team_name": "backend",
        "members": [
            {"user_id": "author", "username": "alice", "is_active": true},
            {"user_id": "rev1", "username": "bob", "is_active": true},
            {"user_id": "rev2", "username": "carol", "is_active": true},
        ]
    })
}

async fn seed_team(app: &Router) {
    let response = app
        .clone()
        .oneshot(post("/team/add", backend_team()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

fn create_pr_body(id: &str) -> Value {
    json!({
        "pull_request_id": id,
        "pull_request_name": "Add search endpoint",
        "author_id": "author",
    })
}

#[tokio::test]
async fn create_merge_reassign_flow() {
    let app = app();
    seed_team(&app).await;

    // Create: both eligible teammates get assigned.
    let response = app
        .clone()
        .oneshot(post("/pullRequest/create", create_pr_body("pr-1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let reviewers = body["pr"]["assigned_reviewers"].as_array().unwrap();
    assert_eq!(reviewers.len(), 2);
    for reviewer in reviewers {
        assert_ne!(reviewer, "author");
    }
    assert_eq!(body["pr"]["status"], "OPEN");

    // Merge is idempotent and keeps the first timestamp.
    let response = app
        .clone()
        .oneshot(post("/pullRequest/merge", json!({"pull_request_id": "pr-1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let merged_at = body_json(response).await["pr"]["mergedAt"].clone();
    assert!(merged_at.is_string());

    let response = app
        .clone()
        .oneshot(post("/pullRequest/merge", json!({"pull_request_id": "pr-1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["pr"]["mergedAt"], merged_at);

    // Reassign on a merged PR fails with PR_MERGED.
    let old = body_json(
        app.clone()
            .oneshot(get("/stats/assignments"))
            .await
            .unwrap(),
    )
    .await["by_user"]
        .as_object()
        .unwrap()
        .keys()
        .next()
        .unwrap()
        .clone();
    let response = app
        .clone()
        .oneshot(post(
            "/pullRequest/reassign",
            json!({"pull_request_id": "pr-1", "old_user_id": old}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"]["code"], "PR_MERGED");
}

#[tokio::test]
async fn reassign_swaps_in_a_fresh_teammate() {
    let app = app();
    let team = json!({
        "team_name": "backend",
        "members": [
            {"user_id": "author", "username": "alice", "is_active": true},
            {"user_id": "rev1", "username": "bob", "is_active": true},
            {"user_id": "rev2", "username": "carol", "is_active": true},
            {"user_id": "rev3", "username": "dave", "is_active": true},
        ]
    });
    let response = app.clone().oneshot(post("/team/add", team)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(post("/pullRequest/create", create_pr_body("pr-1")))
        .await
        .unwrap();
    let body = body_json(response).await;
    let reviewers: Vec<String> = body["pr"]["assigned_reviewers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();

    let response = app
        .clone()
        .oneshot(post(
            "/pullRequest/reassign",
            json!({"pull_request_id": "pr-1", "old_user_id": reviewers[0]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let replaced_by = body["replaced_by"].as_str().unwrap();
    assert_ne!(replaced_by, reviewers[0]);
    assert_ne!(replaced_by, reviewers[1]);
    assert_ne!(replaced_by, "author");
    assert_eq!(body["pr"]["assigned_reviewers"][1], reviewers[1].as_str());
    assert_eq!(body["pr"]["assigned_reviewers"][0], replaced_by);
}

#[tokio::test]
async fn duplicate_team_and_pull_request_conflict() {
    let app = app();
    seed_team(&app).await;

    let response = app
        .clone()
        .oneshot(post("/team/add", backend_team()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "TEAM_EXISTS");

    app.clone()
        .oneshot(post("/pullRequest/create", create_pr_body("pr-1")))
        .await
        .unwrap();
    let response = app
        .clone()
        .oneshot(post("/pullRequest/create", create_pr_body("pr-1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"]["code"], "PR_EXISTS");
}

#[tokio::test]
async fn team_and_user_read_endpoints() {
    let app = app();
    seed_team(&app).await;
    app.clone()
        .oneshot(post("/pullRequest/create", create_pr_body("pr-1")))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get("/team/get?team_name=backend"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    // Members come back sorted by username.
    let usernames: Vec<&str> = body["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["username"].as_str().unwrap())
        .collect();
    assert_eq!(usernames, vec!["alice", "bob", "carol"]);

    let response = app.clone().oneshot(get("/team/get")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(get("/team/get?team_name=ghost"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "NOT_FOUND");

    let response = app
        .clone()
        .oneshot(get("/users/getReview?user_id=rev1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user_id"], "rev1");
    assert_eq!(body["pull_requests"].as_array().unwrap().len(), 1);
    assert_eq!(body["pull_requests"][0]["pull_request_id"], "pr-1");
}

#[tokio::test]
async fn set_is_active_removes_user_from_selection() {
    let app = app();
    seed_team(&app).await;

    for user in ["rev1", "rev2"] {
        let response = app
            .clone()
            .oneshot(post(
                "/users/setIsActive",
                json!({"user_id": user, "is_active": false}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["user"]["is_active"], false);
    }

    let response = app
        .clone()
        .oneshot(post("/pullRequest/create", create_pr_body("pr-1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert!(body["pr"]["assigned_reviewers"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn idempotent_replay_returns_identical_response() {
    let app = app();
    seed_team(&app).await;

    let first = app
        .clone()
        .oneshot(post_with_key(
            "/pullRequest/create",
            create_pr_body("pr-1"),
            "key-1",
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_body = body_bytes(first).await;

    for _ in 0..3 {
        let replay = app
            .clone()
            .oneshot(post_with_key(
                "/pullRequest/create",
                create_pr_body("pr-1"),
                "key-1",
            ))
            .await
            .unwrap();
        assert_eq!(replay.status(), StatusCode::CREATED);
        assert_eq!(body_bytes(replay).await, first_body, "replay must be byte-identical");
    }

    // Without the key the handler runs again and the duplicate id conflicts.
    let response = app
        .clone()
        .oneshot(post("/pullRequest/create", create_pr_body("pr-1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn key_reuse_with_different_request_is_rejected() {
    let app = app();
    seed_team(&app).await;

    let first = app
        .clone()
        .oneshot(post_with_key(
            "/pullRequest/create",
            create_pr_body("pr-1"),
            "key-1",
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_body = body_bytes(first).await;

    let response = app
        .clone()
        .oneshot(post_with_key(
            "/pullRequest/create",
            create_pr_body("pr-2"),
            "key-1",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "INVALID_REQUEST");

    // The stored record is untouched: the original request still replays.
    let replay = app
        .clone()
        .oneshot(post_with_key(
            "/pullRequest/create",
            create_pr_body("pr-1"),
            "key-1",
        ))
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::CREATED);
    assert_eq!(body_bytes(replay).await, first_body);
}

#[tokio::test]
async fn error_responses_are_not_cached() {
    let app = app();
    // No team yet: creation fails with 404 under an idempotency key.
    let response = app
        .clone()
        .oneshot(post_with_key(
            "/pullRequest/create",
            create_pr_body("pr-1"),
            "key-1",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // After fixing the precondition, the same key succeeds.
    seed_team(&app).await;
    let response = app
        .clone()
        .oneshot(post_with_key(
            "/pullRequest/create",
            create_pr_body("pr-1"),
            "key-1",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn oversized_idempotent_body_is_rejected() {
    let app = app();
    let huge = "x".repeat((1 << 20) + 1);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/pullRequest/create")
        .header(header::CONTENT_TYPE, "application/json")
        .header("Idempotency-Key", "key-1")
        .body(Body::from(huge))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn malformed_json_is_invalid_request() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/team/add")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn health_endpoints_answer() {
    let app = app();
    let response = app.clone().oneshot(get("/health/live")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.clone().oneshot(get("/health/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

fn token(secret: &[u8], payload: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(payload.as_bytes());
    let signed = format!("{header}.{payload}");
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).unwrap();
    mac.update(signed.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    format!("Bearer {signed}.{signature}")
}

fn secured_app() -> Router {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store, Arc::new(RandomSelection::with_seed(11)))
        .with_auth(Authorization::new(b"admin-secret".to_vec(), b"user-secret".to_vec()));
    router(Arc::new(state))
}

fn with_auth(mut request: Request<Body>, bearer: &str) -> Request<Body> {
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, bearer.parse().unwrap());
    request
}

#[tokio::test]
async fn admin_routes_require_admin_token() {
    let app = secured_app();
    let admin = token(b"admin-secret", r#"{"sub":"boss","role":"admin"}"#);
    let user = token(b"user-secret", r#"{"sub":"rev1","role":"user"}"#);

    // No token.
    let response = app
        .clone()
        .oneshot(post("/team/add", backend_team()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "UNAUTHORIZED");

    // User token on an admin route.
    let response = app
        .clone()
        .oneshot(with_auth(post("/team/add", backend_team()), &user))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Admin token succeeds.
    let response = app
        .clone()
        .oneshot(with_auth(post("/team/add", backend_team()), &admin))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn user_token_sees_own_team_and_own_reviews_only() {
    let app = secured_app();
    let admin = token(b"admin-secret", r#"{"sub":"boss","role":"admin"}"#);
    let member = token(b"user-secret", r#"{"sub":"rev1","role":"user"}"#);
    let outsider = token(b"user-secret", r#"{"sub":"stranger","role":"user"}"#);

    let response = app
        .clone()
        .oneshot(with_auth(post("/team/add", backend_team()), &admin))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(with_auth(get("/team/get?team_name=backend"), &member))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(with_auth(get("/team/get?team_name=backend"), &outsider))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"]["code"], "TEAM_FORBIDDEN");

    let response = app
        .clone()
        .oneshot(with_auth(get("/users/getReview?user_id=rev1"), &member))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(with_auth(get("/users/getReview?user_id=rev1"), &outsider))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn rate_limited_requests_get_retry_after() {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store, Arc::new(RandomSelection::with_seed(11)))
        .with_rate_limiter(RateLimiter::new(2, Duration::from_secs(60), false));
    let app = router(Arc::new(state));

    for _ in 0..2 {
        let response = app.clone().oneshot(get("/health/live")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app.clone().oneshot(get("/health/live")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(body_json(response).await["error"]["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn stats_reflect_assignments() {
    let app = app();
    seed_team(&app).await;
    app.clone()
        .oneshot(post("/pullRequest/create", create_pr_body("pr-1")))
        .await
        .unwrap();

    let response = app.clone().oneshot(get("/stats/assignments")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let by_user = body["by_user"].as_object().unwrap();
    assert_eq!(by_user.values().map(|v| v.as_u64().unwrap()).sum::<u64>(), 2);
    assert_eq!(body["by_pull_request"]["pr-1"], 2);

    let response = app.clone().oneshot(get("/stats/summary")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["reviewers_count"], 2);
    assert_eq!(body["pull_requests_count"], 1);
    assert_eq!(body["assignments_total"], 2);
}
