//! Axum idempotency guard.
//!
//! Buffers POST requests carrying an `Idempotency-Key` header, replays the
//! stored response for exact retries and rejects key reuse with a different
//! request. Responses with status >= 400 are never cached, so a client can
//! retry a failed call with the same key.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use tracing::error;

use crate::http::error::{internal, invalid_request, payload_too_large};
use crate::AppState;

use super::{IdempotencyRecord, StoredRequest, StoredResponse};

/// Requests above this size are rejected before any lookup or handler work.
pub const MAX_BODY_BYTES: usize = 1 << 20;

const IDEMPOTENCY_KEY: &str = "idempotency-key";

pub async fn idempotency_guard(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(store) = &state.idempotency else {
        return next.run(request).await;
    };
    if request.method() != Method::POST {
        return next.run(request).await;
    }
    let key = match request
        .headers()
        .get(IDEMPOTENCY_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
    {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => return next.run(request).await,
    };

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return payload_too_large(),
    };

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());
    let fingerprint = StoredRequest {
        method: parts.method.to_string(),
        path,
        body: bytes.to_vec(),
    };

    match store.get(&key).await {
        Ok(Some(record)) => {
            if !record.request.matches(&fingerprint) {
                return invalid_request("idempotency key reused with a different request");
            }
            return replay_response(&record.response);
        }
        Ok(None) => {}
        Err(err) => {
            // Availability over replay protection: a broken lookup must not
            // take the write path down with it.
            error!(key = %key, "idempotency lookup failed: {err}");
        }
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    let response = next.run(request).await;

    let (parts, body) = response.into_parts();
    let response_bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!("failed to buffer response body: {err}");
            return internal();
        }
    };

    if parts.status.as_u16() < 400 {
        let record = IdempotencyRecord {
            request: fingerprint,
            response: StoredResponse {
                status: parts.status.as_u16(),
                body: response_bytes.to_vec(),
                headers: header_map(&parts.headers),
            },
        };
        if let Err(err) = store.save(&key, record, state.idempotency_ttl).await {
            error!(key = %key, "failed to save idempotency record: {err}");
        }
    }

    Response::from_parts(parts, Body::from(response_bytes))
}

fn replay_response(stored: &StoredResponse) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(stored.status).unwrap_or(StatusCode::OK));
    for (name, value) in &stored.headers {
        let Ok(name) = name.parse::<HeaderName>() else {
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            continue;
        };
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(stored.body.clone()))
        .unwrap_or_else(|_| internal())
}

fn header_map(headers: &axum::http::HeaderMap) -> std::collections::HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}
