//! Per-client rate limiting.
//!
//! Fixed-window token bucket keyed by client address: `limit` requests per
//! `interval`, the bucket refilling in full at each window boundary. Over
//! the limit the client gets 429 with a `Retry-After` hint.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

use crate::AppState;

use super::error::rate_limited;

struct Bucket {
    remaining: u32,
    window_start: Instant,
}

pub struct RateLimiter {
    limit: u32,
    interval: Duration,
    trust_forwarded: bool,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(limit: u32, interval: Duration, trust_forwarded: bool) -> Self {
        Self {
            limit: limit.max(1),
            interval,
            trust_forwarded,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Take one token for `key`. `Err` carries the time until the bucket
    /// refills.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Drop stale windows so one-off clients do not accumulate forever.
        if buckets.len() > 1024 {
            let interval = self.interval;
            buckets.retain(|_, b| now.duration_since(b.window_start) < interval);
        }

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            remaining: self.limit,
            window_start: now,
        });
        if now.duration_since(bucket.window_start) >= self.interval {
            bucket.remaining = self.limit;
            bucket.window_start = now;
        }

        if bucket.remaining == 0 {
            let elapsed = now.duration_since(bucket.window_start);
            return Err(self.interval.saturating_sub(elapsed));
        }
        bucket.remaining -= 1;
        Ok(())
    }

    fn client_key(&self, request: &Request) -> String {
        if self.trust_forwarded {
            if let Some(forwarded) = request
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
            {
                if let Some(first) = forwarded.split(',').next() {
                    let first = first.trim();
                    if !first.is_empty() {
                        return first.to_string();
                    }
                }
            }
        }
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(limiter) = &state.rate_limiter else {
        return next.run(request).await;
    };
    match limiter.check(&limiter.client_key(&request)) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => rate_limited(retry_after.as_secs().max(1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60), false);
        for _ in 0..3 {
            assert!(limiter.check("1.2.3.4").is_ok());
        }
        let retry_after = limiter.check("1.2.3.4").unwrap_err();
        assert!(retry_after <= Duration::from_secs(60));
    }

    #[test]
    fn buckets_are_per_client() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60), false);
        assert!(limiter.check("1.2.3.4").is_ok());
        assert!(limiter.check("5.6.7.8").is_ok());
        assert!(limiter.check("1.2.3.4").is_err());
    }

    #[test]
    fn window_refills_the_bucket() {
        let limiter = RateLimiter::new(1, Duration::from_millis(0), false);
        assert!(limiter.check("1.2.3.4").is_ok());
        // Zero-length window: the next check starts a fresh one.
        assert!(limiter.check("1.2.3.4").is_ok());
    }
}
