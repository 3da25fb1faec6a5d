//! Reviewer assignment service.
//!
//! Assigns and re-assigns code reviewers to pull requests for teams of
//! users, with an idempotency layer making POST mutations safe to retry.

pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod idempotency;
pub mod selection;
pub mod service;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use http::{Authorization, RateLimiter};
use idempotency::IdempotencyStore;
use selection::ReviewerSelection;
use service::{PullRequestService, StatsService, TeamService, UserService};
use storage::Store;

/// Shared application state handed to every handler and middleware.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub teams: TeamService,
    pub users: UserService,
    pub pull_requests: PullRequestService,
    pub stats: StatsService,
    pub idempotency: Option<Arc<dyn IdempotencyStore>>,
    pub idempotency_ttl: Duration,
    pub auth: Option<Authorization>,
    pub rate_limiter: Option<RateLimiter>,
}

impl AppState {
    /// State with idempotency, auth and rate limiting all disabled; enable
    /// each with the builder methods below.
    pub fn new(store: Arc<dyn Store>, selection: Arc<dyn ReviewerSelection>) -> Self {
        Self {
            teams: TeamService::new(store.clone()),
            users: UserService::new(store.clone()),
            pull_requests: PullRequestService::new(store.clone(), selection),
            stats: StatsService::new(store.clone()),
            store,
            idempotency: None,
            idempotency_ttl: Duration::from_secs(60),
            auth: None,
            rate_limiter: None,
        }
    }

    pub fn with_idempotency(mut self, store: Arc<dyn IdempotencyStore>, ttl: Duration) -> Self {
        self.idempotency = Some(store);
        self.idempotency_ttl = ttl;
        self
    }

    pub fn with_auth(mut self, auth: Authorization) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }
}
