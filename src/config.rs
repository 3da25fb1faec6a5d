use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    /// SQLite database file.
    pub database_path: PathBuf,
    pub http_addr: SocketAddr,
    /// Optional bearer-token secrets. Both unset disables authentication
    /// entirely; an empty or whitespace-only value counts as unset.
    pub admin_secret: Option<String>,
    pub user_secret: Option<String>,
    pub idempotency_ttl: Duration,
    pub rate_limit_requests: u32,
    pub rate_limit_interval: Duration,
    pub rate_limit_trust_forward: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_path = env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .context("DATABASE_PATH environment variable is required")?;

        let http_addr = env::var("HTTP_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .context("HTTP_ADDR must be a valid socket address")?;

        let admin_secret = parse_secret(env::var("ADMIN_SECRET").ok());
        let user_secret = parse_secret(env::var("USER_SECRET").ok());

        let idempotency_ttl = env::var("IDEMPOTENCY_TTL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<u64>()
            .map(Duration::from_secs)
            .context("IDEMPOTENCY_TTL_SECS must be a valid number")?;

        let rate_limit_requests = env::var("RATE_LIMIT_REQUESTS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()
            .context("RATE_LIMIT_REQUESTS must be a valid number")?;

        let rate_limit_interval = env::var("RATE_LIMIT_INTERVAL_SECS")
            .unwrap_or_else(|_| "1".to_string())
            .parse::<u64>()
            .map(Duration::from_secs)
            .context("RATE_LIMIT_INTERVAL_SECS must be a valid number")?;

        let rate_limit_trust_forward = env::var("RATE_LIMIT_TRUST_FORWARD")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        Ok(Config {
            database_path,
            http_addr,
            admin_secret,
            user_secret,
            idempotency_ttl,
            rate_limit_requests,
            rate_limit_interval,
            rate_limit_trust_forward,
        })
    }
}

/// Treat missing, empty, or whitespace-only secrets as unset so an empty
/// value cannot silently disable signature checks.
pub fn parse_secret(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
