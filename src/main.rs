use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use reviewer_service::config::Config;
use reviewer_service::http::{router, Authorization, RateLimiter};
use reviewer_service::selection::RandomSelection;
use reviewer_service::storage::SqliteStore;
use reviewer_service::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting reviewer service");

    let config = Config::from_env().context("Failed to load configuration")?;

    info!("Using database: {}", config.database_path.display());
    let store = Arc::new(
        SqliteStore::new(&config.database_path)
            .context("Failed to initialize SQLite database")?,
    );

    let mut state = AppState::new(store.clone(), Arc::new(RandomSelection::new()))
        .with_idempotency(store, config.idempotency_ttl)
        .with_rate_limiter(RateLimiter::new(
            config.rate_limit_requests,
            config.rate_limit_interval,
            config.rate_limit_trust_forward,
        ));

    match (&config.admin_secret, &config.user_secret) {
        (Some(admin), Some(user)) => {
            state = state.with_auth(Authorization::new(
                admin.as_bytes().to_vec(),
                user.as_bytes().to_vec(),
            ));
        }
        (None, None) => {
            info!("No token secrets configured, authentication disabled");
        }
        _ => {
            anyhow::bail!("ADMIN_SECRET and USER_SECRET must be set together");
        }
    }

    let app = router(Arc::new(state));

    let listener = TcpListener::bind(config.http_addr).await?;
    info!("Server listening on {}", config.http_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
