//! metarelay - metadata resolution service
//!
//! Sits between a hierarchy-organized consumer and a rate-limited upstream
//! metadata provider: resolves loose lookups to canonical upstream records
//! through a two-tier cache, without exceeding the provider's request
//! budget.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use metarelay::cache::CacheStore;
use metarelay::clients::{TokenBucket, UpstreamClient};
use metarelay::config::Settings;
use metarelay::services::Resolver;
use metarelay::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting metarelay (metadata resolution service)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration: env vars > TOML file > defaults
    let settings = Settings::load().map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;
    let api_key = settings
        .upstream_api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("UPSTREAM_API_KEY must be set"))?;

    // Open or create the database holding the durable cache tier
    info!("Database: {}", settings.database_path.display());
    let db_pool = metarelay::db::init_database_pool(&settings.database_path).await?;
    info!("Database connection established");

    // One admission controller guards every upstream call
    let limiter = Arc::new(TokenBucket::new(
        settings.upstream_burst_size,
        settings.upstream_rate_limit,
    ));
    let upstream = Arc::new(
        UpstreamClient::new(&settings.upstream_base_url, &api_key, limiter)
            .map_err(|e| anyhow::anyhow!("upstream client init failed: {e}"))?,
    );
    info!(
        "Upstream client ready: {} ({} req/s, burst {})",
        settings.upstream_base_url, settings.upstream_rate_limit, settings.upstream_burst_size
    );

    let cache = Arc::new(CacheStore::new(db_pool, settings.ttl.clone()));
    let resolver = Arc::new(Resolver::new(
        Arc::clone(&upstream),
        Arc::clone(&cache),
        settings.sampling.clone(),
    ));

    let state = AppState::new(resolver, cache);
    let app = metarelay::build_router(state);

    // Start server
    let addr = format!("{}:{}", settings.bind_host, settings.bind_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
