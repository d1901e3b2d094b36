//! metarelay library interface
//!
//! A resolution layer between a hierarchy-organized consumer
//! (collection -> year bucket -> item) and a single rate-limited upstream
//! metadata provider. Exposes public APIs for integration testing.

pub mod api;
pub mod cache;
pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::cache::CacheStore;
use crate::services::Resolver;

/// Application state shared across handlers.
///
/// One resolver and one cache store per process, constructed at startup
/// and handed around by reference; nothing here is a global.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<Resolver>,
    pub cache: Arc<CacheStore>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(resolver: Arc<Resolver>, cache: Arc<CacheStore>) -> Self {
        Self {
            resolver,
            cache,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::resolve_routes())
        .merge(api::cache_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
