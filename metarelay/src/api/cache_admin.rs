//! Cache administration endpoints.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::AppState;

/// GET /cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.stats().await)
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearRequest {
    /// Restrict the clear to one logical category.
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: i64,
}

/// POST /cache/clear
pub async fn clear_cache(
    State(state): State<AppState>,
    body: Option<Json<ClearRequest>>,
) -> Json<ClearResponse> {
    let category = body.and_then(|Json(req)| req.category);
    let cleared = state.cache.clear(category.as_deref()).await;
    Json(ClearResponse { cleared })
}

/// POST /cache/clear-expired
pub async fn clear_expired_cache(State(state): State<AppState>) -> Json<ClearResponse> {
    let cleared = state.cache.clear_expired().await;
    Json(ClearResponse { cleared })
}

/// Build cache administration routes
pub fn cache_routes() -> Router<AppState> {
    Router::new()
        .route("/cache/stats", get(cache_stats))
        .route("/cache/clear", post(clear_cache))
        .route("/cache/clear-expired", post(clear_expired_cache))
}
