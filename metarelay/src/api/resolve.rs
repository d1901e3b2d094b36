//! Resolution endpoints: match, detail, children.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::models::provider::{Candidate, ResolveRequest};
use crate::AppState;

/// Response for a match lookup: ordered candidates, upstream relevance
/// order preserved.
#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub size: usize,
    pub candidates: Vec<Candidate>,
}

/// POST /resolve
pub async fn resolve(
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Json<MatchResponse>> {
    let candidates = state.resolver.resolve(&request).await?;
    Ok(Json(MatchResponse {
        size: candidates.len(),
        candidates,
    }))
}

/// Response for a detail lookup. `metadata` is absent when the entity no
/// longer exists upstream; that is not an error.
#[derive(Debug, Serialize)]
pub struct DetailResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Candidate>,
}

/// GET /metadata/{identifier}
pub async fn fetch_detail(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> ApiResult<Json<DetailResponse>> {
    let metadata = state.resolver.fetch_detail(&identifier).await?;
    Ok(Json(DetailResponse { metadata }))
}

#[derive(Debug, Deserialize)]
pub struct ChildrenQuery {
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// Response for a children listing.
#[derive(Debug, Serialize)]
pub struct ChildrenResponse {
    pub size: usize,
    pub total_count: i64,
    pub offset: i64,
    pub items: Vec<Candidate>,
}

/// GET /metadata/{identifier}/children
pub async fn fetch_children(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    Query(query): Query<ChildrenQuery>,
) -> ApiResult<Json<ChildrenResponse>> {
    let page = state
        .resolver
        .fetch_children(&identifier, query.offset, query.limit)
        .await?;

    // A missing parent yields an empty listing, not an error.
    let (items, total_count, offset) = match page {
        Some(page) => (page.items, page.total_count, page.offset),
        None => (Vec::new(), 0, query.offset),
    };

    Ok(Json(ChildrenResponse {
        size: items.len(),
        total_count,
        offset,
        items,
    }))
}

/// Build resolution routes
pub fn resolve_routes() -> Router<AppState> {
    Router::new()
        .route("/resolve", post(resolve))
        .route("/metadata/:identifier", get(fetch_detail))
        .route("/metadata/:identifier/children", get(fetch_children))
}
