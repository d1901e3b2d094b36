//! End-to-end resolution tests against a mock upstream provider.
//!
//! The mock serves the provider's JSON envelope format from a local
//! listener and counts requests per endpoint, so tests can assert which
//! resolution path ran (reuse vs search) and how often the wire was hit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::Mutex;

use metarelay::cache::CacheStore;
use metarelay::clients::{TokenBucket, UpstreamClient};
use metarelay::config::{CacheTtlConfig, SamplingConfig};
use metarelay::error::ResolveError;
use metarelay::models::identifier::DecodeError;
use metarelay::models::provider::{EntityKind, ResolveRequest};
use metarelay::services::Resolver;

#[derive(Clone, Default)]
struct MockState {
    collection_search_hits: Arc<AtomicUsize>,
    item_search_hits: Arc<AtomicUsize>,
    last_item_query: Arc<Mutex<Option<HashMap<String, String>>>>,
}

fn acme_collection() -> serde_json::Value {
    json!({
        "id": "c1",
        "slug": "acme-studio",
        "name": "Acme Studio",
        "description": "A studio",
        "logo": "https://img.example.com/acme.png"
    })
}

async fn search_collections(
    State(state): State<MockState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    state.collection_search_hits.fetch_add(1, Ordering::SeqCst);
    let q = query.get("q").cloned().unwrap_or_default();
    let data = if q.to_lowercase().contains("acme") {
        vec![acme_collection()]
    } else {
        vec![]
    };
    let total = data.len();
    Json(json!({ "data": data, "meta": { "total": total } }))
}

async fn get_collection(Path(slug): Path<String>) -> Response {
    if slug == "acme-studio" {
        Json(json!({ "data": acme_collection() })).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn collection_items(
    Path(slug): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if slug != "acme-studio" {
        return StatusCode::NOT_FOUND.into_response();
    }

    match query.get("date").map(String::as_str) {
        // Year-filtered listing used by bucket children.
        Some("2024") => {
            let data: Vec<_> = (1..=2)
                .map(|i| {
                    json!({
                        "id": format!("i{i}"),
                        "title": format!("Acme Item {i}"),
                        "date": "2024-03-15"
                    })
                })
                .collect();
            Json(json!({
                "data": data,
                "meta": { "current_page": 1, "last_page": 3, "total": 5 }
            }))
            .into_response()
        }
        Some(_) => Json(json!({ "data": [], "meta": { "total": 0 } })).into_response(),
        // Unfiltered listing used by year sampling. The collection spans
        // 2022-2024 but the first page only reaches 2024 items; later
        // pages (never sampled with a 1-page window) hold the older ones.
        None => {
            let data: Vec<_> = (1..=100)
                .map(|i| {
                    json!({
                        "id": format!("s{i}"),
                        "title": format!("Sampled {i}"),
                        "date": "2024-06-01"
                    })
                })
                .collect();
            Json(json!({
                "data": data,
                "meta": { "current_page": 1, "last_page": 3, "total": 260 }
            }))
            .into_response()
        }
    }
}

async fn search_items(
    State(state): State<MockState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    state.item_search_hits.fetch_add(1, Ordering::SeqCst);
    *state.last_item_query.lock().await = Some(query);

    // More results than the match page size, to exercise the cap.
    let data: Vec<_> = (1..=12)
        .map(|i| {
            json!({
                "id": format!("i{i}"),
                "title": format!("Result {i}"),
                "date": "2024-01-02",
                "collection": { "id": "c1", "slug": "acme-studio", "name": "Acme Studio" }
            })
        })
        .collect();
    Json(json!({ "data": data, "meta": { "total": 12 } }))
}

async fn get_item(Path(id): Path<String>) -> Response {
    if id == "i1" {
        Json(json!({
            "data": {
                "id": "i1",
                "title": "Result 1",
                "date": "2024-01-02",
                "collection": { "id": "c1", "slug": "acme-studio", "name": "Acme Studio" }
            }
        }))
        .into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn spawn_mock_upstream() -> (String, MockState) {
    let state = MockState::default();
    let app = Router::new()
        .route("/collections", get(search_collections))
        .route("/collections/:slug", get(get_collection))
        .route("/collections/:slug/items", get(collection_items))
        .route("/items", get(search_items))
        .route("/items/:id", get(get_item))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), state)
}

async fn build_resolver(base_url: &str) -> Resolver {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    metarelay::db::init_tables(&pool).await.unwrap();

    // Generous budget so tests never sleep on the bucket.
    let limiter = Arc::new(TokenBucket::new(1000, 1000.0));
    let upstream =
        Arc::new(UpstreamClient::new(base_url, "test-key", limiter).expect("client init"));
    let cache = Arc::new(CacheStore::new(pool, CacheTtlConfig::default()));
    Resolver::new(upstream, cache, SamplingConfig::default())
}

fn request(kind: EntityKind) -> ResolveRequest {
    ResolveRequest {
        kind,
        title: None,
        identifier: None,
        parent_title: None,
        date: None,
        year: None,
        index: None,
    }
}

#[tokio::test]
async fn free_search_then_identifier_reuse() {
    let (base_url, mock) = spawn_mock_upstream().await;
    let resolver = build_resolver(&base_url).await;

    // First lookup: title only, goes through the search path.
    let mut req = request(EntityKind::Collection);
    req.title = Some("Acme Studio".to_string());
    let candidates = resolver.resolve(&req).await.unwrap();

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].title, "Acme Studio");
    assert_eq!(candidates[0].identifier, "mrel-collection-acme-studio");
    assert_eq!(mock.collection_search_hits.load(Ordering::SeqCst), 1);

    // Second lookup hands the issued identifier back: the reuse path
    // fetches the exact entity and the search endpoint is not consulted.
    let mut req = request(EntityKind::Collection);
    req.identifier = Some(candidates[0].identifier.clone());
    req.title = Some("Acme Studio".to_string());
    let candidates = resolver.resolve(&req).await.unwrap();

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].identifier, "mrel-collection-acme-studio");
    assert_eq!(mock.collection_search_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn candidates_preserve_upstream_order_capped_at_page_size() {
    let (base_url, _mock) = spawn_mock_upstream().await;
    let resolver = build_resolver(&base_url).await;

    let mut req = request(EntityKind::Item);
    req.title = Some("Result".to_string());
    let candidates = resolver.resolve(&req).await.unwrap();

    assert_eq!(candidates.len(), 10);
    for (i, candidate) in candidates.iter().enumerate() {
        assert_eq!(candidate.title, format!("Result {}", i + 1));
    }
}

#[tokio::test]
async fn stale_identifier_falls_through_to_search() {
    let (base_url, mock) = spawn_mock_upstream().await;
    let resolver = build_resolver(&base_url).await;

    let mut req = request(EntityKind::Collection);
    req.identifier = Some("mrel-collection-ghost-studio".to_string());
    req.title = Some("Acme Studio".to_string());
    let candidates = resolver.resolve(&req).await.unwrap();

    // The stale identifier 404s upstream; the lookup degrades to search
    // instead of failing.
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].identifier, "mrel-collection-acme-studio");
    assert_eq!(mock.collection_search_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scoped_search_passes_resolved_parent_scope() {
    let (base_url, mock) = spawn_mock_upstream().await;
    let resolver = build_resolver(&base_url).await;

    let mut req = request(EntityKind::Item);
    req.title = Some("Result".to_string());
    req.parent_title = Some("Acme Studio".to_string());
    req.date = Some("2024-01-02".to_string());
    let candidates = resolver.resolve(&req).await.unwrap();
    assert!(!candidates.is_empty());

    let query = mock.last_item_query.lock().await.clone().unwrap();
    assert_eq!(query.get("collection").map(String::as_str), Some("acme-studio"));
    assert_eq!(query.get("date").map(String::as_str), Some("2024-01-02"));
}

#[tokio::test]
async fn repeated_search_within_ttl_hits_cache_not_upstream() {
    let (base_url, mock) = spawn_mock_upstream().await;
    let resolver = build_resolver(&base_url).await;

    let mut req = request(EntityKind::Item);
    req.title = Some("Result".to_string());

    let first = resolver.resolve(&req).await.unwrap();
    let second = resolver.resolve(&req).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(mock.item_search_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn detail_of_missing_entity_is_absent_not_an_error() {
    let (base_url, _mock) = spawn_mock_upstream().await;
    let resolver = build_resolver(&base_url).await;

    let detail = resolver.fetch_detail("mrel-item-missing").await.unwrap();
    assert!(detail.is_none());
}

#[tokio::test]
async fn detail_round_trip_for_item() {
    let (base_url, _mock) = spawn_mock_upstream().await;
    let resolver = build_resolver(&base_url).await;

    let detail = resolver.fetch_detail("mrel-item-i1").await.unwrap().unwrap();
    assert_eq!(detail.title, "Result 1");
    assert_eq!(detail.kind, EntityKind::Item);
    assert_eq!(detail.parent_title.as_deref(), Some("Acme Studio"));
}

#[tokio::test]
async fn malformed_identifier_is_a_typed_decode_error() {
    let (base_url, _mock) = spawn_mock_upstream().await;
    let resolver = build_resolver(&base_url).await;

    let err = resolver.fetch_detail("imdb://tt42").await.unwrap_err();
    assert!(matches!(
        err,
        ResolveError::Decode(DecodeError::WrongNamespace(_))
    ));

    let err = resolver.fetch_detail("mrel-playlist-9").await.unwrap_err();
    assert!(matches!(
        err,
        ResolveError::Decode(DecodeError::UnknownKind(_))
    ));
}

#[tokio::test]
async fn year_sampling_misses_buckets_outside_the_window() {
    let (base_url, _mock) = spawn_mock_upstream().await;
    let resolver = build_resolver(&base_url).await;

    // The collection has items dated 2022-2024 upstream, but the 1-page
    // sampling window only sees 2024 items: only that bucket appears.
    let page = resolver
        .fetch_children("mrel-collection-acme-studio", 0, 50)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(page.total_count, 1);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].identifier, "mrel-bucket-acme-studio-2024");
    assert_eq!(page.items[0].title, "2024");
    assert_eq!(page.items[0].parent_title.as_deref(), Some("Acme Studio"));
}

#[tokio::test]
async fn bucket_children_report_total_distinct_from_page() {
    let (base_url, _mock) = spawn_mock_upstream().await;
    let resolver = build_resolver(&base_url).await;

    let page = resolver
        .fetch_children("mrel-bucket-acme-studio-2024", 0, 2)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total_count, 5);
    assert_eq!(page.offset, 0);
    assert_eq!(page.items[0].parent_title.as_deref(), Some("Acme Studio"));
}

#[tokio::test]
async fn children_of_missing_parent_are_absent() {
    let (base_url, _mock) = spawn_mock_upstream().await;
    let resolver = build_resolver(&base_url).await;

    let page = resolver
        .fetch_children("mrel-collection-ghost-studio", 0, 50)
        .await
        .unwrap();
    assert!(page.is_none());
}

#[tokio::test]
async fn bucket_match_synthesizes_year_from_index() {
    let (base_url, _mock) = spawn_mock_upstream().await;
    let resolver = build_resolver(&base_url).await;

    let mut req = request(EntityKind::Bucket);
    req.parent_title = Some("Acme Studio".to_string());
    req.index = Some(2023);
    let candidates = resolver.resolve(&req).await.unwrap();

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].identifier, "mrel-bucket-acme-studio-2023");
    assert_eq!(candidates[0].year, Some(2023));
    assert_eq!(candidates[0].parent_title.as_deref(), Some("Acme Studio"));
}
