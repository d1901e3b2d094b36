//! HTTP boundary tests: routing, status mapping, error envelopes.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tower::util::ServiceExt;

use metarelay::cache::CacheStore;
use metarelay::clients::{TokenBucket, UpstreamClient};
use metarelay::config::{CacheTtlConfig, SamplingConfig};
use metarelay::services::Resolver;
use metarelay::AppState;

/// Minimal mock upstream: one collection, searchable and fetchable.
async fn spawn_mock_upstream() -> String {
    async fn search(
        _q: axum::extract::Query<std::collections::HashMap<String, String>>,
    ) -> Json<Value> {
        Json(json!({
            "data": [{ "id": "c1", "slug": "acme-studio", "name": "Acme Studio" }],
            "meta": { "total": 1 }
        }))
    }
    async fn detail() -> Json<Value> {
        Json(json!({
            "data": { "id": "c1", "slug": "acme-studio", "name": "Acme Studio" }
        }))
    }

    let app = Router::new()
        .route("/collections", get(search))
        .route("/collections/:slug", get(detail));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn test_app(upstream_base: &str) -> Router {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    metarelay::db::init_tables(&pool).await.unwrap();

    let limiter = Arc::new(TokenBucket::new(1000, 1000.0));
    let upstream =
        Arc::new(UpstreamClient::new(upstream_base, "test-key", limiter).expect("client init"));
    let cache = Arc::new(CacheStore::new(pool, CacheTtlConfig::default()));
    let resolver = Arc::new(Resolver::new(
        upstream,
        Arc::clone(&cache),
        SamplingConfig::default(),
    ));

    metarelay::build_router(AppState::new(resolver, cache))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app("http://127.0.0.1:9").await;

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "metarelay");
}

#[tokio::test]
async fn malformed_identifier_maps_to_bad_request() {
    let app = test_app("http://127.0.0.1:9").await;

    let response = app
        .oneshot(
            Request::get("/metadata/mrel-playlist-9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn resolve_round_trip_issues_identifiers() {
    let upstream_base = spawn_mock_upstream().await;
    let app = test_app(&upstream_base).await;

    let request = Request::post("/resolve")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "kind": "collection", "title": "Acme Studio" }).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["size"], 1);
    assert_eq!(
        body["candidates"][0]["identifier"],
        "mrel-collection-acme-studio"
    );
}

#[tokio::test]
async fn detail_of_unreachable_upstream_is_a_server_error() {
    // Nothing listens on the upstream address, so the fetch is a
    // transport failure, which the boundary maps to a 500 envelope.
    let app = test_app("http://127.0.0.1:9").await;

    let response = app
        .oneshot(
            Request::get("/metadata/mrel-item-i1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
}

#[tokio::test]
async fn cache_stats_and_clear_endpoints() {
    let upstream_base = spawn_mock_upstream().await;
    let app = test_app(&upstream_base).await;

    // Populate the cache through a resolve call.
    let request = Request::post("/resolve")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "kind": "collection", "title": "Acme Studio" }).to_string(),
        ))
        .unwrap();
    app.clone().oneshot(request).await.unwrap();

    let response = app
        .clone()
        .oneshot(Request::get("/cache/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stats = body_json(response).await;
    assert_eq!(stats["total_entries"], 1);
    assert_eq!(stats["by_category"]["collection-list"], 1);

    let response = app
        .clone()
        .oneshot(
            Request::post("/cache/clear")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "category": "collection-list" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["cleared"], 1);

    let response = app
        .oneshot(
            Request::post("/cache/clear-expired")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["cleared"], 0);
}
