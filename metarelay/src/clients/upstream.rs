//! Upstream metadata provider client.
//!
//! Thin typed wrapper over the provider's JSON API. Every request passes
//! through the shared [`TokenBucket`] before touching the wire, so the
//! provider's request budget is enforced in exactly one place. Records are
//! decoded into typed structs here at the boundary; nothing downstream
//! works with raw JSON maps.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clients::rate_limiter::TokenBucket;

const USER_AGENT: &str = concat!("metarelay/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upstream API errors.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream resource not found: {0}")]
    NotFound(String),

    #[error("upstream rate limit exceeded")]
    RateLimited,

    #[error("upstream API error {0}: {1}")]
    Api(u16, String),

    #[error("network error: {0}")]
    Network(String),

    #[error("response parse error: {0}")]
    Parse(String),
}

/// Studio/collection record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionRecord {
    pub id: String,
    #[serde(default)]
    pub slug: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub poster: Option<String>,
    /// Parent network the collection belongs to, if any.
    #[serde(default)]
    pub network: Option<String>,
}

/// Reference to a containing collection carried on item records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionRef {
    pub id: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Single item (episode-like) record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemRecord {
    pub id: String,
    pub title: String,
    /// Release date, `YYYY-MM-DD`.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub collection: Option<CollectionRef>,
}

/// Standalone media (movie-like) record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// Person record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

/// Pagination metadata attached to list responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PageMeta {
    #[serde(default)]
    pub current_page: Option<u32>,
    #[serde(default)]
    pub last_page: Option<u32>,
    #[serde(default)]
    pub total: Option<i64>,
}

/// Single-record response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// List response envelope.
#[derive(Debug, Deserialize)]
pub struct ListEnvelope<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub meta: PageMeta,
}

/// Async client for the upstream metadata API.
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    limiter: Arc<TokenBucket>,
}

impl UpstreamClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: &str,
        limiter: Arc<TokenBucket>,
    ) -> Result<Self, UpstreamError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| UpstreamError::Network(e.to_string()))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter,
        })
    }

    /// Rate-limited GET returning a decoded JSON body.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        self.limiter.acquire(1).await;

        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, ?query, "upstream request");

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(UpstreamError::NotFound(path.to_string()));
        }
        if status.as_u16() == 429 {
            return Err(UpstreamError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Api(status.as_u16(), body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::Parse(e.to_string()))
    }

    // --- Search endpoints ---

    pub async fn search_collections(
        &self,
        q: &str,
        page: u32,
        per_page: u32,
    ) -> Result<ListEnvelope<CollectionRecord>, UpstreamError> {
        let query = [
            ("q", q.to_string()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        self.get_json("/collections", &query).await
    }

    pub async fn search_items(
        &self,
        q: Option<&str>,
        collection: Option<&str>,
        date: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<ListEnvelope<ItemRecord>, UpstreamError> {
        let mut query = vec![
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        if let Some(q) = q {
            query.push(("q", q.to_string()));
        }
        if let Some(collection) = collection {
            query.push(("collection", collection.to_string()));
        }
        if let Some(date) = date {
            query.push(("date", date.to_string()));
        }
        self.get_json("/items", &query).await
    }

    pub async fn search_media(
        &self,
        q: &str,
        year: Option<i32>,
        page: u32,
        per_page: u32,
    ) -> Result<ListEnvelope<MediaRecord>, UpstreamError> {
        let mut query = vec![
            ("q", q.to_string()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        if let Some(year) = year {
            query.push(("year", year.to_string()));
        }
        self.get_json("/media", &query).await
    }

    pub async fn search_persons(
        &self,
        q: &str,
        page: u32,
        per_page: u32,
    ) -> Result<ListEnvelope<PersonRecord>, UpstreamError> {
        let query = [
            ("q", q.to_string()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        self.get_json("/persons", &query).await
    }

    // --- Detail endpoints ---

    pub async fn get_collection(&self, slug: &str) -> Result<CollectionRecord, UpstreamError> {
        let envelope: Envelope<CollectionRecord> = self
            .get_json(&format!("/collections/{slug}"), &[])
            .await?;
        Ok(envelope.data)
    }

    pub async fn get_item(&self, id: &str) -> Result<ItemRecord, UpstreamError> {
        let envelope: Envelope<ItemRecord> = self.get_json(&format!("/items/{id}"), &[]).await?;
        Ok(envelope.data)
    }

    pub async fn get_media(&self, id: &str) -> Result<MediaRecord, UpstreamError> {
        let envelope: Envelope<MediaRecord> = self.get_json(&format!("/media/{id}"), &[]).await?;
        Ok(envelope.data)
    }

    pub async fn get_person(&self, id: &str) -> Result<PersonRecord, UpstreamError> {
        let envelope: Envelope<PersonRecord> =
            self.get_json(&format!("/persons/{id}"), &[]).await?;
        Ok(envelope.data)
    }

    // --- Hierarchy listing ---

    /// List a collection's items, optionally filtered to one year.
    pub async fn collection_items(
        &self,
        slug: &str,
        page: u32,
        per_page: u32,
        year: Option<i32>,
    ) -> Result<ListEnvelope<ItemRecord>, UpstreamError> {
        let mut query = vec![
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        if let Some(year) = year {
            query.push(("date", year.to_string()));
        }
        self.get_json(&format!("/collections/{slug}/items"), &query)
            .await
    }
}
