//! Resolution engine.
//!
//! Turns loosely-specified lookups into concrete upstream fetches. Each
//! lookup walks a short state machine, terminal on the first branch that
//! produces candidates:
//!
//! 1. Reuse - a previously issued `mrel-*` identifier is decoded and the
//!    exact entity fetched; if upstream says it no longer exists we fall
//!    through to search instead of failing.
//! 2. Scoped search - a parent-scope hint resolves the parent first (also
//!    cached), then searches within that scope.
//! 3. Free search - title only.
//!
//! Candidate lists preserve upstream relevance order and are capped at
//! [`MATCH_PAGE_SIZE`]. All upstream reads go through the cache store;
//! the cache store in turn rides the admission-controlled client.

use std::sync::Arc;

use serde_json::json;

use crate::cache::CacheStore;
use crate::clients::upstream::{
    CollectionRecord, ItemRecord, MediaRecord, PersonRecord, UpstreamClient, UpstreamError,
};
use crate::config::SamplingConfig;
use crate::error::ResolveError;
use crate::models::identifier::Identifier;
use crate::models::provider::{Candidate, EntityKind, ResolveRequest};

/// Maximum candidates returned by a match lookup.
pub const MATCH_PAGE_SIZE: u32 = 10;

/// Resolution engine over one upstream client and one cache store.
///
/// Constructed once at startup and shared by reference; holds no
/// per-request state.
pub struct Resolver {
    pub(crate) upstream: Arc<UpstreamClient>,
    pub(crate) cache: Arc<CacheStore>,
    pub(crate) sampling: SamplingConfig,
}

impl Resolver {
    pub fn new(upstream: Arc<UpstreamClient>, cache: Arc<CacheStore>, sampling: SamplingConfig) -> Self {
        Self {
            upstream,
            cache,
            sampling,
        }
    }

    /// Match entry point: ordered candidates for a lookup request.
    pub async fn resolve(&self, req: &ResolveRequest) -> Result<Vec<Candidate>, UpstreamError> {
        let mut candidates = match req.kind {
            EntityKind::Collection => self.match_collection(req).await?,
            EntityKind::Bucket => self.match_bucket(req).await?,
            EntityKind::Item => self.match_item(req).await?,
            EntityKind::Media => self.match_media(req).await?,
            EntityKind::Person => self.match_person(req).await?,
        };
        candidates.truncate(MATCH_PAGE_SIZE as usize);
        Ok(candidates)
    }

    /// Fetch exactly the entity an identifier points at, or `None` if it
    /// is gone upstream. Malformed identifiers are the caller's fault.
    pub async fn fetch_detail(&self, raw: &str) -> Result<Option<Candidate>, ResolveError> {
        let identifier = Identifier::decode(raw)?;
        tracing::debug!(identifier = %identifier, "fetching detail");

        let candidate = match identifier {
            Identifier::Collection { slug } => self
                .collection_detail(&slug)
                .await?
                .map(|rec| Candidate::from_collection(&rec)),
            Identifier::Bucket { slug, year } => {
                // Buckets are synthetic; their display data comes from the
                // owning collection.
                self.collection_detail(&slug).await?.map(|col| {
                    Candidate::bucket(&slug, &col.name, year, col.logo.clone())
                })
            }
            Identifier::Item { id } => self
                .item_detail(&id)
                .await?
                .as_ref()
                .map(Candidate::from_item),
            Identifier::Media { id } => self
                .media_detail(&id)
                .await?
                .as_ref()
                .map(Candidate::from_media),
            Identifier::Person { id } => self
                .person_detail(&id)
                .await?
                .as_ref()
                .map(Candidate::from_person),
        };

        Ok(candidate)
    }

    // --- Match paths ---

    async fn match_collection(&self, req: &ResolveRequest) -> Result<Vec<Candidate>, UpstreamError> {
        tracing::info!(title = ?req.title, "matching collection");
        let mut candidates = Vec::new();

        if let Some(Identifier::Collection { slug }) = self.reusable_identifier(req) {
            if let Some(rec) = self.collection_detail(&slug).await? {
                candidates.push(Candidate::from_collection(&rec));
            }
        }

        if candidates.is_empty() {
            if let Some(title) = req.title.as_deref() {
                let records = self.search_collections(title).await?;
                candidates.extend(records.iter().map(Candidate::from_collection));
            }
        }

        Ok(candidates)
    }

    async fn match_bucket(&self, req: &ResolveRequest) -> Result<Vec<Candidate>, UpstreamError> {
        tracing::info!(parent = ?req.parent_title, index = ?req.index, "matching bucket");
        let mut candidates = Vec::new();

        if let Some(Identifier::Bucket { slug, year }) = self.reusable_identifier(req) {
            if let Some(col) = self.collection_detail(&slug).await? {
                let slug = col.slug.clone().unwrap_or(slug);
                candidates.push(Candidate::bucket(&slug, &col.name, year, col.logo.clone()));
            }
        }

        if candidates.is_empty() {
            if let Some(parent) = req.parent_title.as_deref() {
                if let Some(col) = self.search_collections(parent).await?.first() {
                    let slug = col.slug.clone().unwrap_or_else(|| col.id.clone());
                    let year = req
                        .index
                        .or(req.year)
                        .unwrap_or_else(|| chrono::Datelike::year(&chrono::Utc::now()));
                    candidates.push(Candidate::bucket(&slug, &col.name, year, col.logo.clone()));
                }
            }
        }

        Ok(candidates)
    }

    async fn match_item(&self, req: &ResolveRequest) -> Result<Vec<Candidate>, UpstreamError> {
        tracing::info!(title = ?req.title, parent = ?req.parent_title, date = ?req.date, "matching item");
        let mut candidates = Vec::new();

        if let Some(Identifier::Item { id }) = self.reusable_identifier(req) {
            if let Some(rec) = self.item_detail(&id).await? {
                candidates.push(Candidate::from_item(&rec));
            }
        }

        if candidates.is_empty() && (req.title.is_some() || req.parent_title.is_some()) {
            // Scoped search resolves the parent collection first; a parent
            // that cannot be resolved degrades to a free search.
            let scope = match req.parent_title.as_deref() {
                Some(parent) => self.resolve_collection_scope(parent).await?,
                None => None,
            };

            let records = self
                .search_items(req.title.as_deref(), scope.as_deref(), req.date.as_deref())
                .await?;
            candidates.extend(records.iter().map(Candidate::from_item));
        }

        Ok(candidates)
    }

    async fn match_media(&self, req: &ResolveRequest) -> Result<Vec<Candidate>, UpstreamError> {
        tracing::info!(title = ?req.title, year = ?req.year, "matching media");
        let mut candidates = Vec::new();

        if let Some(Identifier::Media { id }) = self.reusable_identifier(req) {
            if let Some(rec) = self.media_detail(&id).await? {
                candidates.push(Candidate::from_media(&rec));
            }
        }

        if candidates.is_empty() {
            if let Some(title) = req.title.as_deref() {
                let records = self.search_media(title, req.year).await?;
                candidates.extend(records.iter().map(Candidate::from_media));
            }
        }

        Ok(candidates)
    }

    async fn match_person(&self, req: &ResolveRequest) -> Result<Vec<Candidate>, UpstreamError> {
        tracing::info!(title = ?req.title, "matching person");
        let mut candidates = Vec::new();

        if let Some(Identifier::Person { id }) = self.reusable_identifier(req) {
            if let Some(rec) = self.person_detail(&id).await? {
                candidates.push(Candidate::from_person(&rec));
            }
        }

        if candidates.is_empty() {
            if let Some(title) = req.title.as_deref() {
                let records = self.search_persons(title).await?;
                candidates.extend(records.iter().map(Candidate::from_person));
            }
        }

        Ok(candidates)
    }

    /// Decode the request's prior identifier, if any.
    ///
    /// Identifiers from other namespaces (or stale formats) are ignored
    /// rather than rejected: the consumer may hand us keys issued by other
    /// agents, and a match request must still fall through to search.
    fn reusable_identifier(&self, req: &ResolveRequest) -> Option<Identifier> {
        let raw = req.identifier.as_deref()?;
        match Identifier::decode(raw) {
            Ok(identifier) => Some(identifier),
            Err(e) => {
                tracing::debug!(identifier = raw, error = %e, "ignoring unrecognized identifier");
                None
            }
        }
    }

    // --- Cached detail fetches ---
    //
    // Upstream not-found resolves to Ok(None) with a warning; the caller
    // decides whether that means "empty result" or "fall through to
    // search". Transport and provider faults propagate.

    pub(crate) async fn collection_detail(
        &self,
        slug: &str,
    ) -> Result<Option<CollectionRecord>, UpstreamError> {
        let params = json!({ "slug": slug });
        let upstream = Arc::clone(&self.upstream);
        let owned = slug.to_string();
        let result = self
            .cache
            .get_or_fetch("collection-detail", &params, None, move || async move {
                upstream.get_collection(&owned).await
            })
            .await;
        match result {
            Ok(rec) => Ok(Some(rec)),
            Err(UpstreamError::NotFound(_)) => {
                tracing::warn!(slug, "collection not found upstream");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn item_detail(&self, id: &str) -> Result<Option<ItemRecord>, UpstreamError> {
        let params = json!({ "id": id });
        let upstream = Arc::clone(&self.upstream);
        let owned = id.to_string();
        let result = self
            .cache
            .get_or_fetch("item-detail", &params, None, move || async move {
                upstream.get_item(&owned).await
            })
            .await;
        match result {
            Ok(rec) => Ok(Some(rec)),
            Err(UpstreamError::NotFound(_)) => {
                tracing::warn!(id, "item not found upstream");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn media_detail(&self, id: &str) -> Result<Option<MediaRecord>, UpstreamError> {
        let params = json!({ "id": id });
        let upstream = Arc::clone(&self.upstream);
        let owned = id.to_string();
        let result = self
            .cache
            .get_or_fetch("media-detail", &params, None, move || async move {
                upstream.get_media(&owned).await
            })
            .await;
        match result {
            Ok(rec) => Ok(Some(rec)),
            Err(UpstreamError::NotFound(_)) => {
                tracing::warn!(id, "media not found upstream");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn person_detail(
        &self,
        id: &str,
    ) -> Result<Option<PersonRecord>, UpstreamError> {
        let params = json!({ "id": id });
        let upstream = Arc::clone(&self.upstream);
        let owned = id.to_string();
        let result = self
            .cache
            .get_or_fetch("person-detail", &params, None, move || async move {
                upstream.get_person(&owned).await
            })
            .await;
        match result {
            Ok(rec) => Ok(Some(rec)),
            Err(UpstreamError::NotFound(_)) => {
                tracing::warn!(id, "person not found upstream");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // --- Cached searches ---

    async fn search_collections(&self, q: &str) -> Result<Vec<CollectionRecord>, UpstreamError> {
        let params = json!({ "q": q, "per_page": MATCH_PAGE_SIZE });
        let upstream = Arc::clone(&self.upstream);
        let owned = q.to_string();
        self.cache
            .get_or_fetch("collection-list", &params, None, move || async move {
                Ok(upstream
                    .search_collections(&owned, 1, MATCH_PAGE_SIZE)
                    .await?
                    .data)
            })
            .await
    }

    /// Resolve a parent-title hint to a collection scope slug.
    async fn resolve_collection_scope(
        &self,
        parent_title: &str,
    ) -> Result<Option<String>, UpstreamError> {
        let params = json!({ "q": parent_title, "per_page": 1 });
        let upstream = Arc::clone(&self.upstream);
        let owned = parent_title.to_string();
        let records: Vec<CollectionRecord> = self
            .cache
            .get_or_fetch("collection-list", &params, None, move || async move {
                Ok(upstream.search_collections(&owned, 1, 1).await?.data)
            })
            .await?;
        Ok(records
            .first()
            .map(|rec| rec.slug.clone().unwrap_or_else(|| rec.id.clone())))
    }

    async fn search_items(
        &self,
        q: Option<&str>,
        collection: Option<&str>,
        date: Option<&str>,
    ) -> Result<Vec<ItemRecord>, UpstreamError> {
        let params = json!({ "q": q, "collection": collection, "date": date, "per_page": MATCH_PAGE_SIZE });
        let upstream = Arc::clone(&self.upstream);
        let q = q.map(str::to_string);
        let collection = collection.map(str::to_string);
        let date = date.map(str::to_string);
        self.cache
            .get_or_fetch("item-search", &params, None, move || async move {
                Ok(upstream
                    .search_items(
                        q.as_deref(),
                        collection.as_deref(),
                        date.as_deref(),
                        1,
                        MATCH_PAGE_SIZE,
                    )
                    .await?
                    .data)
            })
            .await
    }

    async fn search_media(
        &self,
        q: &str,
        year: Option<i32>,
    ) -> Result<Vec<MediaRecord>, UpstreamError> {
        let params = json!({ "q": q, "year": year, "per_page": MATCH_PAGE_SIZE });
        let upstream = Arc::clone(&self.upstream);
        let owned = q.to_string();
        self.cache
            .get_or_fetch("media-search", &params, None, move || async move {
                Ok(upstream
                    .search_media(&owned, year, 1, MATCH_PAGE_SIZE)
                    .await?
                    .data)
            })
            .await
    }

    async fn search_persons(&self, q: &str) -> Result<Vec<PersonRecord>, UpstreamError> {
        let params = json!({ "q": q, "per_page": MATCH_PAGE_SIZE });
        let upstream = Arc::clone(&self.upstream);
        let owned = q.to_string();
        self.cache
            .get_or_fetch("person-search", &params, None, move || async move {
                Ok(upstream
                    .search_persons(&owned, 1, MATCH_PAGE_SIZE)
                    .await?
                    .data)
            })
            .await
    }
}
