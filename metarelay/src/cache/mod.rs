//! Two-tier response cache.
//!
//! Lookups hit the in-process memory tier first, then the durable SQLite
//! tier. The memory tier carries a short fixed TTL ceiling regardless of
//! category and is lost on restart; the durable tier carries the
//! category's configured TTL and survives restarts. A durable-tier failure
//! never fails a request: the store logs it and degrades to memory-only
//! caching for that call.
//!
//! The store owns entry lifetime and eviction. Callers read through
//! [`CacheStore::get_or_fetch`]; fetch failures propagate unchanged and
//! are never cached.

use std::collections::HashMap;
use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::config::CacheTtlConfig;
use crate::db::cache_entries;

/// Fixed ceiling for the memory tier, seconds. Entries promoted or written
/// into memory never outlive this window, whatever their category TTL.
pub const MEMORY_TTL_CEILING: i64 = 300;

struct MemoryEntry {
    category: String,
    payload: Value,
    expires_at: DateTime<Utc>,
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheStats {
    pub total_entries: i64,
    pub active_entries: i64,
    pub expired_entries: i64,
    pub total_hits: i64,
    pub memory_entries: i64,
    pub by_category: HashMap<String, i64>,
}

/// Two-tier keyed store with per-category TTL.
pub struct CacheStore {
    pool: SqlitePool,
    memory: RwLock<HashMap<String, MemoryEntry>>,
    ttl: CacheTtlConfig,
}

impl CacheStore {
    pub fn new(pool: SqlitePool, ttl: CacheTtlConfig) -> Self {
        Self {
            pool,
            memory: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Derive the cache key for a category + parameter set.
    ///
    /// Params are serialized as canonical JSON (`serde_json::Map` keeps
    /// keys sorted), so insertion order never changes the key.
    fn cache_key(category: &str, params: &Value) -> String {
        let canonical = serde_json::to_string(params).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(category.as_bytes());
        hasher.update(b":");
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up a cached value. Returns `None` on miss or expiry.
    pub async fn get(&self, category: &str, params: &Value) -> Option<Value> {
        let key = Self::cache_key(category, params);
        let now = Utc::now();

        // Memory tier first.
        {
            let memory = self.memory.read().await;
            if let Some(entry) = memory.get(&key) {
                if now < entry.expires_at {
                    tracing::debug!(category, key = %key, "memory cache hit");
                    return Some(entry.payload.clone());
                }
            }
        }
        // Expired memory entries are dropped eagerly.
        {
            let mut memory = self.memory.write().await;
            if let Some(entry) = memory.get(&key) {
                if now >= entry.expires_at {
                    memory.remove(&key);
                }
            }
        }

        // Durable tier.
        let row = match cache_entries::fetch(&self.pool, &key).await {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(category, error = %e, "durable cache tier unavailable, continuing memory-only");
                return None;
            }
        };

        let row = row?;
        let expires_at = row.expires_at()?;
        if now >= expires_at {
            return None;
        }

        let payload: Value = match serde_json::from_str(&row.payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(category, key = %key, error = %e, "discarding unreadable cache payload");
                return None;
            }
        };

        tracing::debug!(category, key = %key, "durable cache hit");
        if let Err(e) = cache_entries::record_hit(&self.pool, &key).await {
            tracing::warn!(error = %e, "failed to record cache hit");
        }

        // Promote into memory with the short fixed ceiling so follow-up
        // lookups skip the durable tier.
        let memory_expiry = now + Duration::seconds(MEMORY_TTL_CEILING.min(self.ttl.for_category(category)));
        self.memory.write().await.insert(
            key,
            MemoryEntry {
                category: category.to_string(),
                payload: payload.clone(),
                expires_at: memory_expiry,
            },
        );

        Some(payload)
    }

    /// Store a value under both tiers.
    ///
    /// `ttl_override` replaces the category's configured durable TTL; the
    /// memory tier is always capped at [`MEMORY_TTL_CEILING`].
    pub async fn set(&self, category: &str, params: &Value, value: &Value, ttl_override: Option<i64>) {
        let key = Self::cache_key(category, params);
        let now = Utc::now();
        let ttl = ttl_override.unwrap_or_else(|| self.ttl.for_category(category));
        let expires_at = now + Duration::seconds(ttl);

        let memory_ttl = ttl.min(MEMORY_TTL_CEILING);
        self.memory.write().await.insert(
            key.clone(),
            MemoryEntry {
                category: category.to_string(),
                payload: value.clone(),
                expires_at: now + Duration::seconds(memory_ttl),
            },
        );

        let payload = value.to_string();
        if let Err(e) =
            cache_entries::upsert(&self.pool, &key, category, &payload, now, expires_at).await
        {
            tracing::warn!(category, error = %e, "durable cache tier unavailable, entry kept memory-only");
        } else {
            tracing::debug!(category, key = %key, ttl, "cache set");
        }
    }

    /// Return the cached value for `category`/`params`, or run `fetch`,
    /// store its result under both tiers, and return it.
    ///
    /// Fetch errors propagate unchanged and nothing is cached for them.
    /// Two concurrent misses on the same key may both fetch; the second
    /// write wins and both callers get valid data.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        category: &str,
        params: &Value,
        ttl_override: Option<i64>,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get(category, params).await {
            match serde_json::from_value::<T>(cached) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    // Shape drift between releases lands here; refetch.
                    tracing::warn!(category, error = %e, "cached payload no longer deserializes, refetching");
                }
            }
        }

        let value = fetch().await?;
        match serde_json::to_value(&value) {
            Ok(json) => self.set(category, params, &json, ttl_override).await,
            Err(e) => {
                tracing::warn!(category, error = %e, "fetched value not serializable, skipping cache");
            }
        }
        Ok(value)
    }

    /// Clear entries, optionally restricted to one category. Returns the
    /// number of durable entries removed.
    pub async fn clear(&self, category: Option<&str>) -> i64 {
        {
            let mut memory = self.memory.write().await;
            match category {
                Some(cat) => memory.retain(|_, entry| entry.category != cat),
                None => memory.clear(),
            }
        }

        let result = match category {
            Some(cat) => cache_entries::delete_category(&self.pool, cat).await,
            None => cache_entries::delete_all(&self.pool).await,
        };

        match result {
            Ok(count) => {
                tracing::info!(?category, count, "cache cleared");
                count as i64
            }
            Err(e) => {
                tracing::warn!(error = %e, "durable cache clear failed");
                0
            }
        }
    }

    /// Drop entries whose expiry has passed. Active entries and their hit
    /// counters are untouched. Returns the number of durable entries
    /// removed.
    pub async fn clear_expired(&self) -> i64 {
        let now = Utc::now();

        self.memory
            .write()
            .await
            .retain(|_, entry| now < entry.expires_at);

        match cache_entries::delete_expired(&self.pool, now).await {
            Ok(count) => {
                tracing::info!(count, "expired cache entries cleared");
                count as i64
            }
            Err(e) => {
                tracing::warn!(error = %e, "durable expired-entry clear failed");
                0
            }
        }
    }

    /// Snapshot of cache occupancy and hit accounting.
    pub async fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let memory_entries = self.memory.read().await.len() as i64;

        let rows = match cache_entries::load_summary(&self.pool).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "durable cache tier unavailable for stats");
                Vec::new()
            }
        };

        let mut stats = CacheStats {
            total_entries: rows.len() as i64,
            active_entries: 0,
            expired_entries: 0,
            total_hits: 0,
            memory_entries,
            by_category: HashMap::new(),
        };

        for (category, expires_at, hit_count) in rows {
            let expired = DateTime::parse_from_rfc3339(&expires_at)
                .map(|dt| now >= dt.with_timezone(&Utc))
                .unwrap_or(true);
            if expired {
                stats.expired_entries += 1;
            } else {
                stats.active_entries += 1;
            }
            stats.total_hits += hit_count;
            *stats.by_category.entry(category).or_insert(0) += 1;
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_key_is_order_independent() {
        let a = CacheStore::cache_key("item-detail", &json!({"a": 1, "b": 2}));
        let b = CacheStore::cache_key("item-detail", &json!({"b": 2, "a": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn cache_key_distinguishes_categories_and_params() {
        let base = CacheStore::cache_key("item-detail", &json!({"id": "x"}));
        assert_ne!(
            base,
            CacheStore::cache_key("media-detail", &json!({"id": "x"}))
        );
        assert_ne!(
            base,
            CacheStore::cache_key("item-detail", &json!({"id": "y"}))
        );
    }
}
