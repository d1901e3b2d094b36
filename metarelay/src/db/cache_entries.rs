//! Queries for the durable cache tier.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings so that SQL
//! string comparison orders them chronologically.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;

/// One persisted cache entry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CacheEntryRow {
    pub cache_key: String,
    pub category: String,
    pub payload: String,
    pub created_at: String,
    pub expires_at: String,
    pub hit_count: i64,
}

impl CacheEntryRow {
    /// Parse the stored expiry timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.expires_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Render a timestamp in the fixed storage format.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub async fn fetch(pool: &SqlitePool, cache_key: &str) -> sqlx::Result<Option<CacheEntryRow>> {
    sqlx::query_as::<_, CacheEntryRow>(
        "SELECT cache_key, category, payload, created_at, expires_at, hit_count \
         FROM cache_entries WHERE cache_key = ?",
    )
    .bind(cache_key)
    .fetch_optional(pool)
    .await
}

/// Insert or replace an entry. Overwriting resets the hit counter.
pub async fn upsert(
    pool: &SqlitePool,
    cache_key: &str,
    category: &str,
    payload: &str,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cache_entries (cache_key, category, payload, created_at, expires_at, hit_count)
        VALUES (?, ?, ?, ?, ?, 0)
        ON CONFLICT(cache_key) DO UPDATE SET
            category = excluded.category,
            payload = excluded.payload,
            created_at = excluded.created_at,
            expires_at = excluded.expires_at,
            hit_count = 0
        "#,
    )
    .bind(cache_key)
    .bind(category)
    .bind(payload)
    .bind(format_timestamp(created_at))
    .bind(format_timestamp(expires_at))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn record_hit(pool: &SqlitePool, cache_key: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE cache_entries SET hit_count = hit_count + 1 WHERE cache_key = ?")
        .bind(cache_key)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_all(pool: &SqlitePool) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM cache_entries").execute(pool).await?;
    Ok(result.rows_affected())
}

pub async fn delete_category(pool: &SqlitePool, category: &str) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM cache_entries WHERE category = ?")
        .bind(category)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Delete entries whose expiry is at or before `now` (expiry bound is
/// exclusive: an entry expiring exactly now is already dead).
pub async fn delete_expired(pool: &SqlitePool, now: DateTime<Utc>) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= ?")
        .bind(format_timestamp(now))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Load `(category, expires_at, hit_count)` for all entries, for stats.
pub async fn load_summary(pool: &SqlitePool) -> sqlx::Result<Vec<(String, String, i64)>> {
    sqlx::query_as::<_, (String, String, i64)>(
        "SELECT category, expires_at, hit_count FROM cache_entries",
    )
    .fetch_all(pool)
    .await
}
