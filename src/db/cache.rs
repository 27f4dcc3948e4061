//! PostgreSQL-native cache and materialized-view reads.
//!
//! The key-value cache lives in an UNLOGGED table behind four SQL
//! functions (`cache_get`, `cache_set`, `cache_invalidate`,
//! `cache_cleanup`); skipping WAL makes writes cheap, and data loss on
//! crash is acceptable because entries regenerate on miss. The two
//! materialized views serve O(1) aggregation reads and are refreshed
//! concurrently by the scheduler.

use sqlx::PgPool;
use tracing::debug;

use crate::db::budget::CategorySummary;
use crate::error::Result;

/// TTL used by the context middleware for user / project lookups.
pub const CONTEXT_TTL_SECONDS: i32 = 600;

/// TTL used for cached `/ask` answers.
pub const ASK_TTL_SECONDS: i32 = 300;

/// Get a cached value by key. Returns `None` on miss or expiry.
pub async fn cache_get(db: &PgPool, key: &str) -> Result<Option<serde_json::Value>> {
    let (value,): (Option<serde_json::Value>,) =
        sqlx::query_as("SELECT cache_get($1)")
            .bind(key)
            .fetch_one(db)
            .await?;
    if value.is_some() {
        debug!(key, "cache hit");
    } else {
        debug!(key, "cache miss");
    }
    Ok(value)
}

/// Set a cache entry with a TTL in seconds.
pub async fn cache_set(
    db: &PgPool,
    key: &str,
    value: &serde_json::Value,
    ttl_seconds: i32,
) -> Result<()> {
    sqlx::query("SELECT cache_set($1, $2, $3)")
        .bind(key)
        .bind(value)
        .bind(ttl_seconds)
        .execute(db)
        .await?;
    Ok(())
}

/// Invalidate all entries whose key starts with `prefix`.
///
/// Returns the number of removed entries.
pub async fn cache_invalidate(db: &PgPool, prefix: &str) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT cache_invalidate($1)")
        .bind(prefix)
        .fetch_one(db)
        .await?;
    if count > 0 {
        debug!(prefix, count, "cache invalidated");
    }
    Ok(count)
}

/// Remove all expired entries. Returns the number removed.
pub async fn cache_cleanup(db: &PgPool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT cache_cleanup()")
        .fetch_one(db)
        .await?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// Materialized views
// ---------------------------------------------------------------------------

/// Stage progress counters from `mv_stage_progress`.
#[derive(Debug, Clone, PartialEq)]
pub struct StageProgress {
    /// Total stages of the project.
    pub total_stages: i64,
    /// Count of `planned` stages.
    pub planned: i64,
    /// Count of `in_progress` stages.
    pub in_progress: i64,
    /// Count of `completed` stages.
    pub completed: i64,
    /// Count of `delayed` stages.
    pub delayed: i64,
}

/// Per-category budget summary from `mv_budget_summary`.
///
/// Reads may be up to one refresh interval stale.
pub async fn get_cached_budget_summary(
    db: &PgPool,
    project_id: i64,
) -> Result<Vec<CategorySummary>> {
    let rows: Vec<(String, f64, f64, f64, f64, i64, i64)> = sqlx::query_as(
        "SELECT category, total_work, total_materials, total_prepayments, \
                total_spent, item_count, confirmed_count \
         FROM mv_budget_summary \
         WHERE project_id = $1 \
         ORDER BY category",
    )
    .bind(project_id)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(category, total_work, total_materials, total_prepayments, total_spent, item_count, confirmed_count)| {
                CategorySummary {
                    category,
                    total_work,
                    total_materials,
                    total_prepayments,
                    total_spent,
                    item_count,
                    confirmed_count,
                }
            },
        )
        .collect())
}

/// Stage progress counters from `mv_stage_progress`.
pub async fn get_cached_stage_progress(
    db: &PgPool,
    project_id: i64,
) -> Result<Option<StageProgress>> {
    let row: Option<(i64, i64, i64, i64, i64)> = sqlx::query_as(
        "SELECT total_stages, planned, in_progress, completed, delayed \
         FROM mv_stage_progress \
         WHERE project_id = $1",
    )
    .bind(project_id)
    .fetch_optional(db)
    .await?;

    Ok(row.map(
        |(total_stages, planned, in_progress, completed, delayed)| StageProgress {
            total_stages,
            planned,
            in_progress,
            completed,
            delayed,
        },
    ))
}

/// Refresh both materialized views (concurrently, readers never block).
pub async fn refresh_views(db: &PgPool) -> Result<()> {
    sqlx::query("SELECT refresh_materialized_views()")
        .execute(db)
        .await?;
    debug!("materialized views refreshed");
    Ok(())
}
