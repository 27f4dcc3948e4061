//! Repository layer — all database reads and writes.
//!
//! Every module is a set of free async functions over a [`sqlx::PgPool`]
//! (or a `&mut PgConnection` where the call participates in a caller-owned
//! transaction). Enums travel as text and are parsed through the domain
//! `as_str`/`parse` pairs; money travels as `double precision`.

pub mod budget;
pub mod cache;
pub mod changelog;
pub mod embeddings;
pub mod messages;
pub mod projects;
pub mod stages;
pub mod tenants;
pub mod users;

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::Config;

/// Base pool size; up to [`POOL_MAX_OVERFLOW`] extra connections are
/// opened under load.
const POOL_BASE_SIZE: u32 = 5;

/// Additional connections allowed beyond the base size.
const POOL_MAX_OVERFLOW: u32 = 10;

/// Open the shared PostgreSQL connection pool.
///
/// # Errors
///
/// Returns the underlying `sqlx` error if the database is unreachable.
pub async fn connect(config: &Config) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .min_connections(POOL_BASE_SIZE)
        .max_connections(POOL_BASE_SIZE + POOL_MAX_OVERFLOW)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database_url())
        .await?;

    info!(
        host = %config.postgres_host,
        db = %config.postgres_db,
        "database pool initialised"
    );
    Ok(pool)
}
