//! Tenant repository — bot identities and their lifecycle.

use sqlx::PgPool;

use crate::domain::Tenant;
use crate::error::{BotError, Result};

/// Columns selected for every tenant query.
const TENANT_COLUMNS: &str = "id, name, bot_token, bot_username, is_active, created_at";

/// Insert a new tenant.
///
/// # Errors
///
/// Returns [`BotError::Integrity`] when a tenant with the same bot token
/// already exists.
pub async fn create_tenant(
    db: &PgPool,
    name: &str,
    bot_token: &str,
    bot_username: Option<&str>,
) -> Result<Tenant> {
    if let Some(existing) = get_tenant_by_bot_token(db, bot_token).await? {
        return Err(BotError::Integrity(format!(
            "Бот уже зарегистрирован: id={}, имя «{}»",
            existing.id, existing.name
        )));
    }

    let tenant = sqlx::query_as::<_, Tenant>(&format!(
        "INSERT INTO tenants (name, bot_token, bot_username, is_active) \
         VALUES ($1, $2, $3, TRUE) \
         RETURNING {TENANT_COLUMNS}"
    ))
    .bind(name)
    .bind(bot_token)
    .bind(bot_username)
    .fetch_one(db)
    .await?;

    Ok(tenant)
}

/// All tenants with `is_active = TRUE`, oldest first.
pub async fn get_all_active_tenants(db: &PgPool) -> Result<Vec<Tenant>> {
    let tenants = sqlx::query_as::<_, Tenant>(&format!(
        "SELECT {TENANT_COLUMNS} FROM tenants WHERE is_active ORDER BY id"
    ))
    .fetch_all(db)
    .await?;
    Ok(tenants)
}

/// Every tenant regardless of state, oldest first.
pub async fn list_all_tenants(db: &PgPool) -> Result<Vec<Tenant>> {
    let tenants = sqlx::query_as::<_, Tenant>(&format!(
        "SELECT {TENANT_COLUMNS} FROM tenants ORDER BY id"
    ))
    .fetch_all(db)
    .await?;
    Ok(tenants)
}

/// Look up a tenant by bot token.
pub async fn get_tenant_by_bot_token(db: &PgPool, bot_token: &str) -> Result<Option<Tenant>> {
    let tenant = sqlx::query_as::<_, Tenant>(&format!(
        "SELECT {TENANT_COLUMNS} FROM tenants WHERE bot_token = $1"
    ))
    .bind(bot_token)
    .fetch_optional(db)
    .await?;
    Ok(tenant)
}

/// Look up a tenant by id.
pub async fn get_tenant_by_id(db: &PgPool, tenant_id: i64) -> Result<Option<Tenant>> {
    let tenant = sqlx::query_as::<_, Tenant>(&format!(
        "SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1"
    ))
    .bind(tenant_id)
    .fetch_optional(db)
    .await?;
    Ok(tenant)
}

/// Persist the bot username discovered at identity confirmation.
pub async fn set_tenant_username(db: &PgPool, tenant_id: i64, username: &str) -> Result<()> {
    sqlx::query("UPDATE tenants SET bot_username = $2 WHERE id = $1")
        .bind(tenant_id)
        .bind(username)
        .execute(db)
        .await?;
    Ok(())
}

/// Update a tenant's display name and/or active flag.
///
/// # Errors
///
/// Returns [`BotError::NotFound`] when no such tenant exists.
pub async fn update_tenant(
    db: &PgPool,
    tenant_id: i64,
    name: Option<&str>,
    is_active: Option<bool>,
) -> Result<Tenant> {
    let tenant = sqlx::query_as::<_, Tenant>(&format!(
        "UPDATE tenants \
         SET name = COALESCE($2, name), is_active = COALESCE($3, is_active) \
         WHERE id = $1 \
         RETURNING {TENANT_COLUMNS}"
    ))
    .bind(tenant_id)
    .bind(name)
    .bind(is_active)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| BotError::NotFound(format!("Тенант {tenant_id} не найден")))?;

    Ok(tenant)
}

/// Soft-deactivate a tenant. Returns the deactivated row.
///
/// # Errors
///
/// Returns [`BotError::NotFound`] when no such tenant exists.
pub async fn deactivate_tenant(db: &PgPool, tenant_id: i64) -> Result<Tenant> {
    update_tenant(db, tenant_id, None, Some(false)).await
}

/// Attach projects created before multi-tenancy to the given tenant.
///
/// Returns the number of adopted projects.
pub async fn adopt_orphan_projects(db: &PgPool, tenant_id: i64) -> Result<u64> {
    let result = sqlx::query("UPDATE projects SET tenant_id = $1 WHERE tenant_id IS NULL")
        .bind(tenant_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}
