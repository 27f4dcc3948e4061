//! Append-only change log repository.
//!
//! Rows are never updated or deleted; every tracked mutation of stages
//! and budget items appends one entry in the same transaction.

use sqlx::{PgConnection, PgPool};

use crate::domain::ChangeLog;
use crate::error::Result;

/// Append a change-log entry inside a caller-owned transaction.
#[allow(clippy::too_many_arguments)]
pub async fn append(
    conn: &mut PgConnection,
    project_id: i64,
    user_id: Option<i64>,
    entity_type: &str,
    entity_id: i64,
    field_name: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
    confirmed_by_user_id: Option<i64>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO change_logs \
             (project_id, user_id, entity_type, entity_id, field_name, \
              old_value, new_value, confirmed_by_user_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(project_id)
    .bind(user_id)
    .bind(entity_type)
    .bind(entity_id)
    .bind(field_name)
    .bind(old_value)
    .bind(new_value)
    .bind(confirmed_by_user_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Latest change-log entries of a project, newest first.
pub async fn list_for_project(db: &PgPool, project_id: i64, limit: i64) -> Result<Vec<ChangeLog>> {
    let rows = sqlx::query_as::<_, ChangeLog>(
        "SELECT id, project_id, user_id, entity_type, entity_id, field_name, \
                old_value, new_value, confirmed_by_user_id, created_at \
         FROM change_logs \
         WHERE project_id = $1 \
         ORDER BY id DESC \
         LIMIT $2",
    )
    .bind(project_id)
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(rows)
}
