//! Project and project-role repository.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::domain::{Project, RenovationType, RoleType, User};
use crate::error::{BotError, Result};

/// Raw row shape shared by all project queries.
type ProjectRow = (
    i64,
    Option<i64>,
    String,
    Option<String>,
    Option<f64>,
    String,
    Option<f64>,
    Option<i64>,
    bool,
    DateTime<Utc>,
);

const PROJECT_COLUMNS: &str = "id, tenant_id, name, address, area_sqm, renovation_type, \
     total_budget, telegram_chat_id, is_active, created_at";

fn row_to_project(row: ProjectRow) -> Result<Project> {
    let (
        id,
        tenant_id,
        name,
        address,
        area_sqm,
        renovation_type,
        total_budget,
        telegram_chat_id,
        is_active,
        created_at,
    ) = row;
    Ok(Project {
        id,
        tenant_id,
        name,
        address,
        area_sqm,
        renovation_type: RenovationType::parse(&renovation_type)?,
        total_budget,
        telegram_chat_id,
        is_active,
        created_at,
    })
}

/// Insert a project row inside a caller-owned transaction.
pub async fn create_project(
    conn: &mut PgConnection,
    tenant_id: i64,
    name: &str,
    address: Option<&str>,
    area_sqm: Option<f64>,
    renovation_type: RenovationType,
    total_budget: Option<f64>,
    telegram_chat_id: Option<i64>,
) -> Result<Project> {
    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        "INSERT INTO projects \
             (tenant_id, name, address, area_sqm, renovation_type, total_budget, \
              telegram_chat_id, is_active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE) \
         RETURNING {PROJECT_COLUMNS}"
    ))
    .bind(tenant_id)
    .bind(name)
    .bind(address)
    .bind(area_sqm)
    .bind(renovation_type.as_str())
    .bind(total_budget)
    .bind(telegram_chat_id)
    .fetch_one(conn)
    .await?;

    row_to_project(row)
}

/// Look up an active project by id.
pub async fn get_project(db: &PgPool, project_id: i64) -> Result<Option<Project>> {
    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1 AND is_active"
    ))
    .bind(project_id)
    .fetch_optional(db)
    .await?;
    row.map(row_to_project).transpose()
}

/// Look up the project linked to a Telegram group chat.
pub async fn get_project_by_telegram_chat_id(
    db: &PgPool,
    chat_id: i64,
) -> Result<Option<Project>> {
    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects \
         WHERE telegram_chat_id = $1 AND is_active"
    ))
    .bind(chat_id)
    .fetch_optional(db)
    .await?;
    row.map(row_to_project).transpose()
}

/// Active projects where the user holds any role, newest first.
///
/// Always tenant-scoped: projects of other tenant bots are invisible.
pub async fn get_user_projects(
    db: &PgPool,
    user_id: i64,
    tenant_id: i64,
) -> Result<Vec<Project>> {
    let rows = sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT DISTINCT p.id, p.tenant_id, p.name, p.address, p.area_sqm, \
                p.renovation_type, p.total_budget, p.telegram_chat_id, \
                p.is_active, p.created_at \
         FROM projects p \
         JOIN project_roles r ON r.project_id = p.id \
         WHERE r.user_id = $1 AND p.tenant_id = $2 AND p.is_active \
         ORDER BY p.created_at DESC, p.id DESC"
    ))
    .bind(user_id)
    .bind(tenant_id)
    .fetch_all(db)
    .await?;
    rows.into_iter().map(row_to_project).collect()
}

/// All active projects across all tenants (scheduler sweeps).
pub async fn get_all_active_projects(db: &PgPool) -> Result<Vec<Project>> {
    let rows = sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE is_active ORDER BY id"
    ))
    .fetch_all(db)
    .await?;
    rows.into_iter().map(row_to_project).collect()
}

/// Link a group chat to a project.
///
/// # Errors
///
/// Returns [`BotError::Integrity`] when another project already holds the
/// chat id; the message names that project.
pub async fn link_telegram_chat(db: &PgPool, project_id: i64, chat_id: i64) -> Result<()> {
    if let Some(holder) = get_project_by_telegram_chat_id(db, chat_id).await? {
        if holder.id != project_id {
            return Err(BotError::Integrity(format!(
                "Эта группа уже привязана к проекту «{}»",
                holder.name
            )));
        }
        return Ok(());
    }

    sqlx::query("UPDATE projects SET telegram_chat_id = $2 WHERE id = $1")
        .bind(project_id)
        .bind(chat_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Soft-deactivate a project.
pub async fn deactivate_project(db: &PgPool, project_id: i64) -> Result<()> {
    sqlx::query("UPDATE projects SET is_active = FALSE, telegram_chat_id = NULL WHERE id = $1")
        .bind(project_id)
        .execute(db)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Grant a role inside a caller-owned transaction.
///
/// # Errors
///
/// Returns [`BotError::Integrity`] when the user already holds that role
/// in the project.
pub async fn assign_role(
    conn: &mut PgConnection,
    project_id: i64,
    user_id: i64,
    role: RoleType,
) -> Result<()> {
    let inserted = sqlx::query(
        "INSERT INTO project_roles (project_id, user_id, role) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (project_id, user_id, role) DO NOTHING",
    )
    .bind(project_id)
    .bind(user_id)
    .bind(role.as_str())
    .execute(conn)
    .await?;

    if inserted.rows_affected() == 0 {
        return Err(BotError::Integrity(format!(
            "Роль {} уже назначена этому участнику",
            role.label()
        )));
    }
    Ok(())
}

/// Remove a role grant.
///
/// # Errors
///
/// Returns [`BotError::Authorization`] when the target role is `owner` —
/// the owner cannot be removed from their own project.
pub async fn remove_role(
    db: &PgPool,
    project_id: i64,
    user_id: i64,
    role: RoleType,
) -> Result<()> {
    if role == RoleType::Owner {
        return Err(BotError::Authorization(
            "Владельца нельзя удалить из проекта".to_owned(),
        ));
    }
    sqlx::query("DELETE FROM project_roles WHERE project_id = $1 AND user_id = $2 AND role = $3")
        .bind(project_id)
        .bind(user_id)
        .bind(role.as_str())
        .execute(db)
        .await?;
    Ok(())
}

/// Roles a user holds in a project.
pub async fn get_user_roles_in_project(
    db: &PgPool,
    user_id: i64,
    project_id: i64,
) -> Result<Vec<RoleType>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT role FROM project_roles WHERE user_id = $1 AND project_id = $2 ORDER BY role",
    )
    .bind(user_id)
    .bind(project_id)
    .fetch_all(db)
    .await?;
    rows.into_iter().map(|(r,)| RoleType::parse(&r)).collect()
}

/// Internal ids of all users holding `owner` in the project.
pub async fn get_project_owner_ids(db: &PgPool, project_id: i64) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT user_id FROM project_roles WHERE project_id = $1 AND role = 'owner'",
    )
    .bind(project_id)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Internal ids of users holding any of the given roles in the project.
pub async fn get_project_role_user_ids(
    db: &PgPool,
    project_id: i64,
    roles: &[RoleType],
) -> Result<Vec<i64>> {
    let role_strs: Vec<String> = roles.iter().map(|r| r.as_str().to_owned()).collect();
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT DISTINCT user_id FROM project_roles \
         WHERE project_id = $1 AND role = ANY($2)",
    )
    .bind(project_id)
    .bind(&role_strs)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// A member of a project team with their roles.
#[derive(Debug, Clone)]
pub struct TeamMember {
    /// The member's user record.
    pub user: User,
    /// All roles the member holds in the project.
    pub roles: Vec<RoleType>,
}

/// The full team of a project, users deduplicated, roles collected.
pub async fn get_project_team(db: &PgPool, project_id: i64) -> Result<Vec<TeamMember>> {
    let rows: Vec<(i64, Option<i64>, Option<String>, String, Option<String>, bool, DateTime<Utc>, String)> =
        sqlx::query_as(
            "SELECT u.id, u.telegram_id, u.whatsapp_id, u.full_name, u.phone, \
                    u.is_bot_started, u.created_at, r.role \
             FROM project_roles r \
             JOIN users u ON u.id = r.user_id \
             WHERE r.project_id = $1 \
             ORDER BY u.id, r.role",
        )
        .bind(project_id)
        .fetch_all(db)
        .await?;

    let mut members: Vec<TeamMember> = Vec::new();
    for (id, telegram_id, whatsapp_id, full_name, phone, is_bot_started, created_at, role) in rows
    {
        let role = RoleType::parse(&role)?;
        match members.last_mut() {
            Some(member) if member.user.id == id => member.roles.push(role),
            _ => members.push(TeamMember {
                user: User {
                    id,
                    telegram_id,
                    whatsapp_id,
                    full_name,
                    phone,
                    is_bot_started,
                    created_at,
                },
                roles: vec![role],
            }),
        }
    }
    Ok(members)
}
