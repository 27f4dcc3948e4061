//! Context middleware — resolves the acting user, the chat's project,
//! and the caller's roles before a handler runs.
//!
//! Hot lookups go through the KV cache with a short TTL:
//! `user:tg:<telegram_id>` → internal user id, and
//! `project:chat:<chat_id>` → project id. Roles change often and are
//! cheap to read, so they are never cached.

use serde_json::json;
use sqlx::PgPool;

use crate::db;
use crate::db::cache::CONTEXT_TTL_SECONDS;
use crate::domain::{Project, RoleType, User};
use crate::error::Result;

/// Resolved per-request context.
#[derive(Debug, Clone, Default)]
pub struct RequestCtx {
    /// The acting user, when registered.
    pub user: Option<User>,
    /// The project linked to this chat (group chats only).
    pub project: Option<Project>,
    /// The user's roles in that project.
    pub roles: Vec<RoleType>,
}

impl RequestCtx {
    /// The acting user's internal id, when registered.
    pub fn user_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }
}

/// Resolve user, project, and roles for an inbound event.
///
/// For private chats the project stays `None` — private-chat project
/// resolution is the project resolver's job.
pub async fn resolve(
    db: &PgPool,
    telegram_user_id: i64,
    chat_id: i64,
    is_group: bool,
) -> Result<RequestCtx> {
    let user = resolve_user(db, telegram_user_id).await?;

    let project = if is_group {
        resolve_chat_project(db, chat_id).await?
    } else {
        None
    };

    let roles = match (&user, &project) {
        (Some(user), Some(project)) => {
            db::projects::get_user_roles_in_project(db, user.id, project.id).await?
        }
        _ => Vec::new(),
    };

    Ok(RequestCtx {
        user,
        project,
        roles,
    })
}

/// Resolve a user by Telegram id through the KV cache.
pub async fn resolve_user(db: &PgPool, telegram_user_id: i64) -> Result<Option<User>> {
    let cache_key = format!("user:tg:{telegram_user_id}");

    if let Some(value) = db::cache::cache_get(db, &cache_key).await? {
        if let Some(user_id) = value.as_i64() {
            if let Some(user) = db::users::get_user_by_id(db, user_id).await? {
                return Ok(Some(user));
            }
        }
    }

    let user = db::users::get_user_by_telegram_id(db, telegram_user_id).await?;
    if let Some(user) = &user {
        db::cache::cache_set(db, &cache_key, &json!(user.id), CONTEXT_TTL_SECONDS).await?;
    }
    Ok(user)
}

/// Resolve the project linked to a group chat through the KV cache.
pub async fn resolve_chat_project(db: &PgPool, chat_id: i64) -> Result<Option<Project>> {
    let cache_key = format!("project:chat:{chat_id}");

    if let Some(value) = db::cache::cache_get(db, &cache_key).await? {
        if let Some(project_id) = value.as_i64() {
            if let Some(project) = db::projects::get_project(db, project_id).await? {
                return Ok(Some(project));
            }
        }
    }

    let project = db::projects::get_project_by_telegram_chat_id(db, chat_id).await?;
    if let Some(project) = &project {
        db::cache::cache_set(db, &cache_key, &json!(project.id), CONTEXT_TTL_SECONDS).await?;
    }
    Ok(project)
}
