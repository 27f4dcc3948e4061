//! Role and permission service.
//!
//! A static mapping of permission → roles describes every action; a
//! user holding several roles has the union of their permissions.

use sqlx::PgPool;
use tracing::info;

use crate::db;
use crate::domain::{RoleType, User};
use crate::error::{BotError, Result};

/// Granular actions that can be allowed or denied per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    // Project management
    CreateProject,
    EditProject,
    LaunchProject,
    CloseProject,
    InviteMember,

    // Stage management
    ViewStages,
    EditStage,
    UpdateStatus,
    AddSubStages,
    ApproveCheckpoint,

    // Budget
    ViewBudget,
    EditBudget,
    ConfirmBudget,

    // Reports
    ViewReports,
    RequestReport,

    // Workers
    ViewMyStage,
    SendStatus,
    ProposeWork,

    // Expert
    RequestExpert,
    ConductInspection,

    // AI
    UseAiChat,
}

/// Permissions granted by a single role.
pub fn role_permissions(role: RoleType) -> &'static [Permission] {
    use Permission::*;
    match role {
        RoleType::Owner => &[
            CreateProject,
            EditProject,
            LaunchProject,
            CloseProject,
            InviteMember,
            ViewStages,
            EditStage,
            UpdateStatus,
            AddSubStages,
            ApproveCheckpoint,
            ViewBudget,
            EditBudget,
            ConfirmBudget,
            ViewReports,
            RequestReport,
            ViewMyStage,
            RequestExpert,
            UseAiChat,
        ],
        RoleType::CoOwner => &[
            ViewStages,
            ViewBudget,
            ViewReports,
            RequestReport,
            ViewMyStage,
            RequestExpert,
            UseAiChat,
        ],
        RoleType::Foreman => &[
            InviteMember,
            ViewStages,
            EditStage,
            UpdateStatus,
            AddSubStages,
            ViewBudget,
            EditBudget,
            ViewReports,
            ViewMyStage,
            SendStatus,
            ProposeWork,
        ],
        RoleType::Tradesperson => &[ViewStages, ViewMyStage, SendStatus, ProposeWork],
        RoleType::Designer => &[
            ViewStages,
            EditStage,
            AddSubStages,
            ViewBudget,
            ViewReports,
            ViewMyStage,
            SendStatus,
        ],
        RoleType::Supplier => &[ViewMyStage, SendStatus],
        RoleType::Expert => &[ViewStages, ViewBudget, ConductInspection],
        RoleType::Viewer => &[ViewStages, ViewBudget, ViewReports],
    }
}

/// Roles assignable via /invite — everything except `owner`.
pub const ASSIGNABLE_ROLES: [RoleType; 7] = [
    RoleType::CoOwner,
    RoleType::Foreman,
    RoleType::Tradesperson,
    RoleType::Designer,
    RoleType::Supplier,
    RoleType::Expert,
    RoleType::Viewer,
];

/// Whether ANY of the user's roles grants the permission.
pub fn has_permission(roles: &[RoleType], permission: Permission) -> bool {
    roles
        .iter()
        .any(|role| role_permissions(*role).contains(&permission))
}

/// The union of all permissions granted by the given roles.
pub fn get_permissions(roles: &[RoleType]) -> Vec<Permission> {
    let mut out: Vec<Permission> = Vec::new();
    for role in roles {
        for permission in role_permissions(*role) {
            if !out.contains(permission) {
                out.push(*permission);
            }
        }
    }
    out
}

/// Fail with a friendly denial unless one of `roles` grants `permission`.
///
/// # Errors
///
/// [`BotError::Authorization`] with a user-facing message.
pub fn require_permission(roles: &[RoleType], permission: Permission) -> Result<()> {
    if has_permission(roles, permission) {
        return Ok(());
    }
    Err(BotError::Authorization(
        "У вас нет прав для этого действия".to_owned(),
    ))
}

/// Comma-separated role labels for display.
pub fn format_role_list(roles: &[RoleType]) -> String {
    roles
        .iter()
        .map(|r| r.label())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Invite a member: create a placeholder user and grant the role.
///
/// # Errors
///
/// [`BotError::Validation`] when the role is `owner` (not assignable) or
/// the contact is empty; [`BotError::Integrity`] when the role is
/// already granted.
pub async fn invite_member(
    db: &PgPool,
    project_id: i64,
    role: RoleType,
    contact: &str,
    acting_user_id: i64,
) -> Result<User> {
    if role == RoleType::Owner {
        return Err(BotError::Validation(
            "Роль владельца нельзя назначить через приглашение".to_owned(),
        ));
    }
    let contact = contact.trim();
    if contact.is_empty() {
        return Err(BotError::Validation(
            "Укажите имя и контакт приглашаемого участника".to_owned(),
        ));
    }

    // "Имя Фамилия +77001234567" — a trailing token with digits is a phone.
    let (name, phone) = match contact.rsplit_once(' ') {
        Some((name, tail)) if tail.chars().any(|c| c.is_ascii_digit()) => {
            (name.trim(), Some(tail.trim()))
        }
        _ => (contact, None),
    };

    let user = db::users::create_placeholder_user(db, name, phone).await?;

    let mut tx = db.begin().await?;
    db::projects::assign_role(&mut *tx, project_id, user.id, role).await?;
    db::changelog::append(
        &mut *tx,
        project_id,
        Some(acting_user_id),
        "project_role",
        user.id,
        "role",
        None,
        Some(role.as_str()),
        None,
    )
    .await?;
    tx.commit().await?;

    info!(project_id, user_id = user.id, role = role.as_str(), "member invited");
    Ok(user)
}
