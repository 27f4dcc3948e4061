//! Project creation service.
//!
//! Creates the project row, assigns the owner role, expands the 13
//! standard stages, and appends parallel furniture pipelines — all in a
//! single transaction.

use sqlx::PgPool;
use tracing::info;

use crate::db;
use crate::domain::templates::{self, StageTemplate};
use crate::domain::{Project, RenovationType, RoleType};
use crate::error::{BotError, Result};

/// Input for [`create_renovation_project`].
#[derive(Debug, Clone)]
pub struct NewProject {
    /// Internal id of the creating user; becomes the project owner.
    pub owner_user_id: i64,
    /// Tenant the project belongs to.
    pub tenant_id: i64,
    /// Project name; required.
    pub name: String,
    /// Street address.
    pub address: Option<String>,
    /// Area in square metres.
    pub area_sqm: Option<f64>,
    /// Renovation kind.
    pub renovation_type: RenovationType,
    /// Total budget cap.
    pub total_budget: Option<f64>,
    /// Group chat to link, when the project is created from a group.
    pub telegram_chat_id: Option<i64>,
    /// Selected custom-item keys (kitchen, wardrobes, walkin, doors).
    pub custom_items: Vec<String>,
}

/// Full project creation flow, atomically:
/// 1. insert the project (linking the chat when given and free),
/// 2. assign the owner role,
/// 3. expand the standard stage template,
/// 4. append parallel pipelines for each selected custom item.
///
/// # Errors
///
/// [`BotError::Validation`] for an empty name or unknown custom item;
/// [`BotError::Integrity`] when the chat is linked to another project.
pub async fn create_renovation_project(db: &PgPool, input: NewProject) -> Result<Project> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(BotError::Validation(
            "Название проекта не может быть пустым".to_owned(),
        ));
    }
    for key in &input.custom_items {
        if !templates::is_known_custom_item(key) {
            return Err(BotError::Validation(format!(
                "Неизвестный элемент на заказ: {key}"
            )));
        }
    }

    if let Some(chat_id) = input.telegram_chat_id {
        if let Some(holder) = db::projects::get_project_by_telegram_chat_id(db, chat_id).await? {
            return Err(BotError::Integrity(format!(
                "Эта группа уже привязана к проекту «{}»",
                holder.name
            )));
        }
    }

    let mut definitions: Vec<StageTemplate> = templates::standard_stages();
    definitions.extend(templates::build_parallel_stages(&input.custom_items));

    let mut tx = db.begin().await?;

    let project = db::projects::create_project(
        &mut *tx,
        input.tenant_id,
        name,
        input.address.as_deref(),
        input.area_sqm,
        input.renovation_type,
        input.total_budget,
        input.telegram_chat_id,
    )
    .await?;

    db::projects::assign_role(&mut *tx, project.id, input.owner_user_id, RoleType::Owner).await?;
    db::stages::create_stages_for_project(&mut *tx, project.id, &definitions).await?;

    tx.commit().await?;

    info!(
        project_id = project.id,
        owner_user_id = input.owner_user_id,
        stages = definitions.len(),
        "project created"
    );

    Ok(project)
}

/// Soft-delete a project. Owner only.
///
/// # Errors
///
/// [`BotError::Authorization`] when the caller does not hold `owner`.
pub async fn delete_project(db: &PgPool, project_id: i64, acting_user_id: i64) -> Result<()> {
    let roles = db::projects::get_user_roles_in_project(db, acting_user_id, project_id).await?;
    if !roles.contains(&RoleType::Owner) {
        return Err(BotError::Authorization(
            "Удалить проект может только владелец".to_owned(),
        ));
    }
    db::projects::deactivate_project(db, project_id).await?;
    db::cache::cache_invalidate(db, "project:chat:").await?;
    info!(project_id, "project deactivated");
    Ok(())
}
