//! Stage and sub-stage repository.
//!
//! Stage `order` is stored in the `stage_order` column (1..13 for main
//! stages, ≥100 for parallel furniture pipelines) and is unique within a
//! project. `last_activity_at` is refreshed on every status change and
//! drives the idle-stage prompts.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::domain::templates::StageTemplate;
use crate::domain::{PaymentStatus, Stage, StageStatus, SubStage};
use crate::error::{BotError, Result};

/// Raw row shape shared by all stage queries.
type StageRow = (
    i64,
    i64,
    String,
    i32,
    String,
    String,
    Option<f64>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<i64>,
    Option<String>,
    bool,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
);

const STAGE_COLUMNS: &str = "id, project_id, name, stage_order, status, payment_status, \
     budget, start_date, end_date, responsible_user_id, responsible_contact, \
     is_parallel, is_checkpoint, last_activity_at, created_at";

fn row_to_stage(row: StageRow) -> Result<Stage> {
    let (
        id,
        project_id,
        name,
        order,
        status,
        payment_status,
        budget,
        start_date,
        end_date,
        responsible_user_id,
        responsible_contact,
        is_parallel,
        is_checkpoint,
        last_activity_at,
        created_at,
    ) = row;
    Ok(Stage {
        id,
        project_id,
        name,
        order,
        status: StageStatus::parse(&status)?,
        payment_status: PaymentStatus::parse(&payment_status)?,
        budget,
        start_date,
        end_date,
        responsible_user_id,
        responsible_contact,
        is_parallel,
        is_checkpoint,
        last_activity_at,
        created_at,
    })
}

/// Bulk-insert stage definitions inside a caller-owned transaction.
pub async fn create_stages_for_project(
    conn: &mut PgConnection,
    project_id: i64,
    definitions: &[StageTemplate],
) -> Result<()> {
    for def in definitions {
        sqlx::query(
            "INSERT INTO stages \
                 (project_id, name, stage_order, status, payment_status, \
                  is_parallel, is_checkpoint) \
             VALUES ($1, $2, $3, 'planned', 'recorded', $4, $5)",
        )
        .bind(project_id)
        .bind(&def.name)
        .bind(def.order)
        .bind(def.is_parallel)
        .bind(def.is_checkpoint)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Look up a stage by id.
pub async fn get_stage(db: &PgPool, stage_id: i64) -> Result<Option<Stage>> {
    let row = sqlx::query_as::<_, StageRow>(&format!(
        "SELECT {STAGE_COLUMNS} FROM stages WHERE id = $1"
    ))
    .bind(stage_id)
    .fetch_optional(db)
    .await?;
    row.map(row_to_stage).transpose()
}

/// Look up a stage by id, failing with `not_found` when absent.
pub async fn require_stage(db: &PgPool, stage_id: i64) -> Result<Stage> {
    get_stage(db, stage_id)
        .await?
        .ok_or_else(|| BotError::NotFound("Этап не найден".to_owned()))
}

/// All stages of a project, ordered by `stage_order`.
pub async fn get_stages_for_project(db: &PgPool, project_id: i64) -> Result<Vec<Stage>> {
    let rows = sqlx::query_as::<_, StageRow>(&format!(
        "SELECT {STAGE_COLUMNS} FROM stages WHERE project_id = $1 ORDER BY stage_order"
    ))
    .bind(project_id)
    .fetch_all(db)
    .await?;
    rows.into_iter().map(row_to_stage).collect()
}

/// The current non-parallel `in_progress` stage of a project, if any.
pub async fn get_current_main_stage(db: &PgPool, project_id: i64) -> Result<Option<Stage>> {
    let row = sqlx::query_as::<_, StageRow>(&format!(
        "SELECT {STAGE_COLUMNS} FROM stages \
         WHERE project_id = $1 AND NOT is_parallel AND status = 'in_progress' \
         ORDER BY stage_order LIMIT 1"
    ))
    .bind(project_id)
    .fetch_optional(db)
    .await?;
    row.map(row_to_stage).transpose()
}

/// The next non-parallel stage after the given order, by `stage_order`.
pub async fn get_next_main_stage(
    db: &PgPool,
    project_id: i64,
    after_order: i32,
) -> Result<Option<Stage>> {
    let row = sqlx::query_as::<_, StageRow>(&format!(
        "SELECT {STAGE_COLUMNS} FROM stages \
         WHERE project_id = $1 AND NOT is_parallel AND stage_order > $2 \
         ORDER BY stage_order LIMIT 1"
    ))
    .bind(project_id)
    .bind(after_order)
    .fetch_optional(db)
    .await?;
    row.map(row_to_stage).transpose()
}

/// Stages where the given user is responsible, active first.
pub async fn get_stages_for_responsible(
    db: &PgPool,
    project_id: i64,
    user_id: i64,
) -> Result<Vec<Stage>> {
    let rows = sqlx::query_as::<_, StageRow>(&format!(
        "SELECT {STAGE_COLUMNS} FROM stages \
         WHERE project_id = $1 AND responsible_user_id = $2 \
         ORDER BY status = 'in_progress' DESC, stage_order"
    ))
    .bind(project_id)
    .bind(user_id)
    .fetch_all(db)
    .await?;
    rows.into_iter().map(row_to_stage).collect()
}

/// Update the planned dates of a stage (either bound may stay unchanged).
pub async fn set_stage_dates(
    db: &PgPool,
    stage_id: i64,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(
        "UPDATE stages SET start_date = COALESCE($2, start_date), \
                           end_date = COALESCE($3, end_date) \
         WHERE id = $1",
    )
    .bind(stage_id)
    .bind(start_date)
    .bind(end_date)
    .execute(db)
    .await?;
    Ok(())
}

/// Set the stage budget.
pub async fn set_stage_budget(db: &PgPool, stage_id: i64, budget: f64) -> Result<()> {
    sqlx::query("UPDATE stages SET budget = $2 WHERE id = $1")
        .bind(stage_id)
        .bind(budget)
        .execute(db)
        .await?;
    Ok(())
}

/// Assign the responsible contact and, when known, the responsible user.
pub async fn set_stage_responsible(
    db: &PgPool,
    stage_id: i64,
    responsible_user_id: Option<i64>,
    responsible_contact: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE stages SET responsible_user_id = $2, responsible_contact = $3 WHERE id = $1",
    )
    .bind(stage_id)
    .bind(responsible_user_id)
    .bind(responsible_contact)
    .execute(db)
    .await?;
    Ok(())
}

/// Update a stage's work status inside a caller-owned transaction.
///
/// Also refreshes `last_activity_at`.
pub async fn update_stage_status(
    conn: &mut PgConnection,
    stage_id: i64,
    status: StageStatus,
) -> Result<()> {
    sqlx::query("UPDATE stages SET status = $2, last_activity_at = now() WHERE id = $1")
        .bind(stage_id)
        .bind(status.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

/// Update a stage's payment status inside a caller-owned transaction.
pub async fn update_payment_status(
    conn: &mut PgConnection,
    stage_id: i64,
    status: PaymentStatus,
) -> Result<()> {
    sqlx::query("UPDATE stages SET payment_status = $2, last_activity_at = now() WHERE id = $1")
        .bind(stage_id)
        .bind(status.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Scheduler queries
// ---------------------------------------------------------------------------

/// Active stages whose deadline falls within `(now, now + within_days]`.
pub async fn get_stages_due_soon(db: &PgPool, within_days: i32) -> Result<Vec<Stage>> {
    let rows = sqlx::query_as::<_, StageRow>(&format!(
        "SELECT s.{cols} FROM stages s \
         JOIN projects p ON p.id = s.project_id AND p.is_active \
         WHERE s.status IN ('in_progress', 'delayed') \
           AND s.end_date > now() \
           AND s.end_date <= now() + make_interval(days => $1)",
        cols = STAGE_COLUMNS.replace(", ", ", s."),
    ))
    .bind(within_days)
    .fetch_all(db)
    .await?;
    rows.into_iter().map(row_to_stage).collect()
}

/// Active stages whose deadline has already passed.
pub async fn get_overdue_stages(db: &PgPool) -> Result<Vec<Stage>> {
    let rows = sqlx::query_as::<_, StageRow>(&format!(
        "SELECT s.{cols} FROM stages s \
         JOIN projects p ON p.id = s.project_id AND p.is_active \
         WHERE s.status IN ('in_progress', 'delayed') AND s.end_date < now()",
        cols = STAGE_COLUMNS.replace(", ", ", s."),
    ))
    .fetch_all(db)
    .await?;
    rows.into_iter().map(row_to_stage).collect()
}

/// `in_progress` stages with a responsible user and no activity for
/// `idle_days` days.
pub async fn get_stages_needing_status_update(
    db: &PgPool,
    idle_days: i32,
) -> Result<Vec<Stage>> {
    let rows = sqlx::query_as::<_, StageRow>(&format!(
        "SELECT s.{cols} FROM stages s \
         JOIN projects p ON p.id = s.project_id AND p.is_active \
         WHERE s.status = 'in_progress' \
           AND s.responsible_user_id IS NOT NULL \
           AND s.last_activity_at < now() - make_interval(days => $1)",
        cols = STAGE_COLUMNS.replace(", ", ", s."),
    ))
    .bind(idle_days)
    .fetch_all(db)
    .await?;
    rows.into_iter().map(row_to_stage).collect()
}

/// Parallel installation stages ("Монтаж") starting within `within_days`.
///
/// Furniture pipelines expand into parallel stages, so the installation
/// step is itself a stage whose name carries the installation keyword.
pub async fn get_parallel_stages_with_upcoming_installation(
    db: &PgPool,
    within_days: i32,
) -> Result<Vec<Stage>> {
    let rows = sqlx::query_as::<_, StageRow>(&format!(
        "SELECT s.{cols} FROM stages s \
         JOIN projects p ON p.id = s.project_id AND p.is_active \
         WHERE s.is_parallel \
           AND s.status = 'planned' \
           AND (s.name ILIKE '%монтаж%' OR s.name ILIKE '%установка%') \
           AND s.start_date > now() \
           AND s.start_date <= now() + make_interval(days => $1)",
        cols = STAGE_COLUMNS.replace(", ", ", s."),
    ))
    .bind(within_days)
    .fetch_all(db)
    .await?;
    rows.into_iter().map(row_to_stage).collect()
}

// ---------------------------------------------------------------------------
// Sub-stages
// ---------------------------------------------------------------------------

type SubStageRow = (
    i64,
    i64,
    String,
    i32,
    String,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<i64>,
    DateTime<Utc>,
);

const SUB_STAGE_COLUMNS: &str =
    "id, stage_id, name, stage_order, status, start_date, end_date, \
     responsible_user_id, created_at";

fn row_to_sub_stage(row: SubStageRow) -> Result<SubStage> {
    let (id, stage_id, name, order, status, start_date, end_date, responsible_user_id, created_at) =
        row;
    Ok(SubStage {
        id,
        stage_id,
        name,
        order,
        status: StageStatus::parse(&status)?,
        start_date,
        end_date,
        responsible_user_id,
        created_at,
    })
}

/// Append sub-stages to a stage, continuing the existing ordering.
pub async fn add_sub_stages(db: &PgPool, stage_id: i64, names: &[String]) -> Result<Vec<SubStage>> {
    let (start_order,): (i32,) = sqlx::query_as(
        "SELECT COALESCE(MAX(stage_order), 0) FROM sub_stages WHERE stage_id = $1",
    )
    .bind(stage_id)
    .fetch_one(db)
    .await?;

    let mut created = Vec::with_capacity(names.len());
    for (idx, name) in names.iter().enumerate() {
        let row = sqlx::query_as::<_, SubStageRow>(&format!(
            "INSERT INTO sub_stages (stage_id, name, stage_order, status) \
             VALUES ($1, $2, $3, 'planned') \
             RETURNING {SUB_STAGE_COLUMNS}"
        ))
        .bind(stage_id)
        .bind(name)
        .bind(start_order + idx as i32 + 1)
        .fetch_one(db)
        .await?;
        created.push(row_to_sub_stage(row)?);
    }
    Ok(created)
}

/// Sub-stages of a stage, in order.
pub async fn get_sub_stages(db: &PgPool, stage_id: i64) -> Result<Vec<SubStage>> {
    let rows = sqlx::query_as::<_, SubStageRow>(&format!(
        "SELECT {SUB_STAGE_COLUMNS} FROM sub_stages WHERE stage_id = $1 ORDER BY stage_order"
    ))
    .bind(stage_id)
    .fetch_all(db)
    .await?;
    rows.into_iter().map(row_to_sub_stage).collect()
}
