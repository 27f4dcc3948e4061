//! Budget item repository and aggregation queries.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::domain::{BudgetCategory, BudgetItem};
use crate::error::{BotError, Result};

type BudgetItemRow = (
    i64,
    i64,
    Option<i64>,
    String,
    Option<String>,
    f64,
    f64,
    f64,
    bool,
    Option<i64>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const BUDGET_ITEM_COLUMNS: &str = "id, project_id, stage_id, category, description, \
     work_cost, material_cost, prepayment, is_confirmed, confirmed_by_user_id, \
     created_at, updated_at";

fn row_to_item(row: BudgetItemRow) -> Result<BudgetItem> {
    let (
        id,
        project_id,
        stage_id,
        category,
        description,
        work_cost,
        material_cost,
        prepayment,
        is_confirmed,
        confirmed_by_user_id,
        created_at,
        updated_at,
    ) = row;
    Ok(BudgetItem {
        id,
        project_id,
        stage_id,
        category: BudgetCategory::parse(&category)?,
        description,
        work_cost,
        material_cost,
        prepayment,
        is_confirmed,
        confirmed_by_user_id,
        created_at,
        updated_at,
    })
}

/// Insert a budget item inside a caller-owned transaction.
#[allow(clippy::too_many_arguments)]
pub async fn create_budget_item(
    conn: &mut PgConnection,
    project_id: i64,
    stage_id: Option<i64>,
    category: BudgetCategory,
    description: Option<&str>,
    work_cost: f64,
    material_cost: f64,
    prepayment: f64,
) -> Result<BudgetItem> {
    let row = sqlx::query_as::<_, BudgetItemRow>(&format!(
        "INSERT INTO budget_items \
             (project_id, stage_id, category, description, work_cost, \
              material_cost, prepayment, is_confirmed) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE) \
         RETURNING {BUDGET_ITEM_COLUMNS}"
    ))
    .bind(project_id)
    .bind(stage_id)
    .bind(category.as_str())
    .bind(description)
    .bind(work_cost)
    .bind(material_cost)
    .bind(prepayment)
    .fetch_one(conn)
    .await?;
    row_to_item(row)
}

/// Look up a budget item by id.
pub async fn get_budget_item(db: &PgPool, item_id: i64) -> Result<Option<BudgetItem>> {
    let row = sqlx::query_as::<_, BudgetItemRow>(&format!(
        "SELECT {BUDGET_ITEM_COLUMNS} FROM budget_items WHERE id = $1"
    ))
    .bind(item_id)
    .fetch_optional(db)
    .await?;
    row.map(row_to_item).transpose()
}

/// All budget items of a project, newest first.
pub async fn get_budget_items(db: &PgPool, project_id: i64) -> Result<Vec<BudgetItem>> {
    let rows = sqlx::query_as::<_, BudgetItemRow>(&format!(
        "SELECT {BUDGET_ITEM_COLUMNS} FROM budget_items \
         WHERE project_id = $1 ORDER BY id DESC"
    ))
    .bind(project_id)
    .fetch_all(db)
    .await?;
    rows.into_iter().map(row_to_item).collect()
}

/// Mark a budget item confirmed inside a caller-owned transaction.
///
/// # Errors
///
/// Returns [`BotError::NotFound`] when the item does not exist.
pub async fn confirm_budget_item(
    conn: &mut PgConnection,
    item_id: i64,
    confirmed_by_user_id: i64,
) -> Result<BudgetItem> {
    let row = sqlx::query_as::<_, BudgetItemRow>(&format!(
        "UPDATE budget_items \
         SET is_confirmed = TRUE, confirmed_by_user_id = $2, updated_at = now() \
         WHERE id = $1 \
         RETURNING {BUDGET_ITEM_COLUMNS}"
    ))
    .bind(item_id)
    .bind(confirmed_by_user_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| BotError::NotFound("Запись расхода не найдена".to_owned()))?;
    row_to_item(row)
}

/// Delete a budget item inside a caller-owned transaction.
///
/// # Errors
///
/// Returns [`BotError::NotFound`] when the item does not exist.
pub async fn delete_budget_item(conn: &mut PgConnection, item_id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM budget_items WHERE id = $1")
        .bind(item_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(BotError::NotFound("Запись расхода не найдена".to_owned()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Aggregations
// ---------------------------------------------------------------------------

/// Per-category aggregation of a project's budget items.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySummary {
    /// Category key (kept as text so materialized-view reads match).
    pub category: String,
    /// Sum of work costs.
    pub total_work: f64,
    /// Sum of material costs.
    pub total_materials: f64,
    /// Sum of prepayments.
    pub total_prepayments: f64,
    /// Sum of all three.
    pub total_spent: f64,
    /// Number of items in the category.
    pub item_count: i64,
    /// Number of confirmed items.
    pub confirmed_count: i64,
}

/// Project-wide totals.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProjectTotals {
    /// Sum of work costs.
    pub total_work: f64,
    /// Sum of material costs.
    pub total_materials: f64,
    /// Sum of prepayments.
    pub total_prepayments: f64,
    /// Sum of all three.
    pub total_spent: f64,
    /// Number of budget items.
    pub item_count: i64,
}

/// Live per-category summary (GROUP BY; the materialized view in
/// [`crate::db::cache`] serves the hot path).
pub async fn get_category_summaries(
    db: &PgPool,
    project_id: i64,
) -> Result<Vec<CategorySummary>> {
    let rows: Vec<(String, f64, f64, f64, i64, i64)> = sqlx::query_as(
        "SELECT category, \
                COALESCE(SUM(work_cost), 0), \
                COALESCE(SUM(material_cost), 0), \
                COALESCE(SUM(prepayment), 0), \
                COUNT(*), \
                COUNT(*) FILTER (WHERE is_confirmed) \
         FROM budget_items \
         WHERE project_id = $1 \
         GROUP BY category \
         ORDER BY category",
    )
    .bind(project_id)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(category, total_work, total_materials, total_prepayments, item_count, confirmed_count)| {
                CategorySummary {
                    category,
                    total_work,
                    total_materials,
                    total_prepayments,
                    total_spent: total_work + total_materials + total_prepayments,
                    item_count,
                    confirmed_count,
                }
            },
        )
        .collect())
}

/// Live project-wide totals.
pub async fn get_project_totals(db: &PgPool, project_id: i64) -> Result<ProjectTotals> {
    let row: (f64, f64, f64, i64) = sqlx::query_as(
        "SELECT COALESCE(SUM(work_cost), 0), \
                COALESCE(SUM(material_cost), 0), \
                COALESCE(SUM(prepayment), 0), \
                COUNT(*) \
         FROM budget_items \
         WHERE project_id = $1",
    )
    .bind(project_id)
    .fetch_one(db)
    .await?;

    let (total_work, total_materials, total_prepayments, item_count) = row;
    Ok(ProjectTotals {
        total_work,
        total_materials,
        total_prepayments,
        total_spent: total_work + total_materials + total_prepayments,
        item_count,
    })
}
