//! Budget service — expense tracking, payment lifecycle, and budget
//! health analysis.
//!
//! Every create / update / delete of a budget item and every payment
//! transition appends a ChangeLog row in the same transaction.

use sqlx::PgPool;
use tracing::info;

use crate::db;
use crate::db::budget::ProjectTotals;
use crate::domain::{BudgetCategory, BudgetItem, PaymentStatus, Stage, StageStatus};
use crate::error::{BotError, Result};

// ---------------------------------------------------------------------------
// Amount parsing / formatting
// ---------------------------------------------------------------------------

/// Parse an amount from user input.
///
/// Handles thousand spaces, comma decimals, and common currency
/// symbols: `"500 000"`, `"1500,50"`, `"80000 ₸"`. Returns `None` for
/// anything unparsable or negative.
pub fn parse_amount(text: &str) -> Option<f64> {
    let mut cleaned = text.trim().replace([' ', '\u{a0}'], "").replace(',', ".");
    for symbol in ["₸", "тг", "руб", "₽", "$", "€"] {
        cleaned = cleaned.replace(symbol, "");
    }
    let amount: f64 = cleaned.trim().parse().ok()?;
    if amount < 0.0 {
        return None;
    }
    Some(amount)
}

/// Format an amount with thousand-space grouping: `152340.0 → "152 340"`.
pub fn format_amount(amount: f64) -> String {
    let rounded = amount.round() as i64;
    let digits = rounded.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    let offset = digits.len() % 3;
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (i + 3 - offset) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    if rounded < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

// ---------------------------------------------------------------------------
// Category inference
// ---------------------------------------------------------------------------

/// Keyword → category mapping used to auto-link expenses to stages.
const STAGE_KEYWORDS: [(&str, BudgetCategory); 17] = [
    ("демонтаж", BudgetCategory::Demolition),
    ("электрик", BudgetCategory::Electrical),
    ("сантехник", BudgetCategory::Plumbing),
    ("штукатурк", BudgetCategory::Walls),
    ("стяжка", BudgetCategory::Flooring),
    ("плитк", BudgetCategory::Tiling),
    ("шпаклёвк", BudgetCategory::Walls),
    ("шпаклевк", BudgetCategory::Walls),
    ("покраск", BudgetCategory::Painting),
    ("обои", BudgetCategory::Painting),
    ("пол", BudgetCategory::Flooring),
    ("двер", BudgetCategory::Doors),
    ("потолк", BudgetCategory::Ceilings),
    ("мебель", BudgetCategory::Furniture),
    ("кухн", BudgetCategory::Furniture),
    ("шкаф", BudgetCategory::Furniture),
    ("гардероб", BudgetCategory::Furniture),
];

/// Guess the budget category from a stage name, falling back to `Other`.
pub fn guess_category_from_stage(stage_name: &str) -> BudgetCategory {
    let lower = stage_name.to_lowercase();
    for (keyword, category) in STAGE_KEYWORDS {
        if lower.contains(keyword) {
            return category;
        }
    }
    BudgetCategory::Other
}

// ---------------------------------------------------------------------------
// Payment lifecycle
// ---------------------------------------------------------------------------

/// Allowed payment transitions; rollbacks step back exactly one state
/// and `closed` is terminal.
pub fn allowed_payment_transitions(current: PaymentStatus) -> &'static [PaymentStatus] {
    match current {
        PaymentStatus::Recorded => &[PaymentStatus::InProgress],
        PaymentStatus::InProgress => &[PaymentStatus::Verified, PaymentStatus::Recorded],
        PaymentStatus::Verified => &[PaymentStatus::Paid, PaymentStatus::InProgress],
        PaymentStatus::Paid => &[PaymentStatus::Closed, PaymentStatus::Verified],
        PaymentStatus::Closed => &[],
    }
}

/// Validate a payment transition.
///
/// # Errors
///
/// [`BotError::Validation`] naming the allowed next statuses.
pub fn validate_payment_transition(current: PaymentStatus, next: PaymentStatus) -> Result<()> {
    if allowed_payment_transitions(current).contains(&next) {
        return Ok(());
    }
    let allowed = allowed_payment_transitions(current)
        .iter()
        .map(|s| s.label())
        .collect::<Vec<_>>()
        .join(", ");
    Err(BotError::Validation(format!(
        "Нельзя перейти из {} в {}. Допустимые переходы: {allowed}",
        current.label(),
        next.label()
    )))
}

/// Advisory payment-risk hint for a stage, or `None` when nothing is off.
pub fn check_payment_risk(stage_status: StageStatus, payment_status: PaymentStatus) -> Option<&'static str> {
    if payment_status == PaymentStatus::Paid && stage_status != StageStatus::Completed {
        return Some(
            "⚠️ ВНИМАНИЕ: оплата произведена, но этап ещё не завершён!\n\
             Рекомендуется завершить и проверить работу перед оплатой.",
        );
    }
    if payment_status == PaymentStatus::Paid {
        return Some(
            "💡 Совет: перед оплатой рекомендуется вызвать эксперта для проверки качества работ.",
        );
    }
    if stage_status == StageStatus::Completed && payment_status == PaymentStatus::Recorded {
        return Some(
            "ℹ️ Этап завершён, но оплата ещё не оформлена.\nНе забудьте записать расходы.",
        );
    }
    None
}

/// Apply a payment transition, appending the ChangeLog row in the same
/// transaction.
pub async fn transition_payment_status(
    db: &PgPool,
    stage: &Stage,
    next: PaymentStatus,
    acting_user_id: i64,
) -> Result<Stage> {
    validate_payment_transition(stage.payment_status, next)?;

    let mut tx = db.begin().await?;
    db::stages::update_payment_status(&mut *tx, stage.id, next).await?;
    db::changelog::append(
        &mut *tx,
        stage.project_id,
        Some(acting_user_id),
        "stage",
        stage.id,
        "payment_status",
        Some(stage.payment_status.as_str()),
        Some(next.as_str()),
        None,
    )
    .await?;
    tx.commit().await?;

    info!(
        stage_id = stage.id,
        from = stage.payment_status.as_str(),
        to = next.as_str(),
        "payment status changed"
    );
    db::stages::require_stage(db, stage.id).await
}

// ---------------------------------------------------------------------------
// Expenses
// ---------------------------------------------------------------------------

/// Input for [`add_expense`].
#[derive(Debug, Clone)]
pub struct NewExpense {
    /// Owning project.
    pub project_id: i64,
    /// Related stage, when known.
    pub stage_id: Option<i64>,
    /// Expense category.
    pub category: BudgetCategory,
    /// Free-form description.
    pub description: Option<String>,
    /// Cost of work.
    pub work_cost: f64,
    /// Cost of materials.
    pub material_cost: f64,
    /// Prepayment.
    pub prepayment: f64,
}

/// Record an expense: insert the item, append the ChangeLog row, and
/// invalidate the project's budget caches.
///
/// # Errors
///
/// [`BotError::Validation`] when any amount is negative or all are zero.
pub async fn add_expense(
    db: &PgPool,
    input: NewExpense,
    acting_user_id: i64,
) -> Result<BudgetItem> {
    if input.work_cost < 0.0 || input.material_cost < 0.0 || input.prepayment < 0.0 {
        return Err(BotError::Validation(
            "Суммы не могут быть отрицательными".to_owned(),
        ));
    }
    if input.work_cost == 0.0 && input.material_cost == 0.0 && input.prepayment == 0.0 {
        return Err(BotError::Validation("Укажите хотя бы одну сумму".to_owned()));
    }

    let mut tx = db.begin().await?;
    let item = db::budget::create_budget_item(
        &mut *tx,
        input.project_id,
        input.stage_id,
        input.category,
        input.description.as_deref(),
        input.work_cost,
        input.material_cost,
        input.prepayment,
    )
    .await?;
    db::changelog::append(
        &mut *tx,
        input.project_id,
        Some(acting_user_id),
        "budget_item",
        item.id,
        "created",
        None,
        Some(&format_amount(item.total())),
        None,
    )
    .await?;
    tx.commit().await?;

    db::cache::cache_invalidate(db, &format!("budget:{}", input.project_id)).await?;
    info!(
        project_id = input.project_id,
        item_id = item.id,
        total = item.total(),
        "expense recorded"
    );
    Ok(item)
}

/// Owner confirmation of a budget item, with its ChangeLog row.
pub async fn confirm_expense(db: &PgPool, item_id: i64, acting_user_id: i64) -> Result<BudgetItem> {
    let mut tx = db.begin().await?;
    let item = db::budget::confirm_budget_item(&mut *tx, item_id, acting_user_id).await?;
    db::changelog::append(
        &mut *tx,
        item.project_id,
        Some(acting_user_id),
        "budget_item",
        item.id,
        "is_confirmed",
        Some("false"),
        Some("true"),
        Some(acting_user_id),
    )
    .await?;
    tx.commit().await?;

    db::cache::cache_invalidate(db, &format!("budget:{}", item.project_id)).await?;
    Ok(item)
}

/// Delete a budget item, with its ChangeLog row.
pub async fn delete_expense(db: &PgPool, item: &BudgetItem, acting_user_id: i64) -> Result<()> {
    let mut tx = db.begin().await?;
    db::budget::delete_budget_item(&mut *tx, item.id).await?;
    db::changelog::append(
        &mut *tx,
        item.project_id,
        Some(acting_user_id),
        "budget_item",
        item.id,
        "deleted",
        Some(&format_amount(item.total())),
        None,
        None,
    )
    .await?;
    tx.commit().await?;

    db::cache::cache_invalidate(db, &format!("budget:{}", item.project_id)).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Budget analysis
// ---------------------------------------------------------------------------

/// Budget health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetHealth {
    /// Within budget.
    Ok,
    /// ≥ 90% of the budget used.
    Warning,
    /// Over budget.
    Over,
}

/// Result of a budget analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetAnalysis {
    /// Whether the project has a budget cap at all.
    pub has_budget: bool,
    /// Budget minus spending (negative when over).
    pub remaining: f64,
    /// Percentage of the budget used.
    pub usage_pct: f64,
    /// Health classification.
    pub status: BudgetHealth,
    /// Human-readable summary line.
    pub message: String,
}

/// Classify budget usage as `ok` / `warning` (≥ 90%) / `over` (> 100%).
pub fn analyze_budget(total_budget: Option<f64>, total_spent: f64) -> BudgetAnalysis {
    let Some(budget) = total_budget.filter(|b| *b > 0.0) else {
        return BudgetAnalysis {
            has_budget: false,
            remaining: 0.0,
            usage_pct: 0.0,
            status: BudgetHealth::Ok,
            message: "Общий бюджет не задан".to_owned(),
        };
    };

    let remaining = budget - total_spent;
    let usage_pct = total_spent / budget * 100.0;

    if total_spent > budget {
        BudgetAnalysis {
            has_budget: true,
            remaining,
            usage_pct,
            status: BudgetHealth::Over,
            message: format!(
                "Бюджет превышен на {} ₸ ({:.0}%)",
                format_amount(total_spent - budget),
                usage_pct
            ),
        }
    } else if usage_pct >= 90.0 {
        BudgetAnalysis {
            has_budget: true,
            remaining,
            usage_pct,
            status: BudgetHealth::Warning,
            message: format!(
                "Бюджет на исходе! Использовано {:.0}%, осталось {} ₸",
                usage_pct,
                format_amount(remaining)
            ),
        }
    } else {
        BudgetAnalysis {
            has_budget: true,
            remaining,
            usage_pct,
            status: BudgetHealth::Ok,
            message: format!(
                "Использовано {:.0}%, осталось {} ₸",
                usage_pct,
                format_amount(remaining)
            ),
        }
    }
}

/// Project totals, preferring the materialized view and falling back to
/// the live aggregation when the view has not caught up yet.
pub async fn project_totals(db: &PgPool, project_id: i64) -> Result<ProjectTotals> {
    let cached = db::cache::get_cached_budget_summary(db, project_id).await;
    if let Ok(categories) = cached {
        if !categories.is_empty() {
            let mut totals = ProjectTotals::default();
            for c in &categories {
                totals.total_work += c.total_work;
                totals.total_materials += c.total_materials;
                totals.total_prepayments += c.total_prepayments;
                totals.total_spent += c.total_spent;
                totals.item_count += c.item_count;
            }
            return Ok(totals);
        }
    }
    db::budget::get_project_totals(db, project_id).await
}
