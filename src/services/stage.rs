//! Stage configuration and status logic — dates, responsibles, budgets,
//! sub-stages, launch readiness, the stage status machine, and
//! checkpoint gating.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::db;
use crate::domain::{Stage, StageStatus, SubStage};
use crate::error::{BotError, Result};

/// Primary display date format.
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Accepted input date formats.
const DATE_INPUT_FORMATS: [&str; 3] = ["%d.%m.%Y", "%d/%m/%Y", "%Y-%m-%d"];

/// Longest accepted stage duration, in days.
pub const MAX_DURATION_DAYS: i64 = 365;

// ---------------------------------------------------------------------------
// Date helpers
// ---------------------------------------------------------------------------

/// Parse a date string into a UTC-aware datetime at midnight.
///
/// Accepts `DD.MM.YYYY`, `DD/MM/YYYY`, or `YYYY-MM-DD`. Returns `None`
/// if no format matches.
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    for fmt in DATE_INPUT_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            let midnight = date.and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&midnight));
        }
    }
    None
}

/// Format a datetime as `DD.MM.YYYY`, or `—` when absent.
pub fn format_date(dt: Option<DateTime<Utc>>) -> String {
    match dt {
        Some(dt) => dt.format(DATE_FORMAT).to_string(),
        None => "—".to_owned(),
    }
}

/// Whole days from `start` to `end` (date component only).
pub fn days_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end.date_naive() - start.date_naive()).num_days()
}

// ---------------------------------------------------------------------------
// Stage configuration
// ---------------------------------------------------------------------------

/// Set a stage's start date from user text.
///
/// # Errors
///
/// [`BotError::Validation`] for an unparsable date or when the existing
/// end date would not stay after the new start.
pub async fn set_start_date(
    db: &PgPool,
    stage_id: i64,
    text: &str,
    acting_user_id: i64,
) -> Result<Stage> {
    let date = parse_date(text).ok_or_else(|| {
        BotError::Validation(
            "Не удалось распознать дату. Форматы: ДД.ММ.ГГГГ, ДД/ММ/ГГГГ, ГГГГ-ММ-ДД".to_owned(),
        )
    })?;
    let stage = db::stages::require_stage(db, stage_id).await?;
    if let Some(end) = stage.end_date {
        if end <= date {
            return Err(BotError::Validation(
                "Дата начала должна быть раньше даты завершения".to_owned(),
            ));
        }
    }

    db::stages::set_stage_dates(db, stage_id, Some(date), None).await?;
    log_stage_change(
        db,
        &stage,
        acting_user_id,
        "start_date",
        format_date(stage.start_date),
        format_date(Some(date)),
    )
    .await?;
    db::stages::require_stage(db, stage_id).await
}

/// Set a stage's end date from user text.
///
/// # Errors
///
/// [`BotError::Validation`] for an unparsable date or `end <= start`.
pub async fn set_end_date(
    db: &PgPool,
    stage_id: i64,
    text: &str,
    acting_user_id: i64,
) -> Result<Stage> {
    let date = parse_date(text).ok_or_else(|| {
        BotError::Validation(
            "Не удалось распознать дату. Форматы: ДД.ММ.ГГГГ, ДД/ММ/ГГГГ, ГГГГ-ММ-ДД".to_owned(),
        )
    })?;
    let stage = db::stages::require_stage(db, stage_id).await?;
    if let Some(start) = stage.start_date {
        if date <= start {
            return Err(BotError::Validation(
                "Дата завершения должна быть позже даты начала".to_owned(),
            ));
        }
    }

    db::stages::set_stage_dates(db, stage_id, None, Some(date)).await?;
    log_stage_change(
        db,
        &stage,
        acting_user_id,
        "end_date",
        format_date(stage.end_date),
        format_date(Some(date)),
    )
    .await?;
    db::stages::require_stage(db, stage_id).await
}

/// Set a stage's duration in days: `end = start + days`.
///
/// # Errors
///
/// [`BotError::Validation`] when the stage has no start date or the
/// duration is outside `1..=365`.
pub async fn set_duration_days(
    db: &PgPool,
    stage_id: i64,
    text: &str,
    acting_user_id: i64,
) -> Result<Stage> {
    let days: i64 = text
        .trim()
        .parse()
        .map_err(|_| BotError::Validation("Введите количество дней числом".to_owned()))?;
    if !(1..=MAX_DURATION_DAYS).contains(&days) {
        return Err(BotError::Validation(format!(
            "Длительность должна быть от 1 до {MAX_DURATION_DAYS} дней"
        )));
    }

    let stage = db::stages::require_stage(db, stage_id).await?;
    let start = stage.start_date.ok_or_else(|| {
        BotError::Validation("Сначала задайте дату начала этапа".to_owned())
    })?;
    let end = start + Duration::days(days);

    db::stages::set_stage_dates(db, stage_id, None, Some(end)).await?;
    log_stage_change(
        db,
        &stage,
        acting_user_id,
        "end_date",
        format_date(stage.end_date),
        format_date(Some(end)),
    )
    .await?;
    db::stages::require_stage(db, stage_id).await
}

/// Assign the responsible contact (free-form) and optional user.
pub async fn set_responsible(
    db: &PgPool,
    stage_id: i64,
    contact: &str,
    responsible_user_id: Option<i64>,
    acting_user_id: i64,
) -> Result<Stage> {
    let contact = contact.trim();
    if contact.is_empty() {
        return Err(BotError::Validation(
            "Укажите имя или контакт ответственного".to_owned(),
        ));
    }
    let stage = db::stages::require_stage(db, stage_id).await?;
    db::stages::set_stage_responsible(db, stage_id, responsible_user_id, Some(contact)).await?;
    log_stage_change(
        db,
        &stage,
        acting_user_id,
        "responsible",
        stage.responsible_contact.clone().unwrap_or_default(),
        contact.to_owned(),
    )
    .await?;
    db::stages::require_stage(db, stage_id).await
}

/// Set a stage's budget from user text.
///
/// # Errors
///
/// [`BotError::Validation`] when the amount does not parse or is ≤ 0.
pub async fn set_budget(
    db: &PgPool,
    stage_id: i64,
    text: &str,
    acting_user_id: i64,
) -> Result<Stage> {
    let amount = super::budget::parse_amount(text)
        .ok_or_else(|| BotError::Validation("Не удалось распознать сумму".to_owned()))?;
    if amount <= 0.0 {
        return Err(BotError::Validation("Бюджет должен быть больше нуля".to_owned()));
    }

    let stage = db::stages::require_stage(db, stage_id).await?;
    db::stages::set_stage_budget(db, stage_id, amount).await?;
    log_stage_change(
        db,
        &stage,
        acting_user_id,
        "budget",
        stage.budget.map(|b| b.to_string()).unwrap_or_default(),
        amount.to_string(),
    )
    .await?;
    db::stages::require_stage(db, stage_id).await
}

/// Bulk-add sub-stages from newline-separated text.
///
/// # Errors
///
/// [`BotError::Validation`] when no non-empty line remains.
pub async fn add_sub_stages_from_text(
    db: &PgPool,
    stage_id: i64,
    text: &str,
) -> Result<Vec<SubStage>> {
    let names: Vec<String> = text
        .lines()
        .map(|line| line.trim().trim_start_matches(['-', '•', '*']).trim().to_owned())
        .filter(|line| !line.is_empty())
        .collect();
    if names.is_empty() {
        return Err(BotError::Validation(
            "Отправьте список подэтапов — по одному в строке".to_owned(),
        ));
    }
    db::stages::require_stage(db, stage_id).await?;
    db::stages::add_sub_stages(db, stage_id, &names).await
}

async fn log_stage_change(
    db: &PgPool,
    stage: &Stage,
    acting_user_id: i64,
    field: &str,
    old_value: String,
    new_value: String,
) -> Result<()> {
    let mut tx = db.begin().await?;
    db::changelog::append(
        &mut *tx,
        stage.project_id,
        Some(acting_user_id),
        "stage",
        stage.id,
        field,
        Some(&old_value),
        Some(&new_value),
        None,
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Launch readiness
// ---------------------------------------------------------------------------

/// Result of a launch-readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCheck {
    /// Whether the project can be launched.
    pub ready: bool,
    /// Non-blocking issues worth fixing (missing dates, responsibles,
    /// budgets). When `ready` is false the first entry explains why.
    pub warnings: Vec<String>,
}

/// Check whether a project is ready to launch.
///
/// Launchable iff the first main stage has a start date. Warnings list
/// every main stage missing a date, responsible, or budget.
pub fn validate_launch_readiness(stages: &[Stage]) -> LaunchCheck {
    let main_stages: Vec<&Stage> = stages.iter().filter(|s| !s.is_parallel).collect();

    let Some(first) = main_stages.first() else {
        return LaunchCheck {
            ready: false,
            warnings: vec!["Нет основных этапов".to_owned()],
        };
    };
    if first.start_date.is_none() {
        return LaunchCheck {
            ready: false,
            warnings: vec!["Первый этап должен иметь дату начала".to_owned()],
        };
    }

    let mut warnings = Vec::new();
    for stage in &main_stages {
        if stage.start_date.is_none() {
            warnings.push(format!("«{}» — нет даты начала", stage.name));
        }
        if stage.responsible_contact.is_none() && stage.responsible_user_id.is_none() {
            warnings.push(format!("«{}» — нет ответственного", stage.name));
        }
        if stage.budget.is_none() {
            warnings.push(format!("«{}» — нет бюджета", stage.name));
        }
    }

    LaunchCheck {
        ready: true,
        warnings,
    }
}

/// Launch a project: the first main stage moves `planned → in_progress`.
///
/// # Errors
///
/// [`BotError::Validation`] when the project is not ready or already
/// has an active stage.
pub async fn launch_project(
    db: &PgPool,
    project_id: i64,
    acting_user_id: i64,
) -> Result<LaunchCheck> {
    let stages = db::stages::get_stages_for_project(db, project_id).await?;
    let check = validate_launch_readiness(&stages);
    if !check.ready {
        return Err(BotError::Validation(
            check
                .warnings
                .first()
                .cloned()
                .unwrap_or_else(|| "Проект не готов к запуску".to_owned()),
        ));
    }

    let first = stages
        .iter()
        .find(|s| !s.is_parallel)
        .ok_or_else(|| BotError::Validation("Нет основных этапов".to_owned()))?;
    if first.status != StageStatus::Planned {
        return Err(BotError::Validation("Проект уже запущен".to_owned()));
    }

    transition_status(db, first, StageStatus::InProgress, acting_user_id).await?;
    info!(project_id, stage_id = first.id, "project launched");
    Ok(check)
}

// ---------------------------------------------------------------------------
// Status machine
// ---------------------------------------------------------------------------

/// Allowed work-status transitions.
///
/// Checkpoint rejection is the only path out of `completed` (back to
/// `delayed`).
pub fn allowed_status_transitions(current: StageStatus) -> &'static [StageStatus] {
    match current {
        StageStatus::Planned => &[StageStatus::InProgress],
        StageStatus::InProgress => &[StageStatus::Completed, StageStatus::Delayed],
        StageStatus::Delayed => &[StageStatus::InProgress, StageStatus::Completed],
        StageStatus::Completed => &[StageStatus::Delayed],
    }
}

/// Validate a work-status transition.
///
/// # Errors
///
/// [`BotError::Validation`] naming the allowed next statuses.
pub fn validate_status_transition(current: StageStatus, next: StageStatus) -> Result<()> {
    if allowed_status_transitions(current).contains(&next) {
        return Ok(());
    }
    let allowed = allowed_status_transitions(current)
        .iter()
        .map(|s| s.label())
        .collect::<Vec<_>>()
        .join(", ");
    Err(BotError::Validation(format!(
        "Нельзя перейти из {} в {}. Допустимо: {allowed}",
        current.label(),
        next.label()
    )))
}

/// Outcome of completing a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// The completed stage is a checkpoint: the pipeline halts until the
    /// owner approves or rejects.
    CheckpointPending,
    /// The next main stage auto-advanced to `in_progress`.
    Advanced(Stage),
    /// Nothing left to advance (last stage, or a parallel stage).
    Finished,
}

/// Change a stage's work status, enforcing the transition table and the
/// single-active-main-stage invariant, and appending a ChangeLog row in
/// the same transaction.
pub async fn change_status(
    db: &PgPool,
    stage_id: i64,
    next: StageStatus,
    acting_user_id: i64,
) -> Result<(Stage, Option<CompletionOutcome>)> {
    let stage = db::stages::require_stage(db, stage_id).await?;
    validate_status_transition(stage.status, next)?;

    if next == StageStatus::InProgress && !stage.is_parallel {
        if let Some(active) = db::stages::get_current_main_stage(db, stage.project_id).await? {
            if active.id != stage.id {
                return Err(BotError::Validation(format!(
                    "Этап «{}» ещё в работе — заверши его сначала",
                    active.name
                )));
            }
        }
    }

    transition_status(db, &stage, next, acting_user_id).await?;
    let updated = db::stages::require_stage(db, stage_id).await?;

    let outcome = if next == StageStatus::Completed {
        Some(advance_after_completion(db, &updated, acting_user_id).await?)
    } else {
        None
    };

    Ok((updated, outcome))
}

/// After completion: halt at checkpoints, otherwise auto-advance the
/// next main stage.
async fn advance_after_completion(
    db: &PgPool,
    completed: &Stage,
    acting_user_id: i64,
) -> Result<CompletionOutcome> {
    if completed.is_checkpoint {
        return Ok(CompletionOutcome::CheckpointPending);
    }
    if completed.is_parallel {
        return Ok(CompletionOutcome::Finished);
    }

    match db::stages::get_next_main_stage(db, completed.project_id, completed.order).await? {
        Some(next) if next.status == StageStatus::Planned => {
            transition_status(db, &next, StageStatus::InProgress, acting_user_id).await?;
            let next = db::stages::require_stage(db, next.id).await?;
            Ok(CompletionOutcome::Advanced(next))
        }
        _ => Ok(CompletionOutcome::Finished),
    }
}

/// Owner approved a completed checkpoint: advance the next main stage.
pub async fn approve_checkpoint(
    db: &PgPool,
    stage_id: i64,
    acting_user_id: i64,
) -> Result<Option<Stage>> {
    let stage = db::stages::require_stage(db, stage_id).await?;
    if !stage.is_checkpoint || stage.status != StageStatus::Completed {
        return Err(BotError::Validation(
            "Этап не ожидает одобрения контрольной точки".to_owned(),
        ));
    }

    match db::stages::get_next_main_stage(db, stage.project_id, stage.order).await? {
        Some(next) if next.status == StageStatus::Planned => {
            transition_status(db, &next, StageStatus::InProgress, acting_user_id).await?;
            Ok(Some(db::stages::require_stage(db, next.id).await?))
        }
        _ => Ok(None),
    }
}

/// Owner rejected a completed checkpoint: the stage reverts to `delayed`.
pub async fn reject_checkpoint(db: &PgPool, stage_id: i64, acting_user_id: i64) -> Result<Stage> {
    let stage = db::stages::require_stage(db, stage_id).await?;
    if !stage.is_checkpoint || stage.status != StageStatus::Completed {
        return Err(BotError::Validation(
            "Этап не ожидает одобрения контрольной точки".to_owned(),
        ));
    }
    transition_status(db, &stage, StageStatus::Delayed, acting_user_id).await?;
    db::stages::require_stage(db, stage_id).await
}

/// Apply a status change and its ChangeLog row atomically.
async fn transition_status(
    db: &PgPool,
    stage: &Stage,
    next: StageStatus,
    acting_user_id: i64,
) -> Result<()> {
    let mut tx = db.begin().await?;
    db::stages::update_stage_status(&mut *tx, stage.id, next).await?;
    db::changelog::append(
        &mut *tx,
        stage.project_id,
        Some(acting_user_id),
        "stage",
        stage.id,
        "status",
        Some(stage.status.as_str()),
        Some(next.as_str()),
        None,
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Checkpoint descriptions
// ---------------------------------------------------------------------------

/// Inspection hints for the canonical checkpoint stages.
const CHECKPOINT_DESCRIPTIONS: [(&str, &str); 5] = [
    ("Электрика", "Проверьте количество и расположение розеток по плану"),
    (
        "Сантехника",
        "Проверьте расположение выводов для душа, смесителей и унитаза",
    ),
    (
        "Плитка",
        "Самая частая точка для вызова эксперта — проверка качества укладки",
    ),
    (
        "Шпаклёвка",
        "Важная контрольная точка — проверка качества перед покраской",
    ),
    ("Финальная приёмка", "Общая проверка завершённых работ"),
];

/// Human-readable hint for a checkpoint stage, with a generic fallback.
pub fn checkpoint_description(stage_name: &str) -> &'static str {
    let lower = stage_name.to_lowercase();
    for (key, desc) in CHECKPOINT_DESCRIPTIONS {
        if lower.contains(&key.to_lowercase()) {
            return desc;
        }
    }
    "Контрольная точка — требуется проверка и одобрение перед продолжением"
}
