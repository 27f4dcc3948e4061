//! Notification service — platform-neutral notification values.
//!
//! Builders produce plain-text notifications with resolved recipient
//! ids; delivery belongs to the adapter. The recipient policy maps each
//! notification type to the roles that should receive it.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::domain::RoleType;
use crate::services::stage::format_date;

/// Types of notifications the system can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationType {
    /// Stage deadline within one day.
    DeadlineApproaching,
    /// Stage deadline has passed.
    DeadlineOverdue,
    /// Stage start within one day.
    StageStartingSoon,
    /// Ask the responsible person how the work is going.
    StatusUpdateRequest,
    /// Checkpoint stage completed, owner approval needed.
    CheckpointReached,
    /// Owner approved a checkpoint.
    CheckpointApproved,
    /// Owner rejected a checkpoint.
    CheckpointRejected,
    /// Custom furniture installation approaching; order lead time.
    FurnitureOrderReminder,
    /// Budget exceeded.
    OverspendingAlert,
    /// ≥ 90% of the budget used.
    BudgetWarning,
    /// Automated weekly report.
    WeeklyReport,
}

impl NotificationType {
    /// Stable identifier used in logs and payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeadlineApproaching => "deadline_approaching",
            Self::DeadlineOverdue => "deadline_overdue",
            Self::StageStartingSoon => "stage_starting_soon",
            Self::StatusUpdateRequest => "status_update_request",
            Self::CheckpointReached => "checkpoint_reached",
            Self::CheckpointApproved => "checkpoint_approved",
            Self::CheckpointRejected => "checkpoint_rejected",
            Self::FurnitureOrderReminder => "furniture_order_reminder",
            Self::OverspendingAlert => "overspending_alert",
            Self::BudgetWarning => "budget_warning",
            Self::WeeklyReport => "weekly_report",
        }
    }

    /// Roles that receive this notification type.
    ///
    /// An empty slice means recipients are resolved dynamically (e.g.
    /// the stage's responsible person).
    pub fn recipient_roles(&self) -> &'static [RoleType] {
        match self {
            Self::DeadlineApproaching | Self::DeadlineOverdue => {
                &[RoleType::Owner, RoleType::CoOwner, RoleType::Foreman]
            }
            Self::StageStartingSoon => &[RoleType::Owner, RoleType::Foreman],
            Self::StatusUpdateRequest => &[],
            Self::CheckpointReached => &[RoleType::Owner],
            Self::CheckpointApproved | Self::CheckpointRejected => {
                &[RoleType::Owner, RoleType::Foreman, RoleType::CoOwner]
            }
            Self::FurnitureOrderReminder => &[
                RoleType::Owner,
                RoleType::CoOwner,
                RoleType::Foreman,
                RoleType::Designer,
            ],
            Self::OverspendingAlert | Self::BudgetWarning | Self::WeeklyReport => {
                &[RoleType::Owner, RoleType::CoOwner]
            }
        }
    }
}

/// A platform-neutral notification, ready for an adapter to deliver.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Notification kind.
    pub notification_type: NotificationType,
    /// Project the notification is about.
    pub project_id: i64,
    /// Project name, for display.
    pub project_name: String,
    /// Short summary.
    pub title: String,
    /// Full message body; plain text, no markup.
    pub body: String,
    /// Internal user ids to notify.
    pub recipient_user_ids: Vec<i64>,
    /// Related stage, when applicable.
    pub stage_id: Option<i64>,
    /// Related stage name, when applicable.
    pub stage_name: Option<String>,
    /// Flexible extra payload.
    pub extra: serde_json::Value,
}

/// "Deadline tomorrow" notification.
pub fn build_deadline_approaching(
    project_id: i64,
    project_name: &str,
    stage_id: i64,
    stage_name: &str,
    end_date: DateTime<Utc>,
    responsible_contact: Option<&str>,
    recipient_ids: Vec<i64>,
) -> Notification {
    let date_str = format_date(Some(end_date));
    let mut body = format!(
        "Этап «{stage_name}» проекта «{project_name}» завершается завтра ({date_str})."
    );
    if let Some(contact) = responsible_contact {
        body.push_str(&format!("\nОтветственный: {contact}"));
    }

    Notification {
        notification_type: NotificationType::DeadlineApproaching,
        project_id,
        project_name: project_name.to_owned(),
        title: format!("Срок завершения: {stage_name}"),
        body,
        recipient_user_ids: recipient_ids,
        stage_id: Some(stage_id),
        stage_name: Some(stage_name.to_owned()),
        extra: json!({ "end_date": date_str }),
    }
}

/// "Deadline missed" notification.
#[allow(clippy::too_many_arguments)]
pub fn build_deadline_overdue(
    project_id: i64,
    project_name: &str,
    stage_id: i64,
    stage_name: &str,
    end_date: DateTime<Utc>,
    days_overdue: i64,
    responsible_contact: Option<&str>,
    recipient_ids: Vec<i64>,
) -> Notification {
    let date_str = format_date(Some(end_date));
    let mut body = format!(
        "Этап «{stage_name}» проекта «{project_name}» просрочен!\n\
         Дедлайн был: {date_str} (просрочка: {days_overdue} дн.)"
    );
    if let Some(contact) = responsible_contact {
        body.push_str(&format!("\nОтветственный: {contact}"));
    }

    Notification {
        notification_type: NotificationType::DeadlineOverdue,
        project_id,
        project_name: project_name.to_owned(),
        title: format!("Просрочка: {stage_name}"),
        body,
        recipient_user_ids: recipient_ids,
        stage_id: Some(stage_id),
        stage_name: Some(stage_name.to_owned()),
        extra: json!({ "end_date": date_str, "days_overdue": days_overdue }),
    }
}

/// Status prompt for the responsible person of an idle stage.
pub fn build_status_update_request(
    project_id: i64,
    project_name: &str,
    stage_id: i64,
    stage_name: &str,
    recipient_ids: Vec<i64>,
) -> Notification {
    Notification {
        notification_type: NotificationType::StatusUpdateRequest,
        project_id,
        project_name: project_name.to_owned(),
        title: format!("Запрос статуса: {stage_name}"),
        body: format!(
            "Как продвигается этап «{stage_name}» проекта «{project_name}»?\n\
             Пожалуйста, обновите статус работ."
        ),
        recipient_user_ids: recipient_ids,
        stage_id: Some(stage_id),
        stage_name: Some(stage_name.to_owned()),
        extra: json!({}),
    }
}

/// Checkpoint completed — owner approval requested.
pub fn build_checkpoint_reached(
    project_id: i64,
    project_name: &str,
    stage_id: i64,
    stage_name: &str,
    owner_ids: Vec<i64>,
) -> Notification {
    Notification {
        notification_type: NotificationType::CheckpointReached,
        project_id,
        project_name: project_name.to_owned(),
        title: format!("Контрольная точка: {stage_name}"),
        body: format!(
            "Этап «{stage_name}» проекта «{project_name}» завершён.\n\
             Это контрольная точка — требуется ваше одобрение перед переходом \
             к следующему этапу.\n\n\
             Рекомендуется вызвать эксперта для проверки качества."
        ),
        recipient_user_ids: owner_ids,
        stage_id: Some(stage_id),
        stage_name: Some(stage_name.to_owned()),
        extra: json!({}),
    }
}

/// Checkpoint verdict notification (approved or rejected).
pub fn build_checkpoint_verdict(
    approved: bool,
    project_id: i64,
    project_name: &str,
    stage_id: i64,
    stage_name: &str,
    recipient_ids: Vec<i64>,
) -> Notification {
    let (notification_type, title, body) = if approved {
        (
            NotificationType::CheckpointApproved,
            format!("Контрольная точка пройдена: {stage_name}"),
            format!(
                "Владелец одобрил этап «{stage_name}» проекта «{project_name}».\n\
                 Работы продолжаются."
            ),
        )
    } else {
        (
            NotificationType::CheckpointRejected,
            format!("Контрольная точка отклонена: {stage_name}"),
            format!(
                "Владелец отклонил этап «{stage_name}» проекта «{project_name}».\n\
                 Этап возвращён на доработку."
            ),
        )
    };

    Notification {
        notification_type,
        project_id,
        project_name: project_name.to_owned(),
        title,
        body,
        recipient_user_ids: recipient_ids,
        stage_id: Some(stage_id),
        stage_name: Some(stage_name.to_owned()),
        extra: json!({ "approved": approved }),
    }
}

/// Furniture lead-time reminder before installation.
#[allow(clippy::too_many_arguments)]
pub fn build_furniture_order_reminder(
    project_id: i64,
    project_name: &str,
    stage_id: i64,
    stage_name: &str,
    installation_date: DateTime<Utc>,
    days_until: i64,
    recipient_ids: Vec<i64>,
) -> Notification {
    let date_str = format_date(Some(installation_date));
    Notification {
        notification_type: NotificationType::FurnitureOrderReminder,
        project_id,
        project_name: project_name.to_owned(),
        title: format!("Заказ мебели: {stage_name}"),
        body: format!(
            "Напоминание: этап «{stage_name}» проекта «{project_name}».\n\
             До монтажа мебели осталось {days_until} дн. (дата: {date_str}).\n\
             Убедитесь, что заказ размещён и производство запущено."
        ),
        recipient_user_ids: recipient_ids,
        stage_id: Some(stage_id),
        stage_name: Some(stage_name.to_owned()),
        extra: json!({ "installation_date": date_str, "days_until": days_until }),
    }
}

/// Budget exceeded.
pub fn build_overspending_alert(
    project_id: i64,
    project_name: &str,
    current_total: f64,
    budget_limit: f64,
    overspend_pct: f64,
    owner_ids: Vec<i64>,
) -> Notification {
    let fmt = super::budget::format_amount;
    Notification {
        notification_type: NotificationType::OverspendingAlert,
        project_id,
        project_name: project_name.to_owned(),
        title: format!("Превышение бюджета: {project_name}"),
        body: format!(
            "Общий бюджет проекта «{project_name}» превышен!\n\
             Текущие расходы: {} ₸ / Бюджет: {} ₸ (+{overspend_pct:.0}%)",
            fmt(current_total),
            fmt(budget_limit),
        ),
        recipient_user_ids: owner_ids,
        stage_id: None,
        stage_name: None,
        extra: json!({
            "current_total": current_total,
            "budget_limit": budget_limit,
            "overspend_pct": overspend_pct,
        }),
    }
}

/// ≥ 90% of the budget used.
pub fn build_budget_warning(
    project_id: i64,
    project_name: &str,
    current_total: f64,
    budget_limit: f64,
    usage_pct: f64,
    owner_ids: Vec<i64>,
) -> Notification {
    let fmt = super::budget::format_amount;
    Notification {
        notification_type: NotificationType::BudgetWarning,
        project_id,
        project_name: project_name.to_owned(),
        title: format!("Бюджет на исходе: {project_name}"),
        body: format!(
            "Бюджет проекта «{project_name}» использован на {usage_pct:.0}%.\n\
             Расходы: {} ₸ / Бюджет: {} ₸",
            fmt(current_total),
            fmt(budget_limit),
        ),
        recipient_user_ids: owner_ids,
        stage_id: None,
        stage_name: None,
        extra: json!({
            "current_total": current_total,
            "budget_limit": budget_limit,
            "usage_pct": usage_pct,
        }),
    }
}

/// Weekly report wrapper; the body is the pre-rendered report text.
pub fn build_weekly_report_notification(
    project_id: i64,
    project_name: &str,
    report_text: String,
    owner_ids: Vec<i64>,
) -> Notification {
    Notification {
        notification_type: NotificationType::WeeklyReport,
        project_id,
        project_name: project_name.to_owned(),
        title: format!("Еженедельный отчёт: {project_name}"),
        body: report_text,
        recipient_user_ids: owner_ids,
        stage_id: None,
        stage_name: None,
        extra: json!({ "is_html": true }),
    }
}
