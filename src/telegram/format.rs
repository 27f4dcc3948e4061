//! HTML formatting and inline keyboards for Telegram.
//!
//! Everything user-visible is rendered here from the services'
//! formatting-free data. All dynamic text goes through
//! [`escape_html`] before entering an HTML-mode message.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::db::budget::CategorySummary;
use crate::db::projects::TeamMember;
use crate::domain::templates::{custom_item_label, CUSTOM_ITEMS};
use crate::domain::{BudgetCategory, Project, RenovationType, Stage, SubStage};
use crate::services::budget::{
    allowed_payment_transitions, format_amount, BudgetAnalysis,
};
use crate::services::report::{DeadlineReport, NextStageInfo, StatusReport, WeeklyReport};
use crate::services::roles::{format_role_list, ASSIGNABLE_ROLES};
use crate::services::stage::{allowed_status_transitions, format_date};
use crate::telegram::callbacks::{Callback, StageAction};

/// Escape text for Telegram HTML mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

// ---------------------------------------------------------------------------
// Keyboards
// ---------------------------------------------------------------------------

fn button(label: impl Into<String>, callback: Callback) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label.into(), callback.encode())
}

/// One project per row, for the private-chat picker.
pub fn project_select_keyboard(projects: &[Project]) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = projects
        .iter()
        .map(|p| vec![button(p.name.clone(), Callback::ProjectSelect(p.id))])
        .collect();
    InlineKeyboardMarkup::new(rows)
}

/// One project per row, for /link in a group chat.
pub fn project_link_keyboard(projects: &[Project]) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = projects
        .iter()
        .map(|p| vec![button(p.name.clone(), Callback::ProjectLink(p.id))])
        .collect();
    InlineKeyboardMarkup::new(rows)
}

/// Renovation-type picker for the creation wizard.
pub fn renovation_type_keyboard() -> InlineKeyboardMarkup {
    let types = [
        RenovationType::Cosmetic,
        RenovationType::Standard,
        RenovationType::Major,
        RenovationType::Designer,
    ];
    let rows: Vec<Vec<InlineKeyboardButton>> = types
        .iter()
        .map(|t| vec![button(t.label(), Callback::WizardType(*t))])
        .collect();
    InlineKeyboardMarkup::new(rows)
}

/// Custom-item multi-select; chosen items get a check mark.
pub fn custom_items_keyboard(selected: &[String]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = CUSTOM_ITEMS
        .iter()
        .map(|(key, label)| {
            let mark = if selected.iter().any(|s| s == key) {
                "✅ "
            } else {
                ""
            };
            vec![button(
                format!("{mark}{label}"),
                Callback::WizardItemToggle((*key).to_owned()),
            )]
        })
        .collect();
    rows.push(vec![button("Готово ▶️", Callback::WizardItemsDone)]);
    InlineKeyboardMarkup::new(rows)
}

/// Final wizard confirmation.
pub fn wizard_confirm_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("✅ Создать", Callback::WizardConfirm),
        button("❌ Отмена", Callback::WizardCancel),
    ]])
}

/// Stage list: one stage per row with status icon.
pub fn stage_list_keyboard(stages: &[Stage]) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = stages
        .iter()
        .map(|s| {
            vec![button(
                format!("{} {}. {}", s.status.icon(), s.order, s.name),
                Callback::StageOpen(s.id),
            )]
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

/// Per-stage action menu.
pub fn stage_menu_keyboard(stage_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            button("📅 Дата начала", Callback::StageAction(StageAction::StartDate, stage_id)),
            button("🏁 Дата конца", Callback::StageAction(StageAction::EndDate, stage_id)),
        ],
        vec![
            button("⏱ Длительность", Callback::StageAction(StageAction::Duration, stage_id)),
            button("👤 Ответственный", Callback::StageAction(StageAction::Responsible, stage_id)),
        ],
        vec![
            button("💰 Бюджет", Callback::StageAction(StageAction::Budget, stage_id)),
            button("📋 Подэтапы", Callback::StageAction(StageAction::SubStages, stage_id)),
        ],
        vec![
            button("🔄 Статус", Callback::StageAction(StageAction::Status, stage_id)),
            button("💳 Оплата", Callback::StageAction(StageAction::Payment, stage_id)),
        ],
    ])
}

/// Work-status picker, restricted to allowed transitions.
pub fn stage_status_keyboard(stage: &Stage) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = allowed_status_transitions(stage.status)
        .iter()
        .map(|s| vec![button(s.label(), Callback::StageStatus(*s, stage.id))])
        .collect();
    InlineKeyboardMarkup::new(rows)
}

/// Payment-status picker, restricted to allowed transitions.
pub fn payment_status_keyboard(stage: &Stage) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> =
        allowed_payment_transitions(stage.payment_status)
            .iter()
            .map(|s| vec![button(s.label(), Callback::PaymentStatus(*s, stage.id))])
            .collect();
    InlineKeyboardMarkup::new(rows)
}

/// Approve / reject buttons under a checkpoint notification.
pub fn checkpoint_keyboard(stage_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("✅ Одобрить", Callback::CheckpointApprove(stage_id)),
        button("❌ Отклонить", Callback::CheckpointReject(stage_id)),
    ]])
}

/// Assignable-role picker for /invite.
pub fn invite_role_keyboard() -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = ASSIGNABLE_ROLES
        .iter()
        .map(|r| vec![button(r.label(), Callback::InviteRole(*r))])
        .collect();
    InlineKeyboardMarkup::new(rows)
}

/// Expense-category picker, two per row.
pub fn expense_category_keyboard() -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();
    for pair in BudgetCategory::ALL.chunks(2) {
        rows.push(
            pair.iter()
                .map(|c| button(c.label(), Callback::ExpenseCategory(*c)))
                .collect(),
        );
    }
    InlineKeyboardMarkup::new(rows)
}

/// Confirm buttons for unconfirmed budget items (owner view).
pub fn expense_confirm_keyboard(
    items: &[crate::domain::BudgetItem],
) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = items
        .iter()
        .map(|item| {
            vec![button(
                format!(
                    "✔️ {} — {} ₸",
                    item.description
                        .as_deref()
                        .unwrap_or(item.category.label()),
                    format_amount(item.total())
                ),
                Callback::ExpenseConfirm(item.id),
            )]
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

/// Delete-project confirmation.
pub fn delete_confirm_keyboard(project_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("🗑 Да, удалить", Callback::ProjectDelete(project_id)),
        button("Отмена", Callback::WizardCancel),
    ]])
}

// ---------------------------------------------------------------------------
// Message formatters
// ---------------------------------------------------------------------------

/// Project card for /myprojects and the wizard confirmation.
pub fn format_project_card(project: &Project) -> String {
    let mut lines = vec![format!("🏠 <b>{}</b>", escape_html(&project.name))];
    if let Some(address) = &project.address {
        lines.push(format!("📍 {}", escape_html(address)));
    }
    if let Some(area) = project.area_sqm {
        lines.push(format!("📐 {area} м²"));
    }
    lines.push(format!("🔨 Тип: {}", project.renovation_type.label()));
    if let Some(budget) = project.total_budget {
        lines.push(format!("💰 Бюджет: {} ₸", format_amount(budget)));
    }
    lines.join("\n")
}

/// Detailed stage card shown above the stage menu.
pub fn format_stage_detail(stage: &Stage, sub_stages: &[SubStage]) -> String {
    let mut lines = vec![
        format!(
            "<b>{}. {}</b> {}",
            stage.order,
            escape_html(&stage.name),
            if stage.is_checkpoint { "🔑" } else { "" }
        ),
        format!("Статус: {}", stage.status.label()),
        format!("Оплата: {}", stage.payment_status.label()),
        format!(
            "Сроки: {} — {}",
            format_date(stage.start_date),
            format_date(stage.end_date)
        ),
    ];
    if let Some(resp) = &stage.responsible_contact {
        lines.push(format!("Ответственный: {}", escape_html(resp)));
    }
    if let Some(budget) = stage.budget {
        lines.push(format!("Бюджет: {} ₸", format_amount(budget)));
    }
    if !sub_stages.is_empty() {
        lines.push("\nПодэтапы:".to_owned());
        for sub in sub_stages {
            lines.push(format!(
                "  {} {}",
                sub.status.icon(),
                escape_html(&sub.name)
            ));
        }
    }
    lines.join("\n")
}

/// Status report body.
pub fn format_status_report(report: &StatusReport) -> String {
    let mut lines = vec![
        format!("📊 <b>Статус: {}</b>", escape_html(&report.project_name)),
        format!(
            "Прогресс: {}/{} этапов ({:.0}%)\n",
            report.completed, report.total, report.progress_pct
        ),
    ];
    for line in &report.stages {
        let marker = if line.is_parallel { "∥ " } else { "" };
        let mut row = format!(
            "{} {marker}{}. {}",
            line.status.icon(),
            line.order,
            escape_html(&line.name)
        );
        if line.days_overdue > 0 {
            row.push_str(&format!(" — просрочен на {} дн.", line.days_overdue));
        } else if line.end_date.is_some() {
            row.push_str(&format!(" — до {}", format_date(line.end_date)));
        }
        lines.push(row);
    }
    lines.join("\n")
}

/// Weekly report body.
pub fn format_weekly_report(report: &WeeklyReport) -> String {
    let s = &report.stages_summary;
    let mut lines = vec![
        format!(
            "📅 <b>Еженедельный отчёт: {}</b>\n",
            escape_html(&report.project_name)
        ),
        format!(
            "Этапы: всего {}, ✅ {}, 🔨 {}, ⚠️ {}, 📋 {}",
            s.total, s.completed, s.in_progress, s.delayed, s.planned
        ),
    ];

    if !report.current_stages.is_empty() {
        lines.push("\n<b>Сейчас в работе:</b>".to_owned());
        for stage in &report.current_stages {
            lines.push(format!(
                "  🔨 {} (до {})",
                escape_html(&stage.name),
                format_date(stage.end_date)
            ));
        }
    }
    if !report.overdue_stages.is_empty() {
        lines.push("\n<b>Просрочено:</b>".to_owned());
        for o in &report.overdue_stages {
            lines.push(format!(
                "  ⚠️ {} — {} дн.",
                escape_html(&o.name),
                o.days_overdue
            ));
        }
    }
    if !report.upcoming_stages.is_empty() {
        lines.push("\n<b>Скоро стартуют:</b>".to_owned());
        for u in &report.upcoming_stages {
            lines.push(format!(
                "  📋 {} — через {} дн. ({})",
                escape_html(&u.name),
                u.days_until,
                format_date(u.start_date)
            ));
        }
    }

    lines.push(format!(
        "\n💰 {}",
        escape_html(&report.budget_analysis.message)
    ));
    if !report.category_breakdown.is_empty() {
        lines.push("<b>По категориям:</b>".to_owned());
        for c in &report.category_breakdown {
            lines.push(format!(
                "  {}: {} ₸ ({} зап.)",
                category_label(&c.category),
                format_amount(c.total_spent),
                c.item_count
            ));
        }
    }
    lines.join("\n")
}

/// Budget summary body for /budget.
pub fn format_budget_summary(
    project: &Project,
    categories: &[CategorySummary],
    analysis: &BudgetAnalysis,
    total_spent: f64,
) -> String {
    let mut lines = vec![format!(
        "💰 <b>Бюджет: {}</b>\n",
        escape_html(&project.name)
    )];
    lines.push(format!("Потрачено: {} ₸", format_amount(total_spent)));
    if let Some(budget) = project.total_budget {
        lines.push(format!("Лимит: {} ₸", format_amount(budget)));
    }
    lines.push(escape_html(&analysis.message));

    if !categories.is_empty() {
        lines.push("\n<b>По категориям:</b>".to_owned());
        for c in categories {
            lines.push(format!(
                "  {}: {} ₸ (работы {}, материалы {}, предоплаты {})",
                category_label(&c.category),
                format_amount(c.total_spent),
                format_amount(c.total_work),
                format_amount(c.total_materials),
                format_amount(c.total_prepayments),
            ));
        }
    }
    lines.join("\n")
}

/// Next-stage info body.
pub fn format_next_stage(info: &NextStageInfo) -> String {
    let mut lines = vec![format!(
        "➡️ <b>{}</b>\n",
        escape_html(&info.project_name)
    )];
    match &info.current_stage {
        Some(stage) => {
            lines.push(format!(
                "Сейчас: 🔨 {} (до {})",
                escape_html(&stage.name),
                format_date(stage.end_date)
            ));
        }
        None => lines.push("Сейчас нет этапа в работе.".to_owned()),
    }
    match &info.next_stage {
        Some(stage) => {
            lines.push(format!(
                "Следующий: 📋 {} (с {})",
                escape_html(&stage.name),
                format_date(stage.start_date)
            ));
        }
        None => lines.push("Следующий этап не запланирован.".to_owned()),
    }
    lines.join("\n")
}

/// Deadline report body.
pub fn format_deadline_report(report: &DeadlineReport) -> String {
    let mut lines = vec![format!(
        "⏰ <b>Дедлайны: {}</b>",
        escape_html(&report.project_name)
    )];

    if !report.overdue.is_empty() {
        lines.push("\n<b>Просрочено:</b>".to_owned());
        for o in &report.overdue {
            lines.push(format!(
                "  ⚠️ {} — {} дн. (дедлайн {})",
                escape_html(&o.name),
                o.days_overdue,
                format_date(o.end_date)
            ));
        }
    }
    if !report.due_soon.is_empty() {
        lines.push("\n<b>Ближайшие 3 дня:</b>".to_owned());
        for s in &report.due_soon {
            lines.push(format!(
                "  🔜 {} — до {}",
                escape_html(&s.name),
                format_date(s.end_date)
            ));
        }
    }
    if !report.on_track.is_empty() {
        lines.push("\n<b>В графике:</b>".to_owned());
        for s in &report.on_track {
            lines.push(format!(
                "  ✅ {} — до {}",
                escape_html(&s.name),
                format_date(s.end_date)
            ));
        }
    }
    if report.overdue.is_empty() && report.due_soon.is_empty() && report.on_track.is_empty() {
        lines.push("\nНет этапов с дедлайнами.".to_owned());
    }
    lines.join("\n")
}

/// Team roster for /team.
pub fn format_team(members: &[TeamMember]) -> String {
    let mut lines = vec!["👥 <b>Команда проекта:</b>\n".to_owned()];
    if members.is_empty() {
        lines.push("Пока никого нет. Пригласите участников: /invite".to_owned());
    }
    for member in members {
        let started = if member.user.is_bot_started {
            ""
        } else {
            " ⚠️ (не запустил бота)"
        };
        lines.push(format!(
            "• <b>{}</b> — {}{}",
            escape_html(&member.user.full_name),
            format_role_list(&member.roles),
            started
        ));
    }
    lines.join("\n")
}

/// Label for a category key stored as text (materialized-view reads).
fn category_label(key: &str) -> &'static str {
    BudgetCategory::parse(key)
        .map(|c| c.label())
        .unwrap_or("📦 Прочее")
}

/// Wizard summary before confirmation.
pub fn format_wizard_summary(draft: &crate::telegram::fsm::ProjectDraft) -> String {
    let mut lines = vec!["<b>Проверьте данные проекта:</b>\n".to_owned()];
    lines.push(format!(
        "Название: {}",
        escape_html(draft.name.as_deref().unwrap_or("—"))
    ));
    lines.push(format!(
        "Адрес: {}",
        escape_html(draft.address.as_deref().unwrap_or("—"))
    ));
    lines.push(format!(
        "Площадь: {}",
        draft
            .area_sqm
            .map(|a| format!("{a} м²"))
            .unwrap_or_else(|| "—".to_owned())
    ));
    lines.push(format!(
        "Тип ремонта: {}",
        draft
            .renovation_type
            .map(|t| t.label().to_owned())
            .unwrap_or_else(|| "—".to_owned())
    ));
    lines.push(format!(
        "Бюджет: {}",
        draft
            .total_budget
            .map(|b| format!("{} ₸", format_amount(b)))
            .unwrap_or_else(|| "—".to_owned())
    ));
    if !draft.custom_items.is_empty() {
        let items: Vec<&str> = draft
            .custom_items
            .iter()
            .map(|k| custom_item_label(k))
            .collect();
        lines.push(format!("На заказ: {}", items.join(", ")));
    }
    lines.push("\nБудут созданы 13 стандартных этапов ремонта.".to_owned());
    lines.join("\n")
}
