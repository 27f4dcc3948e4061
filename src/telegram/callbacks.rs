//! Callback-data encoding and inline-button handlers.
//!
//! Payloads are compact, colon-delimited, and stay well under
//! Telegram's 64-byte limit: `stg:<id>`, `bpysts:<status>:<stage_id>`,
//! `prjsel:<project_id>`, ...

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::debug;

use crate::db;
use crate::domain::{BudgetCategory, PaymentStatus, RenovationType, RoleType, StageStatus};
use crate::error::{BotError, Result};
use crate::services::budget as budget_service;
use crate::services::notification as notify;
use crate::services::roles::{self, Permission};
use crate::services::stage::{self as stage_service, CompletionOutcome};
use crate::telegram::context;
use crate::telegram::fsm::{ConvState, StageField};
use crate::telegram::{commands, format, send_html, AppState};

/// Per-stage actions offered from the stage menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageAction {
    /// Set the start date.
    StartDate,
    /// Set the end date.
    EndDate,
    /// Set the duration in days.
    Duration,
    /// Assign the responsible contact.
    Responsible,
    /// Set the stage budget.
    Budget,
    /// Bulk-add sub-stages.
    SubStages,
    /// Open the work-status menu.
    Status,
    /// Open the payment-status menu.
    Payment,
}

impl StageAction {
    fn as_str(&self) -> &'static str {
        match self {
            Self::StartDate => "sd",
            Self::EndDate => "ed",
            Self::Duration => "dur",
            Self::Responsible => "resp",
            Self::Budget => "bud",
            Self::SubStages => "subs",
            Self::Status => "sts",
            Self::Payment => "pay",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "sd" => Some(Self::StartDate),
            "ed" => Some(Self::EndDate),
            "dur" => Some(Self::Duration),
            "resp" => Some(Self::Responsible),
            "bud" => Some(Self::Budget),
            "subs" => Some(Self::SubStages),
            "sts" => Some(Self::Status),
            "pay" => Some(Self::Payment),
            _ => None,
        }
    }
}

/// Every inline-button payload the bot can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum Callback {
    /// Project picked from the private-chat picker.
    ProjectSelect(i64),
    /// Project picked for /link in a group.
    ProjectLink(i64),
    /// Project deletion confirmed.
    ProjectDelete(i64),
    /// Renovation type picked in the wizard.
    WizardType(RenovationType),
    /// Custom item toggled in the wizard multi-select.
    WizardItemToggle(String),
    /// Custom-item selection finished.
    WizardItemsDone,
    /// Wizard confirmed — create the project.
    WizardConfirm,
    /// Wizard cancelled.
    WizardCancel,
    /// Stage opened from the stage list.
    StageOpen(i64),
    /// Stage action chosen from the stage menu.
    StageAction(StageAction, i64),
    /// New work status picked.
    StageStatus(StageStatus, i64),
    /// New payment status picked.
    PaymentStatus(PaymentStatus, i64),
    /// Checkpoint approved by the owner.
    CheckpointApprove(i64),
    /// Checkpoint rejected by the owner.
    CheckpointReject(i64),
    /// Role picked for an invitation.
    InviteRole(RoleType),
    /// Expense category picked.
    ExpenseCategory(BudgetCategory),
    /// Budget item confirmed by the owner.
    ExpenseConfirm(i64),
}

impl Callback {
    /// Encode into the wire payload.
    pub fn encode(&self) -> String {
        match self {
            Self::ProjectSelect(id) => format!("prjsel:{id}"),
            Self::ProjectLink(id) => format!("plink:{id}"),
            Self::ProjectDelete(id) => format!("pdel:{id}"),
            Self::WizardType(t) => format!("ptype:{}", t.as_str()),
            Self::WizardItemToggle(key) => format!("citem:{key}"),
            Self::WizardItemsDone => "cdone".to_owned(),
            Self::WizardConfirm => "pok".to_owned(),
            Self::WizardCancel => "pcancel".to_owned(),
            Self::StageOpen(id) => format!("stg:{id}"),
            Self::StageAction(action, id) => format!("stact:{}:{id}", action.as_str()),
            Self::StageStatus(status, id) => format!("ststs:{}:{id}", status.as_str()),
            Self::PaymentStatus(status, id) => format!("bpysts:{}:{id}", status.as_str()),
            Self::CheckpointApprove(id) => format!("ckap:{id}"),
            Self::CheckpointReject(id) => format!("ckrj:{id}"),
            Self::InviteRole(role) => format!("role:{}", role.as_str()),
            Self::ExpenseCategory(cat) => format!("bcat:{}", cat.as_str()),
            Self::ExpenseConfirm(id) => format!("bconf:{id}"),
        }
    }

    /// Parse a wire payload. Returns `None` for anything unknown —
    /// stale buttons from older versions are answered with a shrug, not
    /// an error.
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.splitn(3, ':');
        let head = parts.next()?;
        match head {
            "prjsel" => Some(Self::ProjectSelect(parts.next()?.parse().ok()?)),
            "plink" => Some(Self::ProjectLink(parts.next()?.parse().ok()?)),
            "pdel" => Some(Self::ProjectDelete(parts.next()?.parse().ok()?)),
            "ptype" => Some(Self::WizardType(
                RenovationType::parse(parts.next()?).ok()?,
            )),
            "citem" => Some(Self::WizardItemToggle(parts.next()?.to_owned())),
            "cdone" => Some(Self::WizardItemsDone),
            "pok" => Some(Self::WizardConfirm),
            "pcancel" => Some(Self::WizardCancel),
            "stg" => Some(Self::StageOpen(parts.next()?.parse().ok()?)),
            "stact" => Some(Self::StageAction(
                StageAction::parse(parts.next()?)?,
                parts.next()?.parse().ok()?,
            )),
            "ststs" => Some(Self::StageStatus(
                StageStatus::parse(parts.next()?).ok()?,
                parts.next()?.parse().ok()?,
            )),
            "bpysts" => Some(Self::PaymentStatus(
                PaymentStatus::parse(parts.next()?).ok()?,
                parts.next()?.parse().ok()?,
            )),
            "ckap" => Some(Self::CheckpointApprove(parts.next()?.parse().ok()?)),
            "ckrj" => Some(Self::CheckpointReject(parts.next()?.parse().ok()?)),
            "role" => Some(Self::InviteRole(RoleType::parse(parts.next()?).ok()?)),
            "bcat" => Some(Self::ExpenseCategory(
                BudgetCategory::parse(parts.next()?).ok()?,
            )),
            "bconf" => Some(Self::ExpenseConfirm(parts.next()?.parse().ok()?)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Callback execution
// ---------------------------------------------------------------------------

/// Route one inline-button callback.
pub async fn process_callback(bot: &Bot, query: &CallbackQuery, state: &AppState) -> Result<()> {
    let Some(data) = query.data.as_deref() else {
        answer(bot, query, None).await?;
        return Ok(());
    };
    let Some(callback) = Callback::parse(data) else {
        debug!(data, "unknown callback payload");
        answer(bot, query, Some("Кнопка устарела")).await?;
        return Ok(());
    };

    let telegram_user_id = i64::try_from(query.from.id.0).unwrap_or(0);
    let Some(user) = context::resolve_user(&state.db, telegram_user_id).await? else {
        answer(bot, query, Some("Отправьте /start сначала")).await?;
        return Ok(());
    };

    let chat_id = query
        .message
        .as_ref()
        .map(|m| m.chat().id)
        .unwrap_or(ChatId(telegram_user_id));
    let key = (chat_id.0, user.id);

    match callback {
        Callback::ProjectSelect(project_id) => {
            let Some(conv) = state.fsm.get(key).await else {
                answer(bot, query, Some("Выбор устарел")).await?;
                return Ok(());
            };
            let ConvState::ProjectPicker { intent } = conv.state else {
                answer(bot, query, Some("Выбор устарел")).await?;
                return Ok(());
            };
            let pending = conv.data.pending_text.clone();
            state.fsm.clear(key).await;

            let project = db::projects::get_project(&state.db, project_id)
                .await?
                .ok_or_else(|| BotError::NotFound("Проект не найден".to_owned()))?;
            answer(bot, query, None).await?;
            commands::execute_intent(bot, state, chat_id, &user, &project, &intent, pending)
                .await?;
        }
        Callback::ProjectLink(project_id) => {
            db::projects::link_telegram_chat(&state.db, project_id, chat_id.0).await?;
            db::cache::cache_invalidate(&state.db, &format!("project:chat:{}", chat_id.0))
                .await?;
            let project = db::projects::get_project(&state.db, project_id)
                .await?
                .ok_or_else(|| BotError::NotFound("Проект не найден".to_owned()))?;
            answer(bot, query, None).await?;
            send_html(
                bot,
                chat_id,
                format!(
                    "🔗 Группа привязана к проекту «{}». Теперь команды и вопросы \
                     в этой группе относятся к нему.",
                    format::escape_html(&project.name)
                ),
            )
            .await?;
        }
        Callback::ProjectDelete(project_id) => {
            crate::services::project::delete_project(&state.db, project_id, user.id).await?;
            answer(bot, query, Some("Проект удалён")).await?;
            send_html(bot, chat_id, "🗑 Проект деактивирован.").await?;
        }

        // --- Project creation wizard -----------------------------------
        Callback::WizardType(renovation_type) => {
            state
                .fsm
                .update_data(key, |data| {
                    data.draft.renovation_type = Some(renovation_type);
                })
                .await;
            state.fsm.set_state(key, ConvState::ProjectBudget).await;
            answer(bot, query, None).await?;
            send_html(
                bot,
                chat_id,
                "💰 Общий бюджет в тенге? (число или «-», чтобы пропустить)",
            )
            .await?;
        }
        Callback::WizardItemToggle(item_key) => {
            state
                .fsm
                .update_data(key, |data| {
                    if let Some(pos) =
                        data.draft.custom_items.iter().position(|k| *k == item_key)
                    {
                        data.draft.custom_items.remove(pos);
                    } else {
                        data.draft.custom_items.push(item_key);
                    }
                })
                .await;
            let selected = state
                .fsm
                .get(key)
                .await
                .map(|c| c.data.draft.custom_items)
                .unwrap_or_default();
            answer(bot, query, None).await?;
            if let Some(message) = query.message.as_ref() {
                let _ = bot
                    .edit_message_reply_markup(chat_id, message.id())
                    .reply_markup(format::custom_items_keyboard(&selected))
                    .await;
            }
        }
        Callback::WizardItemsDone => {
            let Some(conv) = state.fsm.get(key).await else {
                answer(bot, query, Some("Мастер уже завершён")).await?;
                return Ok(());
            };
            state.fsm.set_state(key, ConvState::ProjectConfirm).await;
            answer(bot, query, None).await?;
            bot.send_message(chat_id, format::format_wizard_summary(&conv.data.draft))
                .parse_mode(ParseMode::Html)
                .reply_markup(format::wizard_confirm_keyboard())
                .await
                .map_err(|e| BotError::Upstream(e.to_string()))?;
        }
        Callback::WizardConfirm => {
            answer(bot, query, None).await?;
            commands::finish_wizard(bot, chat_id, state, key, &user).await?;
        }
        Callback::WizardCancel => {
            state.fsm.clear(key).await;
            answer(bot, query, Some("Отменено")).await?;
            send_html(bot, chat_id, "Действие отменено.").await?;
        }

        // --- Stage configuration ---------------------------------------
        Callback::StageOpen(stage_id) => {
            let stage = db::stages::require_stage(&state.db, stage_id).await?;
            require_stage_permission(state, &user, stage.project_id, Permission::ViewStages)
                .await?;
            let subs = db::stages::get_sub_stages(&state.db, stage_id).await?;
            answer(bot, query, None).await?;
            bot.send_message(chat_id, format::format_stage_detail(&stage, &subs))
                .parse_mode(ParseMode::Html)
                .reply_markup(format::stage_menu_keyboard(stage_id))
                .await
                .map_err(|e| BotError::Upstream(e.to_string()))?;
        }
        Callback::StageAction(action, stage_id) => {
            let stage = db::stages::require_stage(&state.db, stage_id).await?;
            let (field, prompt) = match action {
                StageAction::StartDate => (
                    Some(StageField::StartDate),
                    "📅 Дата начала? (например 15.03.2026)",
                ),
                StageAction::EndDate => (
                    Some(StageField::EndDate),
                    "🏁 Дата завершения? (например 20.03.2026)",
                ),
                StageAction::Duration => (
                    Some(StageField::Duration),
                    "⏱ Длительность в днях? (число от 1 до 365)",
                ),
                StageAction::Responsible => (
                    Some(StageField::Responsible),
                    "👤 Кто ответственный? (имя и контакт)",
                ),
                StageAction::Budget => {
                    (Some(StageField::Budget), "💰 Бюджет этапа в тенге?")
                }
                StageAction::SubStages => (
                    Some(StageField::SubStages),
                    "📋 Отправьте подэтапы — по одному в строке.",
                ),
                StageAction::Status | StageAction::Payment => (None, ""),
            };

            match field {
                Some(field) => {
                    require_stage_permission(
                        state,
                        &user,
                        stage.project_id,
                        if field == StageField::SubStages {
                            Permission::AddSubStages
                        } else {
                            Permission::EditStage
                        },
                    )
                    .await?;
                    state
                        .fsm
                        .start(key, ConvState::StageInput { stage_id, field })
                        .await;
                    answer(bot, query, None).await?;
                    send_html(bot, chat_id, prompt).await?;
                }
                None if action == StageAction::Status => {
                    require_stage_permission(
                        state,
                        &user,
                        stage.project_id,
                        Permission::UpdateStatus,
                    )
                    .await?;
                    answer(bot, query, None).await?;
                    bot.send_message(
                        chat_id,
                        format!("Статус «{}»:", format::escape_html(&stage.name)),
                    )
                    .parse_mode(ParseMode::Html)
                    .reply_markup(format::stage_status_keyboard(&stage))
                    .await
                    .map_err(|e| BotError::Upstream(e.to_string()))?;
                }
                None => {
                    require_stage_permission(
                        state,
                        &user,
                        stage.project_id,
                        Permission::EditBudget,
                    )
                    .await?;
                    answer(bot, query, None).await?;
                    let mut text =
                        format!("Оплата «{}»:", format::escape_html(&stage.name));
                    if let Some(risk) =
                        budget_service::check_payment_risk(stage.status, stage.payment_status)
                    {
                        text.push_str(&format!("\n\n{}", format::escape_html(risk)));
                    }
                    bot.send_message(chat_id, text)
                        .parse_mode(ParseMode::Html)
                        .reply_markup(format::payment_status_keyboard(&stage))
                        .await
                        .map_err(|e| BotError::Upstream(e.to_string()))?;
                }
            }
        }
        Callback::StageStatus(status, stage_id) => {
            let stage = db::stages::require_stage(&state.db, stage_id).await?;
            require_stage_permission(state, &user, stage.project_id, Permission::UpdateStatus)
                .await?;

            let (updated, outcome) =
                stage_service::change_status(&state.db, stage_id, status, user.id).await?;
            answer(bot, query, None).await?;

            let mut reply = format!(
                "{} «{}» — {}",
                updated.status.icon(),
                format::escape_html(&updated.name),
                updated.status.label()
            );

            match outcome {
                Some(CompletionOutcome::CheckpointPending) => {
                    reply.push_str(&format!(
                        "\n\n🔑 Контрольная точка!\n{}\nОжидается одобрение владельца.",
                        format::escape_html(stage_service::checkpoint_description(&updated.name))
                    ));
                    notify_checkpoint_reached(state, &updated).await?;
                }
                Some(CompletionOutcome::Advanced(next)) => {
                    reply.push_str(&format!(
                        "\n➡️ Следующий этап в работе: «{}»",
                        format::escape_html(&next.name)
                    ));
                }
                Some(CompletionOutcome::Finished) | None => {}
            }

            send_html(bot, chat_id, reply).await?;
        }
        Callback::PaymentStatus(status, stage_id) => {
            let stage = db::stages::require_stage(&state.db, stage_id).await?;
            require_stage_permission(state, &user, stage.project_id, Permission::EditBudget)
                .await?;
            let updated =
                budget_service::transition_payment_status(&state.db, &stage, status, user.id)
                    .await?;
            answer(bot, query, None).await?;
            let mut reply = format!(
                "💳 Оплата «{}»: {}",
                format::escape_html(&updated.name),
                updated.payment_status.label()
            );
            if let Some(risk) =
                budget_service::check_payment_risk(updated.status, updated.payment_status)
            {
                reply.push_str(&format!("\n\n{}", format::escape_html(risk)));
            }
            send_html(bot, chat_id, reply).await?;
        }

        // --- Checkpoints ------------------------------------------------
        Callback::CheckpointApprove(stage_id) => {
            let stage = db::stages::require_stage(&state.db, stage_id).await?;
            require_stage_permission(
                state,
                &user,
                stage.project_id,
                Permission::ApproveCheckpoint,
            )
            .await?;
            let next = stage_service::approve_checkpoint(&state.db, stage_id, user.id).await?;
            answer(bot, query, Some("Одобрено")).await?;

            let mut reply = format!(
                "✅ Контрольная точка «{}» одобрена.",
                format::escape_html(&stage.name)
            );
            if let Some(next) = &next {
                reply.push_str(&format!(
                    "\n➡️ Следующий этап в работе: «{}»",
                    format::escape_html(&next.name)
                ));
            }
            send_html(bot, chat_id, reply).await?;
            notify_checkpoint_verdict(state, &stage, true).await?;
        }
        Callback::CheckpointReject(stage_id) => {
            let stage = db::stages::require_stage(&state.db, stage_id).await?;
            require_stage_permission(
                state,
                &user,
                stage.project_id,
                Permission::ApproveCheckpoint,
            )
            .await?;
            stage_service::reject_checkpoint(&state.db, stage_id, user.id).await?;
            answer(bot, query, Some("Отклонено")).await?;
            send_html(
                bot,
                chat_id,
                format!(
                    "❌ Контрольная точка «{}» отклонена. Этап возвращён на доработку.",
                    format::escape_html(&stage.name)
                ),
            )
            .await?;
            notify_checkpoint_verdict(state, &stage, false).await?;
        }

        // --- Invitations & expenses ------------------------------------
        Callback::InviteRole(role) => {
            let Some(conv) = state.fsm.get(key).await else {
                answer(bot, query, Some("Выбор устарел")).await?;
                return Ok(());
            };
            let ConvState::InviteRole { project_id } = conv.state else {
                answer(bot, query, Some("Выбор устарел")).await?;
                return Ok(());
            };
            state
                .fsm
                .set_state(key, ConvState::InviteContact { role, project_id })
                .await;
            answer(bot, query, None).await?;
            send_html(
                bot,
                chat_id,
                format!(
                    "Роль: {}.\nОтправьте имя (и телефон) участника, \
                     например: <code>Иван Петров +77001234567</code>",
                    role.label()
                ),
            )
            .await?;
        }
        Callback::ExpenseCategory(category) => {
            let Some(conv) = state.fsm.get(key).await else {
                answer(bot, query, Some("Выбор устарел")).await?;
                return Ok(());
            };
            let ConvState::ExpenseCategory { project_id } = conv.state else {
                answer(bot, query, Some("Выбор устарел")).await?;
                return Ok(());
            };
            state
                .fsm
                .set_state(key, ConvState::ExpenseAmounts {
                    project_id,
                    category,
                })
                .await;
            answer(bot, query, None).await?;
            send_html(
                bot,
                chat_id,
                format!(
                    "{} — введите суммы: <code>работы [материалы] [предоплата]</code> \
                     и описание, например:\n<code>50000 30000 0 плитка для ванной</code>",
                    category.label()
                ),
            )
            .await?;
        }
        Callback::ExpenseConfirm(item_id) => {
            let item = db::budget::get_budget_item(&state.db, item_id)
                .await?
                .ok_or_else(|| BotError::NotFound("Запись расхода не найдена".to_owned()))?;
            require_stage_permission(state, &user, item.project_id, Permission::ConfirmBudget)
                .await?;
            budget_service::confirm_expense(&state.db, item_id, user.id).await?;
            answer(bot, query, Some("Подтверждено")).await?;
        }
    }
    Ok(())
}

/// Check a permission against the user's roles in a project.
async fn require_stage_permission(
    state: &AppState,
    user: &crate::domain::User,
    project_id: i64,
    permission: Permission,
) -> Result<()> {
    let user_roles =
        db::projects::get_user_roles_in_project(&state.db, user.id, project_id).await?;
    roles::require_permission(&user_roles, permission)
}

/// Acknowledge the callback so the button stops spinning.
async fn answer(bot: &Bot, query: &CallbackQuery, text: Option<&str>) -> Result<()> {
    let mut request = bot.answer_callback_query(&query.id);
    if let Some(text) = text {
        request = request.text(text.to_owned());
    }
    request
        .await
        .map_err(|e| BotError::Upstream(e.to_string()))?;
    Ok(())
}

/// Notify owners that a checkpoint awaits approval, with inline
/// approve/reject buttons attached by the supervisor.
async fn notify_checkpoint_reached(state: &AppState, stage: &crate::domain::Stage) -> Result<()> {
    let Some(project) = db::projects::get_project(&state.db, stage.project_id).await? else {
        return Ok(());
    };
    let owner_ids = db::projects::get_project_owner_ids(&state.db, project.id).await?;
    let notification = notify::build_checkpoint_reached(
        project.id,
        &project.name,
        stage.id,
        &stage.name,
        owner_ids,
    );
    state.supervisor.deliver(&notification).await
}

/// Notify the team about a checkpoint verdict.
async fn notify_checkpoint_verdict(
    state: &AppState,
    stage: &crate::domain::Stage,
    approved: bool,
) -> Result<()> {
    let Some(project) = db::projects::get_project(&state.db, stage.project_id).await? else {
        return Ok(());
    };
    let kind = if approved {
        notify::NotificationType::CheckpointApproved
    } else {
        notify::NotificationType::CheckpointRejected
    };
    let recipients =
        db::projects::get_project_role_user_ids(&state.db, project.id, kind.recipient_roles())
            .await?;
    let notification = notify::build_checkpoint_verdict(
        approved,
        project.id,
        &project.name,
        stage.id,
        &stage.name,
        recipients,
    );
    state.supervisor.deliver(&notification).await
}
