//! Command dispatch and multi-step conversation handlers.
//!
//! `process_message` is the single entry point for inbound messages:
//! mention gate → context resolution → command / FSM / quick-command /
//! media / plain-text routing. Silent (undirected) group messages are
//! stored and indexed without any reply.

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{debug, info};

use crate::ai::{chat as ai_chat, ingest, participants, rag};
use crate::db;
use crate::domain::{MessageType, Project, RenovationType, User};
use crate::error::{BotError, Result};
use crate::services::budget::{self, parse_amount, NewExpense};
use crate::services::notification as notify;
use crate::services::project::{create_renovation_project, NewProject};
use crate::services::report::{self, QuickCommand};
use crate::services::roles::{self, Permission};
use crate::services::stage as stage_service;
use crate::telegram::context::{self, RequestCtx};
use crate::telegram::fsm::{ConvState, Conversation, StageField};
use crate::telegram::gate::{self, GateDecision};
use crate::telegram::resolver::resolve_project;
use crate::telegram::{format, media, send_html, AppState};

/// Reply for text the bot cannot route.
const UNRECOGNISED: &str =
    "Не понял команду. Посмотрите /help или задайте вопрос через /ask.";

/// Route one inbound message.
pub async fn process_message(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;
    let is_group = msg.chat.is_group() || msg.chat.is_supergroup();
    let telegram_user_id = i64::try_from(from.id.0).unwrap_or(0);

    let gate_view = gate::gate_input(msg, state.bot_user_id);
    let decision = gate::evaluate(
        &gate_view,
        state.config.mention_gate_enabled,
        &state.bot_username,
        state.bot_user_id,
        &state.gate_patterns,
    );

    let ctx = context::resolve(&state.db, telegram_user_id, chat_id.0, is_group).await?;

    // Undirected group message: no reply, but store and index it so
    // retrieval sees the whole group conversation.
    if decision == GateDecision::Silent {
        store_incoming(msg, state, &ctx, None).await?;
        return Ok(());
    }

    let text = msg
        .text()
        .or_else(|| msg.caption())
        .unwrap_or_default()
        .trim()
        .to_owned();

    // Explicit commands.
    if let Some(stripped) = text.strip_prefix('/') {
        return dispatch_command(bot, msg, state, &ctx, stripped).await;
    }

    // Voice and photo messages: transcribe / describe, store, reply.
    if msg.voice().is_some() || msg.photo().is_some() {
        return handle_media_message(bot, msg, state, &ctx).await;
    }

    // Multi-step flows.
    if let Some(user) = ctx.user.clone() {
        let key = (chat_id.0, user.id);
        if let Some(conversation) = state.fsm.get(key).await {
            return handle_fsm_input(bot, msg, state, &ctx, &user, conversation, &text).await;
        }
    }

    // Bilingual quick commands sent as plain text.
    if let Some(quick) = report::parse_quick_command(&text) {
        store_incoming(msg, state, &ctx, None).await?;
        return dispatch_quick_command(bot, msg, state, &ctx, quick).await;
    }

    // Plain text: always ingest; directed group text gets a RAG answer.
    let stored = store_incoming(msg, state, &ctx, None).await?;
    if is_group && !text.is_empty() {
        let question = gate::strip_leading_mention(&text, &state.bot_username);
        if !question.is_empty() {
            if let (Some(project), Some(_)) = (&ctx.project, &stored) {
                let answer =
                    rag::ask_project(&state.db, &state.ai, &state.skills, project, &question)
                        .await?;
                send_html(bot, chat_id, format::escape_html(&answer)).await?;
                return Ok(());
            }
        }
    }

    if !is_group && !text.is_empty() {
        send_html(bot, chat_id, UNRECOGNISED).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

/// Store a message row (and its embedding) for this update.
///
/// Private chats without a resolvable project still store the message
/// with `project_id = NULL`; it can be linked and backfilled later.
async fn store_incoming(
    msg: &Message,
    state: &AppState,
    ctx: &RequestCtx,
    transcribed: Option<(MessageType, String, String)>,
) -> Result<Option<i64>> {
    let project_id = match &ctx.project {
        Some(project) => Some(project.id),
        // Private chat: best-effort — the user's newest project.
        None => match &ctx.user {
            Some(user) => {
                db::projects::get_user_projects(&state.db, user.id, state.tenant_id)
                    .await?
                    .first()
                    .map(|p| p.id)
            }
            None => None,
        },
    };

    let raw_text = msg
        .text()
        .or_else(|| msg.caption())
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty());

    let (message_type, file_ref, transcribed_text) = match transcribed {
        Some((kind, file_ref, text)) => (kind, Some(file_ref), Some(text)),
        None if msg.voice().is_some() => (
            MessageType::Voice,
            msg.voice().map(|v| v.file.id.clone()),
            None,
        ),
        None if msg.photo().is_some() => (
            MessageType::Image,
            msg.photo().and_then(|p| p.last()).map(|p| p.file.id.clone()),
            None,
        ),
        None => (MessageType::Text, None, None),
    };

    if raw_text.is_none() && transcribed_text.is_none() && file_ref.is_none() {
        return Ok(None);
    }

    let record = ingest::store_and_embed(
        &state.db,
        &state.ai,
        ingest::IncomingMessage {
            project_id,
            user_id: ctx.user.as_ref().map(|u| u.id),
            platform: "telegram".to_owned(),
            platform_chat_id: msg.chat.id.0.to_string(),
            platform_message_id: Some(msg.id.0.to_string()),
            message_type,
            raw_text,
            file_ref,
            transcribed_text,
        },
    )
    .await?;
    Ok(Some(record.id))
}

/// Voice / photo: download, run STT or vision, store, acknowledge.
async fn handle_media_message(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    ctx: &RequestCtx,
) -> Result<()> {
    let processed = if let Some(voice) = msg.voice() {
        media::process_voice(bot, &state.ai, voice).await
    } else if let Some(photos) = msg.photo() {
        media::process_photo(bot, &state.ai, photos, msg.caption()).await
    } else {
        return Ok(());
    };

    match processed {
        Ok(done) => {
            store_incoming(
                msg,
                state,
                ctx,
                Some((done.message_type, done.file_ref.clone(), done.text.clone())),
            )
            .await?;
            let ack = match done.message_type {
                MessageType::Voice => format!("🎙 Распознано: {}", format::escape_html(&done.text)),
                _ => format!("🖼 {}", format::escape_html(&done.text)),
            };
            send_html(bot, msg.chat.id, ack).await?;
        }
        Err(BotError::Configuration(_)) => {
            // No AI: store the raw reference so nothing is lost.
            store_incoming(msg, state, ctx, None).await?;
            send_html(
                bot,
                msg.chat.id,
                "Сообщение сохранено. Распознавание недоступно: AI-сервис не настроен.",
            )
            .await?;
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Parse and dispatch a slash command (leading `/` already stripped).
async fn dispatch_command(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    ctx: &RequestCtx,
    stripped: &str,
) -> Result<()> {
    let (full_command, args) = match stripped.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (stripped, ""),
    };
    // Strip "@bot_name" suffixes like "/stages@remobot".
    let command = full_command.split('@').next().unwrap_or(full_command);

    // If the command is addressed to a different bot in the group, stay
    // quiet.
    if let Some((_, target)) = full_command.split_once('@') {
        if !target.eq_ignore_ascii_case(&state.bot_username) {
            return Ok(());
        }
    }

    let chat_id = msg.chat.id;
    let is_group = msg.chat.is_group() || msg.chat.is_supergroup();

    debug!(command, is_group, "command received");

    // Commands that work without registration.
    match command {
        "start" => return cmd_start(bot, msg, state).await,
        "help" => return cmd_help(bot, chat_id).await,
        "addbot" | "listbots" | "removebot" => {
            return super::admin::dispatch_admin(bot, msg, state, command, args).await;
        }
        _ => {}
    }

    let Some(user) = ctx.user.clone() else {
        send_html(
            bot,
            chat_id,
            "❌ Вы не зарегистрированы. Отправьте /start сначала.",
        )
        .await?;
        return Ok(());
    };

    match command {
        "cancel" => {
            state.fsm.clear((chat_id.0, user.id)).await;
            send_html(bot, chat_id, "Действие отменено.").await?;
        }
        "newproject" => cmd_newproject(bot, chat_id, state, &user).await?,
        "myprojects" => cmd_myprojects(bot, chat_id, state, &user).await?,
        "link" => cmd_link(bot, msg, state, &user).await?,
        // Everything project-scoped goes through the resolver so the
        // picker / "/link" / "create one" replies are uniform.
        "stages" | "launch" | "budget" | "expenses" | "report" | "status" | "nextstage"
        | "deadline" | "mystage" | "team" | "invite" | "myrole" | "deleteproject" | "chat"
        | "summary" | "backfill" => {
            let resolved = resolve_project(bot, state, chat_id, is_group, &user, command, None)
                .await?;
            if let Some(resolved) = resolved {
                execute_intent(bot, state, chat_id, &user, &resolved.project, command, None)
                    .await?;
            }
        }
        "ask" => {
            if args.is_empty() {
                send_html(
                    bot,
                    chat_id,
                    "❓ <b>Задайте вопрос</b>\n\nИспользование: /ask &lt;ваш вопрос&gt;\n\
                     Пример: /ask Какой бюджет на электрику?",
                )
                .await?;
                return Ok(());
            }
            let resolved = resolve_project(
                bot,
                state,
                chat_id,
                is_group,
                &user,
                "ask",
                Some(args.to_owned()),
            )
            .await?;
            if let Some(resolved) = resolved {
                execute_intent(
                    bot,
                    state,
                    chat_id,
                    &user,
                    &resolved.project,
                    "ask",
                    Some(args.to_owned()),
                )
                .await?;
            }
        }
        other => {
            debug!(command = other, "unknown command");
            send_html(bot, chat_id, UNRECOGNISED).await?;
        }
    }
    Ok(())
}

/// Map a plain-text quick command onto the regular intents.
async fn dispatch_quick_command(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    ctx: &RequestCtx,
    quick: QuickCommand,
) -> Result<()> {
    let intent = match quick {
        QuickCommand::Budget => "budget",
        QuickCommand::Stages => "stages",
        QuickCommand::Expenses => "expenses",
        QuickCommand::Report => "report",
        QuickCommand::NextStage => "nextstage",
        QuickCommand::MyStage => "mystage",
        QuickCommand::Status => "status",
        QuickCommand::Deadline => "deadline",
        QuickCommand::Expert => {
            send_html(
                bot,
                msg.chat.id,
                "🔍 Для вызова эксперта напишите владельцу проекта — \
                 контакты в /team.",
            )
            .await?;
            return Ok(());
        }
    };

    let Some(user) = ctx.user.clone() else {
        send_html(
            bot,
            msg.chat.id,
            "❌ Вы не зарегистрированы. Отправьте /start сначала.",
        )
        .await?;
        return Ok(());
    };
    let is_group = msg.chat.is_group() || msg.chat.is_supergroup();
    let resolved =
        resolve_project(bot, state, msg.chat.id, is_group, &user, intent, None).await?;
    if let Some(resolved) = resolved {
        execute_intent(bot, state, msg.chat.id, &user, &resolved.project, intent, None).await?;
    }
    Ok(())
}

/// Execute a project-scoped intent. Shared by direct dispatch and by
/// the project-picker callback, which re-enters here with the chosen
/// project and the stashed command argument.
pub async fn execute_intent(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    user: &User,
    project: &Project,
    intent: &str,
    pending_text: Option<String>,
) -> Result<()> {
    let roles = db::projects::get_user_roles_in_project(&state.db, user.id, project.id).await?;

    match intent {
        "stages" => {
            roles::require_permission(&roles, Permission::ViewStages)?;
            let stages = db::stages::get_stages_for_project(&state.db, project.id).await?;
            bot.send_message(
                chat_id,
                format!("📋 <b>Этапы: {}</b>", format::escape_html(&project.name)),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(format::stage_list_keyboard(&stages))
            .await
            .map_err(|e| BotError::Upstream(e.to_string()))?;
        }
        "launch" => {
            roles::require_permission(&roles, Permission::LaunchProject)?;
            let check = stage_service::launch_project(&state.db, project.id, user.id).await?;
            let mut reply = format!(
                "🚀 Проект «{}» запущен! Первый этап в работе.",
                format::escape_html(&project.name)
            );
            if !check.warnings.is_empty() {
                reply.push_str("\n\n⚠️ Обратите внимание:");
                for warning in &check.warnings {
                    reply.push_str(&format!("\n• {}", format::escape_html(warning)));
                }
            }
            send_html(bot, chat_id, reply).await?;
        }
        "budget" => {
            roles::require_permission(&roles, Permission::ViewBudget)?;
            let mut categories =
                db::cache::get_cached_budget_summary(&state.db, project.id).await?;
            if categories.is_empty() {
                categories = db::budget::get_category_summaries(&state.db, project.id).await?;
            }
            let totals = budget::project_totals(&state.db, project.id).await?;
            let analysis = budget::analyze_budget(project.total_budget, totals.total_spent);
            send_html(
                bot,
                chat_id,
                format::format_budget_summary(project, &categories, &analysis, totals.total_spent),
            )
            .await?;

            // Owners get confirm buttons for pending entries.
            if roles::has_permission(&roles, Permission::ConfirmBudget) {
                let pending: Vec<_> = db::budget::get_budget_items(&state.db, project.id)
                    .await?
                    .into_iter()
                    .filter(|item| !item.is_confirmed)
                    .take(5)
                    .collect();
                if !pending.is_empty() {
                    bot.send_message(chat_id, "Неподтверждённые расходы:")
                        .reply_markup(format::expense_confirm_keyboard(&pending))
                        .await
                        .map_err(|e| BotError::Upstream(e.to_string()))?;
                }
            }
        }
        "expenses" => {
            roles::require_permission(&roles, Permission::EditBudget)?;
            state
                .fsm
                .start(
                    (chat_id.0, user.id),
                    ConvState::ExpenseCategory {
                        project_id: project.id,
                    },
                )
                .await;
            bot.send_message(chat_id, "Выберите категорию расхода:")
                .reply_markup(format::expense_category_keyboard())
                .await
                .map_err(|e| BotError::Upstream(e.to_string()))?;
        }
        "report" => {
            roles::require_permission(&roles, Permission::ViewReports)?;
            let report = build_weekly(state, project).await?;
            send_html(bot, chat_id, format::format_weekly_report(&report)).await?;
        }
        "status" => {
            roles::require_permission(&roles, Permission::ViewStages)?;
            let stages = db::stages::get_stages_for_project(&state.db, project.id).await?;
            let report =
                report::build_status_report(&project.name, &stages, chrono::Utc::now());
            send_html(bot, chat_id, format::format_status_report(&report)).await?;
        }
        "nextstage" => {
            roles::require_permission(&roles, Permission::ViewStages)?;
            let current = db::stages::get_current_main_stage(&state.db, project.id).await?;
            let next = match &current {
                Some(stage) => {
                    db::stages::get_next_main_stage(&state.db, project.id, stage.order).await?
                }
                None => db::stages::get_next_main_stage(&state.db, project.id, 0).await?,
            };
            let info = report::NextStageInfo {
                project_name: project.name.clone(),
                current_stage: current,
                next_stage: next,
            };
            send_html(bot, chat_id, format::format_next_stage(&info)).await?;
        }
        "deadline" => {
            roles::require_permission(&roles, Permission::ViewStages)?;
            let stages = db::stages::get_stages_for_project(&state.db, project.id).await?;
            let report =
                report::build_deadline_report(&project.name, &stages, chrono::Utc::now());
            send_html(bot, chat_id, format::format_deadline_report(&report)).await?;
        }
        "mystage" => {
            roles::require_permission(&roles, Permission::ViewMyStage)?;
            let stages =
                db::stages::get_stages_for_responsible(&state.db, project.id, user.id).await?;
            if stages.is_empty() {
                send_html(bot, chat_id, "За вами не закреплено ни одного этапа.").await?;
            } else {
                let mut lines = vec!["🔧 <b>Ваши этапы:</b>".to_owned()];
                for stage in &stages {
                    lines.push(format!(
                        "{} {}. {} (до {})",
                        stage.status.icon(),
                        stage.order,
                        format::escape_html(&stage.name),
                        stage_service::format_date(stage.end_date)
                    ));
                }
                send_html(bot, chat_id, lines.join("\n")).await?;
            }
        }
        "team" => {
            let members = db::projects::get_project_team(&state.db, project.id).await?;
            send_html(bot, chat_id, format::format_team(&members)).await?;
        }
        "myrole" => {
            let reply = if roles.is_empty() {
                "У вас нет роли в этом проекте.".to_owned()
            } else {
                format!("Ваши роли: {}", roles::format_role_list(&roles))
            };
            send_html(bot, chat_id, reply).await?;
        }
        "invite" => {
            roles::require_permission(&roles, Permission::InviteMember)?;
            state
                .fsm
                .start(
                    (chat_id.0, user.id),
                    ConvState::InviteRole {
                        project_id: project.id,
                    },
                )
                .await;
            bot.send_message(chat_id, "Какую роль назначить участнику?")
                .reply_markup(format::invite_role_keyboard())
                .await
                .map_err(|e| BotError::Upstream(e.to_string()))?;
        }
        "deleteproject" => {
            roles::require_permission(&roles, Permission::CloseProject)?;
            bot.send_message(
                chat_id,
                format!(
                    "Удалить проект «{}»? Этапы и бюджет станут недоступны.",
                    format::escape_html(&project.name)
                ),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(format::delete_confirm_keyboard(project.id))
            .await
            .map_err(|e| BotError::Upstream(e.to_string()))?;
        }
        "ask" => {
            let question = pending_text.unwrap_or_default();
            if question.is_empty() {
                send_html(bot, chat_id, "❓ Использование: /ask &lt;вопрос&gt;").await?;
                return Ok(());
            }
            let thinking = bot
                .send_message(chat_id, "🤔 Анализирую...")
                .await
                .map_err(|e| BotError::Upstream(e.to_string()))?;
            let answer =
                rag::ask_project(&state.db, &state.ai, &state.skills, project, &question).await?;
            let reply = format!("🤖 <b>Ответ:</b>\n\n{}", format::escape_html(&answer));
            if bot
                .edit_message_text(chat_id, thinking.id, reply.clone())
                .parse_mode(ParseMode::Html)
                .await
                .is_err()
            {
                send_html(bot, chat_id, reply).await?;
            }
        }
        "chat" => {
            roles::require_permission(&roles, Permission::UseAiChat)?;
            state
                .fsm
                .start(
                    (chat_id.0, user.id),
                    ConvState::AiChat {
                        project_id: project.id,
                    },
                )
                .await;
            send_html(
                bot,
                chat_id,
                "💬 Диалог с ассистентом начат. Задавайте вопросы о проекте.\n\
                 Для выхода отправьте /cancel.",
            )
            .await?;
        }
        "summary" => {
            roles::require_permission(&roles, Permission::UseAiChat)?;
            let summaries =
                participants::summarize_all_participants(&state.db, &state.ai, &state.skills, project.id)
                    .await?;
            if summaries.is_empty() {
                send_html(bot, chat_id, "В проекте ещё нет сообщений участников.").await?;
            } else {
                let mut parts = Vec::new();
                for s in &summaries {
                    parts.push(format!(
                        "👤 <b>{}</b> ({} сообщ.)\n{}",
                        format::escape_html(&s.user_name),
                        s.message_count,
                        format::escape_html(&s.summary)
                    ));
                }
                send_html(bot, chat_id, parts.join("\n\n")).await?;
            }
        }
        "backfill" => {
            roles::require_permission(&roles, Permission::EditProject)?;
            let indexed = ingest::backfill_project(&state.db, &state.ai, project.id, 500).await?;
            send_html(
                bot,
                chat_id,
                format!("📚 Проиндексировано сообщений: {indexed}"),
            )
            .await?;
        }
        other => {
            debug!(intent = other, "unknown intent");
            send_html(bot, chat_id, UNRECOGNISED).await?;
        }
    }
    Ok(())
}

/// Assemble the weekly report for a project.
pub async fn build_weekly(state: &AppState, project: &Project) -> Result<report::WeeklyReport> {
    let stages = db::stages::get_stages_for_project(&state.db, project.id).await?;
    let totals = budget::project_totals(&state.db, project.id).await?;
    let mut categories = db::cache::get_cached_budget_summary(&state.db, project.id).await?;
    if categories.is_empty() {
        categories = db::budget::get_category_summaries(&state.db, project.id).await?;
    }
    Ok(report::build_weekly_report(
        &project.name,
        project.total_budget,
        &stages,
        totals.total_spent,
        categories,
        chrono::Utc::now(),
    ))
}

// ---------------------------------------------------------------------------
// Simple commands
// ---------------------------------------------------------------------------

async fn cmd_start(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let full_name = from.full_name();
    let telegram_id = i64::try_from(from.id.0).unwrap_or(0);
    db::users::upsert_telegram_user(&state.db, telegram_id, &full_name).await?;
    db::cache::cache_invalidate(&state.db, &format!("user:tg:{telegram_id}")).await?;

    send_html(
        bot,
        msg.chat.id,
        format!(
            "👋 Здравствуйте, {}!\n\n\
             Я помогаю управлять ремонтом квартиры: этапы, бюджет, команда, \
             напоминания и ответы на вопросы по проекту.\n\n\
             Начните с /newproject или посмотрите /help.",
            format::escape_html(&full_name)
        ),
    )
    .await
}

async fn cmd_help(bot: &Bot, chat_id: ChatId) -> Result<()> {
    send_html(
        bot,
        chat_id,
        "<b>Команды</b>\n\n\
         /newproject — создать проект\n\
         /myprojects — список проектов\n\
         /stages — этапы и их настройка\n\
         /launch — запустить проект\n\
         /budget — сводка бюджета\n\
         /expenses — записать расход\n\
         /report — еженедельный отчёт\n\
         /status — статус этапов\n\
         /nextstage — текущий и следующий этап\n\
         /deadline — дедлайны\n\
         /mystage — этапы, где вы ответственный\n\
         /team — команда проекта\n\
         /invite — пригласить участника\n\
         /myrole — ваша роль\n\
         /ask &lt;вопрос&gt; — вопрос по проекту (AI)\n\
         /chat — диалог с AI-ассистентом\n\
         /cancel — прервать текущий шаг\n\n\
         В группе: /link — привязать группу к проекту.",
    )
    .await
}

async fn cmd_newproject(bot: &Bot, chat_id: ChatId, state: &AppState, user: &User) -> Result<()> {
    state
        .fsm
        .start((chat_id.0, user.id), ConvState::ProjectName)
        .await;
    send_html(
        bot,
        chat_id,
        "🏗 <b>Новый проект</b>\n\nКак назовём проект? Например: «Квартира на Абая».",
    )
    .await
}

async fn cmd_myprojects(bot: &Bot, chat_id: ChatId, state: &AppState, user: &User) -> Result<()> {
    let projects = db::projects::get_user_projects(&state.db, user.id, state.tenant_id).await?;
    if projects.is_empty() {
        send_html(
            bot,
            chat_id,
            "У вас нет активных проектов.\nСоздайте проект командой /newproject",
        )
        .await?;
        return Ok(());
    }

    let cards: Vec<String> = projects.iter().map(format::format_project_card).collect();
    send_html(bot, chat_id, cards.join("\n\n")).await
}

/// `/link` in a group chat: link this chat to one of the caller's
/// projects.
async fn cmd_link(bot: &Bot, msg: &Message, state: &AppState, user: &User) -> Result<()> {
    let chat_id = msg.chat.id;
    if msg.chat.is_private() {
        send_html(bot, chat_id, "Команда /link работает в групповом чате проекта.").await?;
        return Ok(());
    }

    if let Some(holder) =
        db::projects::get_project_by_telegram_chat_id(&state.db, chat_id.0).await?
    {
        send_html(
            bot,
            chat_id,
            format!(
                "Эта группа уже привязана к проекту «{}».",
                format::escape_html(&holder.name)
            ),
        )
        .await?;
        return Ok(());
    }

    let projects = db::projects::get_user_projects(&state.db, user.id, state.tenant_id).await?;
    if projects.is_empty() {
        send_html(
            bot,
            chat_id,
            "У вас нет проектов. Создайте проект в личном чате: /newproject",
        )
        .await?;
        return Ok(());
    }

    bot.send_message(chat_id, "Какой проект привязать к этой группе?")
        .reply_markup(format::project_link_keyboard(&projects))
        .await
        .map_err(|e| BotError::Upstream(e.to_string()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// FSM input
// ---------------------------------------------------------------------------

/// Route text arriving while a conversation is active.
#[allow(clippy::too_many_arguments)]
async fn handle_fsm_input(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    ctx: &RequestCtx,
    user: &User,
    conversation: Conversation,
    text: &str,
) -> Result<()> {
    let chat_id = msg.chat.id;
    let key = (chat_id.0, user.id);

    let result = match conversation.state.clone() {
        ConvState::ProjectName => wizard_name(bot, chat_id, state, key, text).await,
        ConvState::ProjectAddress => wizard_address(bot, chat_id, state, key, text).await,
        ConvState::ProjectArea => wizard_area(bot, chat_id, state, key, text).await,
        ConvState::ProjectType => {
            send_html(bot, chat_id, "Выберите тип ремонта кнопкой выше 👆").await
        }
        ConvState::ProjectBudget => wizard_budget(bot, chat_id, state, key, text).await,
        ConvState::ProjectCustomItems
        | ConvState::ProjectConfirm
        | ConvState::InviteRole { .. }
        | ConvState::ExpenseCategory { .. } => {
            send_html(bot, chat_id, "Используйте кнопки выше 👆").await
        }
        ConvState::StageInput { stage_id, field } => {
            stage_input(bot, chat_id, state, key, user, stage_id, field, text).await
        }
        ConvState::InviteContact { role, project_id } => {
            match roles::invite_member(&state.db, project_id, role, text, user.id).await {
                Ok(invited) => {
                    state.fsm.clear(key).await;
                    send_html(
                        bot,
                        chat_id,
                        format!(
                            "✅ {} приглашён(а) как {}.\n\
                             Когда участник напишет боту /start, он получит доступ к проекту.",
                            format::escape_html(&invited.full_name),
                            role.label()
                        ),
                    )
                    .await
                }
                Err(e) => Err(e),
            }
        }
        ConvState::ExpenseAmounts {
            project_id,
            category,
        } => expense_amounts(bot, chat_id, state, key, user, project_id, category, text).await,
        ConvState::ProjectPicker { .. } => {
            send_html(bot, chat_id, "Выберите проект кнопкой выше 👆").await
        }
        ConvState::AiChat { project_id } => {
            ai_chat_turn(bot, msg, state, ctx, key, project_id, text).await
        }
    };

    // Validation errors keep the conversation so the user can retry;
    // anything else ends the flow.
    if let Err(e) = &result {
        if !e.keeps_state() {
            state.fsm.clear(key).await;
        }
    }
    result
}

async fn wizard_name(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    key: (i64, i64),
    text: &str,
) -> Result<()> {
    if text.is_empty() {
        return Err(BotError::Validation(
            "Название не может быть пустым. Введите название проекта.".to_owned(),
        ));
    }
    state
        .fsm
        .update_data(key, |data| data.draft.name = Some(text.to_owned()))
        .await;
    state.fsm.set_state(key, ConvState::ProjectAddress).await;
    send_html(bot, chat_id, "📍 Адрес объекта? (или «-», чтобы пропустить)").await
}

async fn wizard_address(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    key: (i64, i64),
    text: &str,
) -> Result<()> {
    let address = (text != "-").then(|| text.to_owned());
    state
        .fsm
        .update_data(key, |data| data.draft.address = address)
        .await;
    state.fsm.set_state(key, ConvState::ProjectArea).await;
    send_html(bot, chat_id, "📐 Площадь в м²? (число или «-»)").await
}

async fn wizard_area(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    key: (i64, i64),
    text: &str,
) -> Result<()> {
    let area = if text == "-" {
        None
    } else {
        Some(parse_amount(text).ok_or_else(|| {
            BotError::Validation("Введите площадь числом, например 65.5 (или «-»)".to_owned())
        })?)
    };
    state
        .fsm
        .update_data(key, |data| data.draft.area_sqm = area)
        .await;
    state.fsm.set_state(key, ConvState::ProjectType).await;
    bot.send_message(chat_id, "🔨 Какой тип ремонта?")
        .reply_markup(format::renovation_type_keyboard())
        .await
        .map_err(|e| BotError::Upstream(e.to_string()))?;
    Ok(())
}

async fn wizard_budget(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    key: (i64, i64),
    text: &str,
) -> Result<()> {
    let budget = if text == "-" {
        None
    } else {
        Some(parse_amount(text).ok_or_else(|| {
            BotError::Validation(
                "Введите бюджет числом, например 5 000 000 (или «-»)".to_owned(),
            )
        })?)
    };
    state
        .fsm
        .update_data(key, |data| data.draft.total_budget = budget)
        .await;
    state
        .fsm
        .set_state(key, ConvState::ProjectCustomItems)
        .await;
    bot.send_message(
        chat_id,
        "🪑 Что делаете на заказ? Отметьте и нажмите «Готово».",
    )
    .reply_markup(format::custom_items_keyboard(&[]))
    .await
    .map_err(|e| BotError::Upstream(e.to_string()))?;
    Ok(())
}

/// Create the project from the accumulated wizard draft.
pub(crate) async fn finish_wizard(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    key: (i64, i64),
    user: &User,
) -> Result<()> {
    let Some(conversation) = state.fsm.get(key).await else {
        return Err(BotError::NotFound("Мастер создания уже завершён".to_owned()));
    };
    let draft = conversation.data.draft;

    let project = create_renovation_project(
        &state.db,
        NewProject {
            owner_user_id: user.id,
            tenant_id: state.tenant_id,
            name: draft.name.unwrap_or_default(),
            address: draft.address,
            area_sqm: draft.area_sqm,
            renovation_type: draft.renovation_type.unwrap_or(RenovationType::Standard),
            total_budget: draft.total_budget,
            telegram_chat_id: None,
            custom_items: draft.custom_items,
        },
    )
    .await?;
    state.fsm.clear(key).await;

    let stages = db::stages::get_stages_for_project(&state.db, project.id).await?;
    info!(project_id = project.id, stages = stages.len(), "project created via wizard");

    send_html(
        bot,
        chat_id,
        format!(
            "✅ Проект создан!\n\n{}\n\nЭтапов: {}. Настройте даты и бюджеты: /stages, \
             затем запустите проект: /launch",
            format::format_project_card(&project),
            stages.len()
        ),
    )
    .await
}

/// One stage-attribute input (date, duration, responsible, budget,
/// sub-stages).
#[allow(clippy::too_many_arguments)]
async fn stage_input(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    key: (i64, i64),
    user: &User,
    stage_id: i64,
    field: StageField,
    text: &str,
) -> Result<()> {
    let reply = match field {
        StageField::StartDate => {
            let stage = stage_service::set_start_date(&state.db, stage_id, text, user.id).await?;
            format!(
                "📅 Дата начала «{}»: {}",
                format::escape_html(&stage.name),
                stage_service::format_date(stage.start_date)
            )
        }
        StageField::EndDate => {
            let stage = stage_service::set_end_date(&state.db, stage_id, text, user.id).await?;
            format!(
                "🏁 Дата завершения «{}»: {}",
                format::escape_html(&stage.name),
                stage_service::format_date(stage.end_date)
            )
        }
        StageField::Duration => {
            let stage =
                stage_service::set_duration_days(&state.db, stage_id, text, user.id).await?;
            format!(
                "⏱ «{}»: {} — {}",
                format::escape_html(&stage.name),
                stage_service::format_date(stage.start_date),
                stage_service::format_date(stage.end_date)
            )
        }
        StageField::Responsible => {
            let stage =
                stage_service::set_responsible(&state.db, stage_id, text, None, user.id).await?;
            format!(
                "👤 Ответственный за «{}»: {}",
                format::escape_html(&stage.name),
                format::escape_html(stage.responsible_contact.as_deref().unwrap_or("—"))
            )
        }
        StageField::Budget => {
            let stage = stage_service::set_budget(&state.db, stage_id, text, user.id).await?;
            format!(
                "💰 Бюджет «{}»: {} ₸",
                format::escape_html(&stage.name),
                crate::services::budget::format_amount(stage.budget.unwrap_or(0.0))
            )
        }
        StageField::SubStages => {
            let subs =
                stage_service::add_sub_stages_from_text(&state.db, stage_id, text).await?;
            format!("📋 Добавлено подэтапов: {}", subs.len())
        }
    };

    state.fsm.clear(key).await;
    send_html(bot, chat_id, reply).await
}

/// Parse "work [materials [prepayment]] [описание]" and record the
/// expense.
#[allow(clippy::too_many_arguments)]
async fn expense_amounts(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    key: (i64, i64),
    user: &User,
    project_id: i64,
    category: crate::domain::BudgetCategory,
    text: &str,
) -> Result<()> {
    let mut amounts: Vec<f64> = Vec::new();
    let mut description_words: Vec<&str> = Vec::new();
    for token in text.split_whitespace() {
        if description_words.is_empty() && amounts.len() < 3 {
            if let Some(amount) = parse_amount(token) {
                amounts.push(amount);
                continue;
            }
        }
        description_words.push(token);
    }

    if amounts.is_empty() {
        return Err(BotError::Validation(
            "Введите сумму, например: <code>80000</code> или \
             <code>50000 30000 10000 плитка для ванной</code>\n\
             (работы, материалы, предоплата)"
                .to_owned(),
        ));
    }

    let work_cost = amounts.first().copied().unwrap_or(0.0);
    let material_cost = amounts.get(1).copied().unwrap_or(0.0);
    let prepayment = amounts.get(2).copied().unwrap_or(0.0);
    let description = if description_words.is_empty() {
        None
    } else {
        Some(description_words.join(" "))
    };

    let item = budget::add_expense(
        &state.db,
        NewExpense {
            project_id,
            stage_id: None,
            category,
            description,
            work_cost,
            material_cost,
            prepayment,
        },
        user.id,
    )
    .await?;
    state.fsm.clear(key).await;

    send_html(
        bot,
        chat_id,
        format!(
            "✅ Расход записан: {} — {} ₸",
            category.label(),
            crate::services::budget::format_amount(item.total())
        ),
    )
    .await?;

    // Budget health check right after the write; warnings go to owners.
    if let Some(project) = db::projects::get_project(&state.db, project_id).await? {
        let totals = budget::project_totals(&state.db, project_id).await?;
        let analysis = budget::analyze_budget(project.total_budget, totals.total_spent);
        let owners = db::projects::get_project_owner_ids(&state.db, project_id).await?;
        let notification = match analysis.status {
            budget::BudgetHealth::Over => Some(notify::build_overspending_alert(
                project_id,
                &project.name,
                totals.total_spent,
                project.total_budget.unwrap_or(0.0),
                analysis.usage_pct - 100.0,
                owners,
            )),
            budget::BudgetHealth::Warning => Some(notify::build_budget_warning(
                project_id,
                &project.name,
                totals.total_spent,
                project.total_budget.unwrap_or(0.0),
                analysis.usage_pct,
                owners,
            )),
            budget::BudgetHealth::Ok => None,
        };
        if let Some(notification) = notification {
            state.supervisor.deliver(&notification).await?;
        }
    }
    Ok(())
}

/// One turn of the interactive AI chat.
async fn ai_chat_turn(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    ctx: &RequestCtx,
    key: (i64, i64),
    project_id: i64,
    text: &str,
) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }

    // Chat turns are project conversation too — index them.
    store_incoming(msg, state, ctx, None).await?;

    let project = db::projects::get_project(&state.db, project_id)
        .await?
        .ok_or_else(|| BotError::NotFound("Проект не найден".to_owned()))?;

    let history = state
        .fsm
        .get(key)
        .await
        .map(|c| c.data.history)
        .unwrap_or_default();

    let (answer, new_history) =
        ai_chat::chat_with_project(&state.db, &state.ai, &state.skills, &project, text, history)
            .await?;

    state
        .fsm
        .update_data(key, |data| data.history = new_history)
        .await;

    send_html(bot, msg.chat.id, format::escape_html(&answer)).await
}
