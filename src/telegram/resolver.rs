//! Project resolver — the single policy point for "which project is
//! this action for?".
//!
//! Decision table:
//! 1. group chat with a linked project → that project;
//! 2. group chat without one → "use /link";
//! 3. private chat, exactly one project → that project;
//! 4. private chat, several projects → picker keyboard + FSM state, the
//!    callback re-dispatches by stored intent;
//! 5. private chat, none → "create one with /newproject".
//!
//! Listings are always tenant-scoped, so users of different tenant bots
//! never see each other's projects.

use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::db;
use crate::domain::{Project, User};
use crate::telegram::fsm::ConvState;
use crate::telegram::{format, AppState};

/// A resolved project together with the acting user's id.
#[derive(Debug, Clone)]
pub struct ResolvedProject {
    /// The resolved project.
    pub project: Project,
    /// The acting user's internal id.
    pub user_id: i64,
}

/// Resolve the project a command acts on, replying to the user when
/// resolution cannot complete.
///
/// Returns `None` after sending the appropriate reply (picker, /link
/// hint, or create-project hint); the caller just returns. When a
/// picker is shown, `pending_text` is stashed so the callback can
/// re-run the original command with its argument.
pub async fn resolve_project(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    is_group: bool,
    user: &User,
    intent: &str,
    pending_text: Option<String>,
) -> crate::error::Result<Option<ResolvedProject>> {
    // Group chat: only the linked project counts.
    if is_group {
        match db::projects::get_project_by_telegram_chat_id(&state.db, chat_id.0).await? {
            Some(project) => {
                return Ok(Some(ResolvedProject {
                    project,
                    user_id: user.id,
                }));
            }
            None => {
                bot.send_message(
                    chat_id,
                    "❌ Эта группа не привязана к проекту.\n\
                     Используйте /link чтобы привязать группу к проекту.",
                )
                .await
                .map_err(upstream)?;
                return Ok(None);
            }
        }
    }

    // Private chat: the user's tenant-scoped projects.
    let projects = db::projects::get_user_projects(&state.db, user.id, state.tenant_id).await?;

    match projects.len() {
        0 => {
            bot.send_message(
                chat_id,
                "У вас нет активных проектов.\nСоздайте проект командой /newproject",
            )
            .await
            .map_err(upstream)?;
            Ok(None)
        }
        1 => Ok(Some(ResolvedProject {
            project: projects.into_iter().next().expect("len checked"),
            user_id: user.id,
        })),
        _ => {
            let key = (chat_id.0, user.id);
            state
                .fsm
                .start(
                    key,
                    ConvState::ProjectPicker {
                        intent: intent.to_owned(),
                    },
                )
                .await;
            state
                .fsm
                .update_data(key, |data| data.pending_text = pending_text)
                .await;

            bot.send_message(chat_id, "Выберите проект:")
                .parse_mode(ParseMode::Html)
                .reply_markup(format::project_select_keyboard(&projects))
                .await
                .map_err(upstream)?;
            Ok(None)
        }
    }
}

fn upstream(e: teloxide::RequestError) -> crate::error::BotError {
    crate::error::BotError::Upstream(e.to_string())
}
