//! Admin commands for tenant management: /addbot, /listbots, /removebot.
//!
//! Restricted to the Telegram ids in `ADMIN_TELEGRAM_IDS`; everyone
//! else gets no response at all.

use regex::Regex;
use std::sync::OnceLock;
use teloxide::prelude::*;
use tracing::info;

use crate::db;
use crate::error::{BotError, Result};
use crate::telegram::{format, send_html, AppState};

/// Telegram bot tokens look like `digits:alphanumeric`.
fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+:[A-Za-z0-9_-]+$").expect("static regex"))
}

/// Dispatch an admin command. Non-admins are silently ignored.
pub async fn dispatch_admin(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    command: &str,
    args: &str,
) -> Result<()> {
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let telegram_id = i64::try_from(from.id.0).unwrap_or(0);
    if !state.config.is_admin(telegram_id) {
        return Ok(());
    }

    match command {
        "addbot" => cmd_addbot(bot, msg.chat.id, state, args).await,
        "listbots" => cmd_listbots(bot, msg.chat.id, state).await,
        "removebot" => cmd_removebot(bot, msg.chat.id, state, args).await,
        _ => Ok(()),
    }
}

/// `/addbot <token>` — register a new tenant and start polling at once.
async fn cmd_addbot(bot: &Bot, chat_id: ChatId, state: &AppState, args: &str) -> Result<()> {
    let token = args.trim();
    if token.is_empty() {
        send_html(
            bot,
            chat_id,
            "📝 <b>Использование:</b>\n\n<code>/addbot TOKEN</code>\n\n\
             Получите токен у @BotFather после создания нового бота.",
        )
        .await?;
        return Ok(());
    }

    if !token_regex().is_match(token) {
        send_html(
            bot,
            chat_id,
            "❌ Неверный формат токена.\n\n\
             Токен должен выглядеть так: <code>1234567890:ABCdef...</code>",
        )
        .await?;
        return Ok(());
    }

    if let Some(existing) = db::tenants::get_tenant_by_bot_token(&state.db, token).await? {
        let status = if existing.is_active {
            "✅ активен"
        } else {
            "⏸ неактивен"
        };
        send_html(
            bot,
            chat_id,
            format!(
                "⚠️ Этот бот уже зарегистрирован.\n\nID: {}\nИмя: {}\nUsername: @{}\nСтатус: {status}",
                existing.id,
                format::escape_html(&existing.name),
                existing.bot_username.as_deref().unwrap_or("?"),
            ),
        )
        .await?;
        return Ok(());
    }

    match crate::telegram::Supervisor::add_tenant(&state.supervisor, token).await {
        Ok(tenant) => {
            let username = state
                .supervisor
                .tenant_username(tenant.id)
                .await
                .unwrap_or_default();
            send_html(
                bot,
                chat_id,
                format!(
                    "✅ <b>Бот зарегистрирован!</b>\n\n🤖 Имя: {}\n👤 Username: @{username}\n\
                     🆔 Tenant ID: {}\n\n🟢 Бот запущен и готов к работе!",
                    format::escape_html(&tenant.name),
                    tenant.id
                ),
            )
            .await?;
            info!(tenant_id = tenant.id, "tenant registered via /addbot");
        }
        Err(BotError::Upstream(e)) => {
            send_html(
                bot,
                chat_id,
                format!(
                    "❌ Не удалось подключиться к Telegram API.\n\nПроверьте токен. Ошибка: {}",
                    format::escape_html(&e)
                ),
            )
            .await?;
        }
        Err(other) => return Err(other),
    }
    Ok(())
}

/// `/listbots` — list all registered tenants.
async fn cmd_listbots(bot: &Bot, chat_id: ChatId, state: &AppState) -> Result<()> {
    let tenants = db::tenants::list_all_tenants(&state.db).await?;
    if tenants.is_empty() {
        send_html(bot, chat_id, "📋 Нет зарегистрированных ботов.").await?;
        return Ok(());
    }

    let mut lines = vec!["📋 <b>Зарегистрированные боты:</b>\n".to_owned()];
    for t in &tenants {
        let status = if t.is_active { "🟢" } else { "🔴" };
        let username = t
            .bot_username
            .as_deref()
            .map(|u| format!("@{u}"))
            .unwrap_or_else(|| "—".to_owned());
        lines.push(format!(
            "{status} <b>{}</b>\n   ID: {} | {username}\n",
            format::escape_html(&t.name),
            t.id
        ));
    }
    lines.push(format!("Всего: {}", tenants.len()));
    send_html(bot, chat_id, lines.join("\n")).await
}

/// `/removebot <tenant_id>` — deactivate a tenant and stop its pipeline.
async fn cmd_removebot(bot: &Bot, chat_id: ChatId, state: &AppState, args: &str) -> Result<()> {
    let Ok(tenant_id) = args.trim().parse::<i64>() else {
        send_html(
            bot,
            chat_id,
            "📝 <b>Использование:</b>\n\n<code>/removebot ID</code>\n\nID можно узнать через /listbots",
        )
        .await?;
        return Ok(());
    };

    match state.supervisor.remove_tenant(tenant_id).await {
        Ok(tenant) => {
            send_html(
                bot,
                chat_id,
                format!(
                    "✅ Бот <b>{}</b> (@{}) деактивирован и остановлен.",
                    format::escape_html(&tenant.name),
                    tenant.bot_username.as_deref().unwrap_or("?")
                ),
            )
            .await?;
            info!(tenant_id, "tenant deactivated via /removebot");
        }
        Err(BotError::NotFound(msg)) => {
            send_html(bot, chat_id, format!("❌ {}", format::escape_html(&msg))).await?;
        }
        Err(other) => return Err(other),
    }
    Ok(())
}
