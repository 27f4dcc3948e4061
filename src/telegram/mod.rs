//! Telegram adapter: multi-tenant supervisor, dispatch pipeline, and
//! handler wiring.
//!
//! The supervisor owns one teloxide [`Dispatcher`] per active tenant.
//! All tenants share the same handler tree; per-tenant identity
//! (`tenant_id`, bot username, bot user id) rides in the dispatcher's
//! injected [`AppState`], so every database query downstream is
//! tenant-scoped. A failing tenant never takes down the others.

pub mod admin;
pub mod callbacks;
pub mod commands;
pub mod context;
pub mod format;
pub mod fsm;
pub mod gate;
pub mod media;
pub mod resolver;

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use sqlx::PgPool;
use teloxide::dispatching::{ShutdownToken, UpdateFilterExt};
use teloxide::prelude::*;
use teloxide::types::{BotCommand, BotCommandScope, ChatId, ParseMode};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::ai::AiClient;
use crate::config::Config;
use crate::db;
use crate::domain::Tenant;
use crate::error::{BotError, Result};
use crate::services::notification::{Notification, NotificationType};
use crate::skills::SkillRegistry;
use fsm::FsmStore;

/// Shared dependencies injected into handlers via `dptree::deps!`.
///
/// One instance per tenant dispatcher; the shared parts are `Arc`s.
#[derive(Clone)]
pub struct AppState {
    /// Database pool, shared by all tenants.
    pub db: PgPool,
    /// Process configuration.
    pub config: Arc<Config>,
    /// AI provider client.
    pub ai: Arc<AiClient>,
    /// Skill registry.
    pub skills: Arc<SkillRegistry>,
    /// Conversation state store (shared; keys never collide across
    /// tenants because chat ids are globally unique).
    pub fsm: Arc<FsmStore>,
    /// Back-reference for admin commands (/addbot) and delivery.
    pub supervisor: Arc<Supervisor>,
    /// The tenant this dispatcher serves.
    pub tenant_id: i64,
    /// This bot's `@username` (no `@`).
    pub bot_username: String,
    /// This bot's Telegram user id.
    pub bot_user_id: u64,
    /// Compiled mention-gate prefix patterns.
    pub gate_patterns: Arc<Vec<Regex>>,
}

struct TenantHandle {
    bot: Bot,
    username: String,
    shutdown: ShutdownToken,
}

/// Multi-tenant bot supervisor.
pub struct Supervisor {
    db: PgPool,
    config: Arc<Config>,
    ai: Arc<AiClient>,
    skills: Arc<SkillRegistry>,
    fsm: Arc<FsmStore>,
    gate_patterns: Arc<Vec<Regex>>,
    bots: RwLock<HashMap<i64, TenantHandle>>,
}

impl Supervisor {
    /// Build the supervisor (no bots started yet).
    pub fn new(
        db: PgPool,
        config: Arc<Config>,
        ai: Arc<AiClient>,
        skills: Arc<SkillRegistry>,
    ) -> Arc<Self> {
        let gate_patterns = Arc::new(gate::compile_patterns(&config.mention_gate_patterns));
        Arc::new(Self {
            db,
            config,
            ai,
            skills,
            fsm: Arc::new(FsmStore::new()),
            gate_patterns,
            bots: RwLock::new(HashMap::new()),
        })
    }

    /// Load active tenants and start one pipeline per tenant.
    ///
    /// When the tenants table is empty and a fallback token is
    /// configured, a default tenant is created and orphaned projects
    /// are adopted by it.
    pub async fn start_all(this: &Arc<Self>) -> Result<usize> {
        let mut tenants = db::tenants::get_all_active_tenants(&this.db).await?;

        if tenants.is_empty() {
            if let Some(token) = this.config.telegram_bot_token.clone() {
                info!("no tenants registered, creating default tenant from TELEGRAM_BOT_TOKEN");
                let tenant = this.register_tenant(&token, "Default").await?;
                let adopted = db::tenants::adopt_orphan_projects(&this.db, tenant.id).await?;
                if adopted > 0 {
                    info!(adopted, "orphaned projects adopted by default tenant");
                }
                tenants = vec![tenant];
            } else {
                warn!("no active tenants and no TELEGRAM_BOT_TOKEN fallback configured");
            }
        }

        let mut started = 0;
        for tenant in tenants {
            // One bad token must not stop the rest of the fleet.
            match Self::spawn_tenant(this, &tenant).await {
                Ok(()) => started += 1,
                Err(e) => {
                    error!(tenant_id = tenant.id, error = %e, "failed to start tenant bot");
                }
            }
        }

        info!(started, "tenant bots started");
        Ok(started)
    }

    /// Validate a bot token against the platform and insert the tenant.
    async fn register_tenant(&self, token: &str, fallback_name: &str) -> Result<Tenant> {
        let bot = Bot::new(token.to_owned());
        let me = bot
            .get_me()
            .await
            .map_err(|e| BotError::Upstream(format!("token validation failed: {e}")))?;

        let name = if me.first_name.is_empty() {
            fallback_name.to_owned()
        } else {
            me.first_name.clone()
        };
        db::tenants::create_tenant(&self.db, &name, token, Some(me.username())).await
    }

    /// Start consuming updates for one tenant.
    ///
    /// Confirms the bot identity, persists the username, registers the
    /// command menus for both chat scopes, and spawns the dispatcher.
    pub fn spawn_tenant<'a>(
        this: &'a Arc<Self>,
        tenant: &'a Tenant,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(Self::spawn_tenant_inner(this, tenant))
    }

    async fn spawn_tenant_inner(this: &Arc<Self>, tenant: &Tenant) -> Result<()> {
        let bot = Bot::new(tenant.bot_token.clone());

        let me = bot
            .get_me()
            .await
            .map_err(|e| BotError::Upstream(format!("identity resolution failed: {e}")))?;
        let username = me.username().trim_start_matches('@').to_owned();
        db::tenants::set_tenant_username(&this.db, tenant.id, &username).await?;

        if let Err(e) = register_command_menus(&bot).await {
            // Menu registration is cosmetic; the bot still works.
            warn!(tenant_id = tenant.id, error = %e, "command menu registration failed");
        }

        let app = AppState {
            db: this.db.clone(),
            config: Arc::clone(&this.config),
            ai: Arc::clone(&this.ai),
            skills: Arc::clone(&this.skills),
            fsm: Arc::clone(&this.fsm),
            supervisor: Arc::clone(this),
            tenant_id: tenant.id,
            bot_username: username.clone(),
            bot_user_id: me.user.id.0,
            gate_patterns: Arc::clone(&this.gate_patterns),
        };

        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint(handle_message))
            .branch(Update::filter_callback_query().endpoint(handle_callback));

        let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
            .dependencies(dptree::deps![app])
            .default_handler(|_| async {})
            .build();
        let shutdown = dispatcher.shutdown_token();

        let tenant_id = tenant.id;
        tokio::spawn(async move {
            dispatcher.dispatch().await;
            info!(tenant_id, "tenant dispatcher stopped");
        });

        this.bots.write().await.insert(
            tenant.id,
            TenantHandle {
                bot,
                username: username.clone(),
                shutdown,
            },
        );

        info!(tenant_id = tenant.id, username = %username, "tenant bot started");
        Ok(())
    }

    /// Hot-add a tenant: validate the token, insert, and start polling
    /// without a restart.
    pub async fn add_tenant(this: &Arc<Self>, token: &str) -> Result<Tenant> {
        let tenant = this.register_tenant(token, "Bot").await?;
        Self::spawn_tenant(this, &tenant).await?;
        Ok(tenant)
    }

    /// Deactivate a tenant and stop consuming its updates.
    pub async fn remove_tenant(&self, tenant_id: i64) -> Result<Tenant> {
        let tenant = db::tenants::deactivate_tenant(&self.db, tenant_id).await?;
        if let Some(handle) = self.bots.write().await.remove(&tenant_id) {
            if let Ok(fut) = handle.shutdown.shutdown() {
                fut.await;
            }
        }
        info!(tenant_id, "tenant stopped");
        Ok(tenant)
    }

    /// Stop all tenant dispatchers.
    pub async fn shutdown(&self) {
        let mut bots = self.bots.write().await;
        for (tenant_id, handle) in bots.drain() {
            if let Ok(fut) = handle.shutdown.shutdown() {
                fut.await;
            }
            debug!(tenant_id, "dispatcher shut down");
        }
        info!("all tenant bots stopped");
    }

    /// Tenants with a live dispatcher right now.
    pub async fn running_tenant_ids(&self) -> Vec<i64> {
        self.bots.read().await.keys().copied().collect()
    }

    /// Deliver a notification through the owning tenant's bot.
    ///
    /// Recipients are internal user ids; users without a Telegram id
    /// (invitation placeholders) are skipped. Checkpoint notifications
    /// get approve/reject buttons.
    pub async fn deliver(&self, notification: &Notification) -> Result<()> {
        let project = db::projects::get_project(&self.db, notification.project_id)
            .await?
            .ok_or_else(|| BotError::NotFound("project vanished".to_owned()))?;
        let Some(tenant_id) = project.tenant_id else {
            warn!(project_id = project.id, "project has no tenant, dropping notification");
            return Ok(());
        };

        let bot = {
            let bots = self.bots.read().await;
            match bots.get(&tenant_id) {
                Some(handle) => handle.bot.clone(),
                None => {
                    warn!(tenant_id, "no running bot for tenant, dropping notification");
                    return Ok(());
                }
            }
        };

        let text = format!(
            "<b>{}</b>\n\n{}",
            format::escape_html(&notification.title),
            format::escape_html(&notification.body)
        );

        for user_id in &notification.recipient_user_ids {
            let Some(user) = db::users::get_user_by_id(&self.db, *user_id).await? else {
                continue;
            };
            let Some(telegram_id) = user.telegram_id else {
                continue;
            };

            let mut request = bot
                .send_message(ChatId(telegram_id), text.clone())
                .parse_mode(ParseMode::Html);
            if notification.notification_type == NotificationType::CheckpointReached {
                if let Some(stage_id) = notification.stage_id {
                    request = request.reply_markup(format::checkpoint_keyboard(stage_id));
                }
            }

            if let Err(e) = request.await {
                warn!(
                    user_id,
                    telegram_id,
                    kind = notification.notification_type.as_str(),
                    error = %e,
                    "notification delivery failed"
                );
            }
        }

        Ok(())
    }

    /// The bot username serving a tenant, when running.
    pub async fn tenant_username(&self, tenant_id: i64) -> Option<String> {
        self.bots
            .read()
            .await
            .get(&tenant_id)
            .map(|h| h.username.clone())
    }
}

/// Register the command menus for private and group chat scopes.
async fn register_command_menus(bot: &Bot) -> std::result::Result<(), teloxide::RequestError> {
    let private: Vec<BotCommand> = [
        ("start", "Начать работу с ботом"),
        ("newproject", "Создать проект ремонта"),
        ("myprojects", "Мои проекты"),
        ("stages", "Этапы проекта"),
        ("launch", "Запустить проект"),
        ("budget", "Бюджет проекта"),
        ("expenses", "Записать расход"),
        ("report", "Еженедельный отчёт"),
        ("status", "Статус этапов"),
        ("nextstage", "Следующий этап"),
        ("deadline", "Дедлайны"),
        ("mystage", "Мой этап"),
        ("team", "Команда проекта"),
        ("invite", "Пригласить участника"),
        ("myrole", "Моя роль"),
        ("ask", "Вопрос по проекту (AI)"),
        ("chat", "Диалог с AI-ассистентом"),
        ("cancel", "Прервать текущий шаг"),
        ("help", "Справка"),
    ]
    .iter()
    .map(|(cmd, desc)| BotCommand::new(*cmd, *desc))
    .collect();

    let group: Vec<BotCommand> = [
        ("link", "Привязать группу к проекту"),
        ("stages", "Этапы проекта"),
        ("budget", "Бюджет проекта"),
        ("status", "Статус этапов"),
        ("report", "Еженедельный отчёт"),
        ("nextstage", "Следующий этап"),
        ("deadline", "Дедлайны"),
        ("team", "Команда проекта"),
        ("ask", "Вопрос по проекту (AI)"),
    ]
    .iter()
    .map(|(cmd, desc)| BotCommand::new(*cmd, *desc))
    .collect();

    bot.set_my_commands(private)
        .scope(BotCommandScope::AllPrivateChats)
        .await?;
    bot.set_my_commands(group)
        .scope(BotCommandScope::AllGroupChats)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Entry point for every inbound message of one tenant.
async fn handle_message(bot: Bot, msg: Message, state: AppState) -> ResponseResult<()> {
    // Ignore our own and other bots' messages.
    if msg.from.as_ref().is_none_or(|u| u.is_bot) {
        return Ok(());
    }

    if let Err(e) = commands::process_message(&bot, &msg, &state).await {
        error!(chat_id = msg.chat.id.0, error = %e, "message handler failed");
        let reply = e.user_message();
        if let Err(send_err) = bot
            .send_message(msg.chat.id, reply)
            .parse_mode(ParseMode::Html)
            .await
        {
            warn!(error = %send_err, "failed to send error reply");
        }
    }
    Ok(())
}

/// Entry point for every inline-button callback of one tenant.
async fn handle_callback(bot: Bot, query: CallbackQuery, state: AppState) -> ResponseResult<()> {
    if let Err(e) = callbacks::process_callback(&bot, &query, &state).await {
        error!(error = %e, "callback handler failed");
        let _ = bot
            .answer_callback_query(&query.id)
            .text(e.user_message())
            .await;
    }
    Ok(())
}

/// Send an HTML-mode message, translating transport errors.
pub(crate) async fn send_html(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
) -> Result<()> {
    bot.send_message(chat_id, text.into())
        .parse_mode(ParseMode::Html)
        .await
        .map_err(|e| BotError::Upstream(e.to_string()))?;
    Ok(())
}

