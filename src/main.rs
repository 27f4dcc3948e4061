//! Remobot entry point.
//!
//! `remobot start` brings up the whole engine: database pool, skill
//! registry, AI client, one Telegram pipeline per tenant, the
//! background scheduler, and (when configured) the admin HTTP API.
//! `remobot check-config` validates the environment and exits.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use remobot::ai::AiClient;
use remobot::config::Config;
use remobot::http::HttpState;
use remobot::skills::SkillRegistry;
use remobot::telegram::Supervisor;
use remobot::{db, http, logging, scheduler};

#[derive(Parser)]
#[command(name = "remobot", about = "Multi-tenant renovation assistant bot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the engine (bots + scheduler + admin API).
    Start,
    /// Validate configuration and exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::CheckConfig => {
            logging::init_cli();
            let config = Config::from_env()?;
            println!("database: {}@{}:{}/{}", config.postgres_user, config.postgres_host, config.postgres_port, config.postgres_db);
            println!(
                "ai provider: {}",
                if config.ai_provider.is_configured() {
                    "configured"
                } else {
                    "not configured"
                }
            );
            println!(
                "mention gate: {}",
                if config.mention_gate_enabled { "on" } else { "off" }
            );
            println!("admin ids: {:?}", config.admin_ids);
            println!("config OK");
            Ok(())
        }
        Command::Start => run().await,
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env().context("configuration error")?;
    let _logging_guard = logging::init_production(Path::new(&config.logs_dir), &config.log_level)
        .context("failed to initialise logging")?;

    info!("remobot starting");

    let config = Arc::new(config);
    let pool = db::connect(&config).await.context("database unreachable")?;

    let skills = Arc::new(SkillRegistry::load(config.skills_dir.as_deref()));
    if skills.is_empty() {
        warn!("no skills loaded; AI prompts fall back to built-in defaults");
    }

    let ai = Arc::new(AiClient::new(&config));
    if !ai.is_configured() {
        warn!("AI provider not configured; /ask, /chat, voice and photo understanding are off");
    }

    let supervisor = Supervisor::new(pool.clone(), Arc::clone(&config), ai, skills);
    let started = Supervisor::start_all(&supervisor).await?;
    if started == 0 {
        warn!("no tenant bots running; only the admin API is available");
    }

    let scheduler_handle = scheduler::start(pool.clone(), Arc::clone(&supervisor));

    // Optional admin HTTP surface.
    let http_task = match (&config.admin_http_addr, &config.admin_api_key) {
        (Some(addr), Some(key)) => {
            let state = HttpState {
                db: pool.clone(),
                supervisor: Arc::clone(&supervisor),
                admin_key: key.clone(),
                webhook_app_secret: config.webhook_app_secret.clone(),
                webhook_verify_token: config.webhook_verify_token.clone(),
            };
            let addr = addr.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = http::serve(&addr, state).await {
                    error!(error = %e, "admin HTTP API failed");
                }
            }))
        }
        (Some(_), None) => {
            warn!("ADMIN_HTTP_ADDR set but ADMIN_API_KEY missing; HTTP API disabled");
            None
        }
        _ => None,
    };

    info!("remobot ready");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("shutting down");
    scheduler_handle.stop().await;
    supervisor.shutdown().await;
    if let Some(task) = http_task {
        task.abort();
    }
    pool.close().await;
    info!("remobot stopped");
    Ok(())
}
