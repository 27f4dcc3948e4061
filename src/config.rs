//! Configuration loaded from environment variables / a `.env` file.
//!
//! All secrets (database password, bot tokens, API keys) come from the
//! environment — never hardcoded. [`Config::from_env`] reads the real
//! process environment; [`Config::from_env_with`] takes a resolver
//! function so tests can supply values without touching `std::env`.

use crate::error::BotError;

/// AI provider selection — each variant enumerates its required fields.
#[derive(Debug, Clone, PartialEq)]
pub enum AiProviderConfig {
    /// Azure OpenAI: deployment-addressed endpoints with `api-key` auth.
    Azure {
        /// Resource endpoint, e.g. `https://myres.openai.azure.com`.
        endpoint: String,
        /// API key (`api-key` header).
        api_key: String,
        /// REST API version query parameter.
        api_version: String,
        /// Chat deployment name.
        chat_deployment: String,
        /// Embedding deployment name.
        embedding_deployment: String,
        /// Whisper deployment name.
        whisper_deployment: String,
    },
    /// Standard OpenAI API.
    OpenAi {
        /// Bearer API key.
        api_key: String,
        /// Chat model, e.g. `gpt-4o`.
        chat_model: String,
        /// Embedding model, e.g. `text-embedding-3-small`.
        embedding_model: String,
        /// STT model, e.g. `whisper-1`.
        whisper_model: String,
    },
    /// Any OpenAI-compatible API (DeepSeek, Groq, Kimi, vLLM, ...).
    OpenAiCompatible {
        /// Base URL ending in `/v1` (or equivalent).
        base_url: String,
        /// Bearer API key.
        api_key: String,
        /// Chat model name.
        chat_model: String,
        /// Embedding model name.
        embedding_model: String,
        /// STT model name.
        whisper_model: String,
    },
    /// No provider configured — AI features answer with a setup hint.
    Disabled,
}

impl AiProviderConfig {
    /// Returns `true` when AI calls can be attempted.
    pub fn is_configured(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// Central configuration for the engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL database name.
    pub postgres_db: String,
    /// PostgreSQL user.
    pub postgres_user: String,
    /// PostgreSQL password.
    pub postgres_password: String,
    /// PostgreSQL host.
    pub postgres_host: String,
    /// PostgreSQL port.
    pub postgres_port: u16,

    /// Fallback bot token for single-tenant mode. When the tenants table
    /// is empty at startup, a default tenant is created from this token.
    pub telegram_bot_token: Option<String>,

    /// AI provider variant.
    pub ai_provider: AiProviderConfig,
    /// Embedding vector dimensionality (providers that support it are
    /// asked to truncate to this size).
    pub ai_embedding_dimensions: usize,
    /// Optional separate endpoint for embeddings (e.g. local Ollama
    /// serving BGE-M3 while chat goes to a cloud provider).
    pub ai_embedding_base_url: Option<String>,
    /// API key for the separate embedding endpoint.
    pub ai_embedding_api_key: Option<String>,
    /// Optional separate endpoint for speech-to-text.
    pub ai_whisper_base_url: Option<String>,
    /// API key for the separate STT endpoint.
    pub ai_whisper_api_key: Option<String>,

    /// Whether the group-chat mention gate is enabled.
    pub mention_gate_enabled: bool,
    /// Comma-separated custom prefixes that open the gate (e.g. "бот").
    pub mention_gate_patterns: String,

    /// Extra directory with user-defined SKILL.md files.
    pub skills_dir: Option<String>,

    /// Telegram user ids allowed to run /addbot, /listbots, /removebot.
    pub admin_ids: Vec<i64>,

    /// Bind address for the admin HTTP API, e.g. `0.0.0.0:8080`.
    /// `None` disables the HTTP surface.
    pub admin_http_addr: Option<String>,
    /// Shared secret expected in the `X-Admin-Key` header.
    pub admin_api_key: Option<String>,
    /// App secret for webhook HMAC-SHA256 verification.
    pub webhook_app_secret: Option<String>,
    /// Verify token echoed during webhook challenge requests.
    pub webhook_verify_token: Option<String>,

    /// Log level filter default (`RUST_LOG` still wins).
    pub log_level: String,
    /// Directory for rotated JSON log files.
    pub logs_dir: String,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Reads a `.env` file first when present (missing file is fine).
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Configuration`] when a numeric variable fails
    /// to parse or a provider variant is missing required fields.
    pub fn from_env() -> crate::error::Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Load configuration through a custom resolver (for tests).
    ///
    /// # Errors
    ///
    /// Same conditions as [`Config::from_env`].
    pub fn from_env_with(
        env: impl Fn(&str) -> Option<String>,
    ) -> crate::error::Result<Self> {
        let get = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let postgres_port = match get("POSTGRES_PORT") {
            Some(v) => v.parse::<u16>().map_err(|_| {
                BotError::Configuration(format!("invalid POSTGRES_PORT: {v:?}"))
            })?,
            None => 5432,
        };

        let ai_embedding_dimensions = match get("AI_EMBEDDING_DIMENSIONS") {
            Some(v) => v.parse::<usize>().map_err(|_| {
                BotError::Configuration(format!("invalid AI_EMBEDDING_DIMENSIONS: {v:?}"))
            })?,
            None => 1536,
        };

        let ai_provider = resolve_provider(&get)?;

        let admin_ids = get("ADMIN_TELEGRAM_IDS")
            .map(|raw| {
                raw.split(',')
                    .filter_map(|part| part.trim().parse::<i64>().ok())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            postgres_db: get("POSTGRES_DB").unwrap_or_else(|| "postgres".to_owned()),
            postgres_user: get("POSTGRES_USER").unwrap_or_else(|| "postgres".to_owned()),
            postgres_password: get("POSTGRES_PASSWORD").unwrap_or_default(),
            postgres_host: get("POSTGRES_HOST").unwrap_or_else(|| "localhost".to_owned()),
            postgres_port,
            telegram_bot_token: get("TELEGRAM_BOT_TOKEN"),
            ai_provider,
            ai_embedding_dimensions,
            ai_embedding_base_url: get("AI_EMBEDDING_BASE_URL"),
            ai_embedding_api_key: get("AI_EMBEDDING_API_KEY"),
            ai_whisper_base_url: get("AI_WHISPER_BASE_URL"),
            ai_whisper_api_key: get("AI_WHISPER_API_KEY"),
            mention_gate_enabled: get("MENTION_GATE_ENABLED")
                .map(|v| parse_bool(&v))
                .unwrap_or(true),
            mention_gate_patterns: get("MENTION_GATE_PATTERNS").unwrap_or_default(),
            skills_dir: get("SKILLS_DIR"),
            admin_ids,
            admin_http_addr: get("ADMIN_HTTP_ADDR"),
            admin_api_key: get("ADMIN_API_KEY"),
            webhook_app_secret: get("WEBHOOK_APP_SECRET"),
            webhook_verify_token: get("WEBHOOK_VERIFY_TOKEN"),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_owned()),
            logs_dir: get("LOGS_DIR").unwrap_or_else(|| "logs".to_owned()),
        })
    }

    /// PostgreSQL connection string for sqlx.
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_host,
            self.postgres_port,
            self.postgres_db,
        )
    }

    /// Returns `true` when the given Telegram user id is an admin.
    pub fn is_admin(&self, telegram_id: i64) -> bool {
        self.admin_ids.contains(&telegram_id)
    }
}

/// Resolve the tagged AI provider variant from `AI_PROVIDER`.
///
/// Missing credentials do not fail startup — they produce
/// [`AiProviderConfig::Disabled`] so the bot still runs without AI
/// features (the first AI call replies with a setup hint). An *unknown*
/// provider name is a hard configuration error.
fn resolve_provider(
    get: &impl Fn(&str) -> Option<String>,
) -> crate::error::Result<AiProviderConfig> {
    let provider = get("AI_PROVIDER").unwrap_or_else(|| "azure".to_owned());

    let config = match provider.as_str() {
        "azure" => {
            let Some(endpoint) = get("AZURE_OPENAI_ENDPOINT") else {
                return Ok(AiProviderConfig::Disabled);
            };
            let Some(api_key) = get("AZURE_OPENAI_API_KEY") else {
                return Ok(AiProviderConfig::Disabled);
            };
            AiProviderConfig::Azure {
                endpoint,
                api_key,
                api_version: get("AZURE_OPENAI_API_VERSION")
                    .unwrap_or_else(|| "2024-10-21".to_owned()),
                chat_deployment: get("AZURE_OPENAI_CHAT_DEPLOYMENT").unwrap_or_default(),
                embedding_deployment: get("AZURE_OPENAI_EMBEDDING_DEPLOYMENT")
                    .unwrap_or_default(),
                whisper_deployment: get("AZURE_OPENAI_WHISPER_DEPLOYMENT")
                    .unwrap_or_else(|| "whisper".to_owned()),
            }
        }
        "openai" => {
            let Some(api_key) = get("AI_API_KEY") else {
                return Ok(AiProviderConfig::Disabled);
            };
            AiProviderConfig::OpenAi {
                api_key,
                chat_model: get("AI_CHAT_MODEL").unwrap_or_else(|| "gpt-4o".to_owned()),
                embedding_model: get("AI_EMBEDDING_MODEL")
                    .unwrap_or_else(|| "text-embedding-3-small".to_owned()),
                whisper_model: get("AI_WHISPER_MODEL")
                    .unwrap_or_else(|| "whisper-1".to_owned()),
            }
        }
        "openai_compatible" => {
            let (Some(base_url), Some(api_key)) = (get("AI_BASE_URL"), get("AI_API_KEY"))
            else {
                return Ok(AiProviderConfig::Disabled);
            };
            AiProviderConfig::OpenAiCompatible {
                base_url,
                api_key,
                chat_model: get("AI_CHAT_MODEL").unwrap_or_default(),
                embedding_model: get("AI_EMBEDDING_MODEL").unwrap_or_default(),
                whisper_model: get("AI_WHISPER_MODEL")
                    .unwrap_or_else(|| "whisper-1".to_owned()),
            }
        }
        other => {
            return Err(BotError::Configuration(format!(
                "unknown AI_PROVIDER: {other:?} (expected azure, openai, or openai_compatible)"
            )));
        }
    };

    Ok(config)
}

/// Parse common boolean spellings: `1/0`, `true/false`, `yes/no`, `on/off`.
fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
