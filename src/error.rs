//! Error taxonomy shared by repositories, services, and handlers.
//!
//! Repositories raise [`BotError::Database`]; services translate domain
//! violations into the typed variants; handlers translate variants into
//! user-visible replies. No error escapes a handler unlogged.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BotError>;

/// Typed errors produced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Bad user input (date format, amount, empty required field).
    ///
    /// Returned inline with a corrective hint; conversation state is
    /// preserved so the user can retry.
    #[error("validation error: {0}")]
    Validation(String),

    /// The user lacks the permission required for an action.
    #[error("not allowed: {0}")]
    Authorization(String),

    /// A project, stage, or other entity is missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate token, duplicate chat link, already-assigned role.
    ///
    /// The message carries a summary of the pre-existing entity.
    #[error("conflict: {0}")]
    Integrity(String),

    /// Platform API or AI-provider failure.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Missing secrets or malformed provider settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl BotError {
    /// A short human-readable reply for the end user.
    ///
    /// Validation, authorization, not-found, and integrity errors carry
    /// their own message; upstream and database failures are collapsed
    /// into a generic "try again" so internals never leak into chat.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg)
            | Self::Authorization(msg)
            | Self::NotFound(msg)
            | Self::Integrity(msg) => msg.clone(),
            Self::Configuration(_) => {
                "⚠️ AI-сервис не настроен. Обратитесь к администратору.".to_owned()
            }
            Self::Upstream(_) | Self::Database(_) => {
                "⚠️ Что-то пошло не так. Попробуйте ещё раз.".to_owned()
            }
        }
    }

    /// Whether the conversation state should survive this error.
    ///
    /// Validation errors keep the state so the user can correct the
    /// input; everything else ends the flow.
    pub fn keeps_state(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}
