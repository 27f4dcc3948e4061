//! Domain entities and enumerations.
//!
//! Enums are stored as text in PostgreSQL; every enum carries an
//! `as_str`/`parse` pair so repository code round-trips them without a
//! database-side enum type.

pub mod templates;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BotError;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of renovation a project undergoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenovationType {
    /// Surface refresh: paint, wallpaper, flooring.
    Cosmetic,
    /// Typical full renovation.
    Standard,
    /// Major renovation with replanning.
    Major,
    /// Designer renovation from an architectural plan.
    Designer,
}

impl RenovationType {
    /// Returns the string representation stored in PostgreSQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosmetic => "cosmetic",
            Self::Standard => "standard",
            Self::Major => "major",
            Self::Designer => "designer",
        }
    }

    /// Parse from a database text value.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Validation`] if the value is not a recognised type.
    pub fn parse(s: &str) -> crate::error::Result<Self> {
        match s {
            "cosmetic" => Ok(Self::Cosmetic),
            "standard" => Ok(Self::Standard),
            "major" => Ok(Self::Major),
            "designer" => Ok(Self::Designer),
            other => Err(BotError::Validation(format!(
                "Неизвестный тип ремонта: {other}"
            ))),
        }
    }

    /// Russian display label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cosmetic => "Косметический",
            Self::Standard => "Стандартный",
            Self::Major => "Капитальный",
            Self::Designer => "Дизайнерский",
        }
    }
}

/// Role a user holds within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    /// The client; exactly one per project.
    Owner,
    /// A second client with read access.
    CoOwner,
    /// Runs the works on site.
    Foreman,
    /// A tradesperson responsible for specific stages.
    Tradesperson,
    /// Interior designer.
    Designer,
    /// Materials / furniture supplier.
    Supplier,
    /// Independent quality expert.
    Expert,
    /// Read-only participant.
    Viewer,
}

impl RoleType {
    /// Returns the string representation stored in PostgreSQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::CoOwner => "co_owner",
            Self::Foreman => "foreman",
            Self::Tradesperson => "tradesperson",
            Self::Designer => "designer",
            Self::Supplier => "supplier",
            Self::Expert => "expert",
            Self::Viewer => "viewer",
        }
    }

    /// Parse from a database text value.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Validation`] if the value is not a recognised role.
    pub fn parse(s: &str) -> crate::error::Result<Self> {
        match s {
            "owner" => Ok(Self::Owner),
            "co_owner" => Ok(Self::CoOwner),
            "foreman" => Ok(Self::Foreman),
            "tradesperson" => Ok(Self::Tradesperson),
            "designer" => Ok(Self::Designer),
            "supplier" => Ok(Self::Supplier),
            "expert" => Ok(Self::Expert),
            "viewer" => Ok(Self::Viewer),
            other => Err(BotError::Validation(format!("Неизвестная роль: {other}"))),
        }
    }

    /// Russian display label with an icon.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Owner => "👑 Владелец",
            Self::CoOwner => "👥 Совладелец",
            Self::Foreman => "👷 Прораб",
            Self::Tradesperson => "🔧 Мастер",
            Self::Designer => "🎨 Дизайнер",
            Self::Supplier => "📦 Поставщик",
            Self::Expert => "🔍 Эксперт",
            Self::Viewer => "👁 Наблюдатель",
        }
    }
}

/// Work status of a stage or sub-stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not started.
    Planned,
    /// Currently active.
    InProgress,
    /// Finished.
    Completed,
    /// Behind schedule or sent back after a rejected checkpoint.
    Delayed,
}

impl StageStatus {
    /// Returns the string representation stored in PostgreSQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Delayed => "delayed",
        }
    }

    /// Parse from a database text value.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Validation`] if the value is not a recognised status.
    pub fn parse(s: &str) -> crate::error::Result<Self> {
        match s {
            "planned" => Ok(Self::Planned),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "delayed" => Ok(Self::Delayed),
            other => Err(BotError::Validation(format!(
                "Неизвестный статус этапа: {other}"
            ))),
        }
    }

    /// Russian display label with an icon.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Planned => "📋 Запланирован",
            Self::InProgress => "🔨 В работе",
            Self::Completed => "✅ Завершён",
            Self::Delayed => "⚠️ Задержка",
        }
    }

    /// Icon only, for compact listings.
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Planned => "📋",
            Self::InProgress => "🔨",
            Self::Completed => "✅",
            Self::Delayed => "⚠️",
        }
    }
}

/// Payment lifecycle status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Expense recorded, nothing paid.
    Recorded,
    /// Payment being arranged.
    InProgress,
    /// Work verified, ready to pay.
    Verified,
    /// Paid out.
    Paid,
    /// Settled and archived; terminal.
    Closed,
}

impl PaymentStatus {
    /// Returns the string representation stored in PostgreSQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recorded => "recorded",
            Self::InProgress => "in_progress",
            Self::Verified => "verified",
            Self::Paid => "paid",
            Self::Closed => "closed",
        }
    }

    /// Parse from a database text value.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Validation`] if the value is not a recognised status.
    pub fn parse(s: &str) -> crate::error::Result<Self> {
        match s {
            "recorded" => Ok(Self::Recorded),
            "in_progress" => Ok(Self::InProgress),
            "verified" => Ok(Self::Verified),
            "paid" => Ok(Self::Paid),
            "closed" => Ok(Self::Closed),
            other => Err(BotError::Validation(format!(
                "Неизвестный статус оплаты: {other}"
            ))),
        }
    }

    /// Russian display label with an icon.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Recorded => "📝 Записано",
            Self::InProgress => "🔄 В процессе",
            Self::Verified => "✅ Проверено",
            Self::Paid => "💸 Оплачено",
            Self::Closed => "🔒 Закрыто",
        }
    }
}

/// Budget expense category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetCategory {
    Electrical,
    Plumbing,
    Walls,
    Flooring,
    Tiling,
    Ceilings,
    Doors,
    Furniture,
    Demolition,
    Painting,
    Other,
}

impl BudgetCategory {
    /// All categories, in display order.
    pub const ALL: [Self; 11] = [
        Self::Electrical,
        Self::Plumbing,
        Self::Walls,
        Self::Flooring,
        Self::Tiling,
        Self::Ceilings,
        Self::Doors,
        Self::Furniture,
        Self::Demolition,
        Self::Painting,
        Self::Other,
    ];

    /// Returns the string representation stored in PostgreSQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electrical => "electrical",
            Self::Plumbing => "plumbing",
            Self::Walls => "walls",
            Self::Flooring => "flooring",
            Self::Tiling => "tiling",
            Self::Ceilings => "ceilings",
            Self::Doors => "doors",
            Self::Furniture => "furniture",
            Self::Demolition => "demolition",
            Self::Painting => "painting",
            Self::Other => "other",
        }
    }

    /// Parse from a database text value.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Validation`] if the value is not a recognised category.
    pub fn parse(s: &str) -> crate::error::Result<Self> {
        match s {
            "electrical" => Ok(Self::Electrical),
            "plumbing" => Ok(Self::Plumbing),
            "walls" => Ok(Self::Walls),
            "flooring" => Ok(Self::Flooring),
            "tiling" => Ok(Self::Tiling),
            "ceilings" => Ok(Self::Ceilings),
            "doors" => Ok(Self::Doors),
            "furniture" => Ok(Self::Furniture),
            "demolition" => Ok(Self::Demolition),
            "painting" => Ok(Self::Painting),
            "other" => Ok(Self::Other),
            other => Err(BotError::Validation(format!(
                "Неизвестная категория: {other}"
            ))),
        }
    }

    /// Russian display label with an icon.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Electrical => "⚡ Электрика",
            Self::Plumbing => "🚿 Сантехника",
            Self::Walls => "🧱 Стены",
            Self::Flooring => "🪵 Полы",
            Self::Tiling => "🔲 Плитка",
            Self::Ceilings => "🏗 Потолки",
            Self::Doors => "🚪 Двери",
            Self::Furniture => "🪑 Мебель",
            Self::Demolition => "🔨 Демонтаж",
            Self::Painting => "🎨 Покраска/обои",
            Self::Other => "📦 Прочее",
        }
    }
}

/// Type of an incoming user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Plain text (or an image caption).
    Text,
    /// Voice note, transcribed via STT.
    Voice,
    /// Photo, described via a vision model.
    Image,
}

impl MessageType {
    /// Returns the string representation stored in PostgreSQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
            Self::Image => "image",
        }
    }

    /// Parse from a database text value.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Validation`] if the value is not a recognised type.
    pub fn parse(s: &str) -> crate::error::Result<Self> {
        match s {
            "text" => Ok(Self::Text),
            "voice" => Ok(Self::Voice),
            "image" => Ok(Self::Image),
            other => Err(BotError::Validation(format!(
                "Неизвестный тип сообщения: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// An independent messaging-platform identity (bot token + username).
///
/// Users and projects of different tenants are isolated from each other
/// even though they live in the same process and database.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Tenant {
    /// Database row id.
    pub id: i64,
    /// Display name (defaults to the bot's first name).
    pub name: String,
    /// Telegram bot token; unique, secret.
    pub bot_token: String,
    /// Bot `@username`, discovered at startup and persisted.
    pub bot_username: Option<String>,
    /// Soft-deactivation flag.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A person who interacts with the bot, on any platform.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    /// Database row id.
    pub id: i64,
    /// Telegram user id, unique when set.
    pub telegram_id: Option<i64>,
    /// WhatsApp identifier, unique when set.
    pub whatsapp_id: Option<String>,
    /// Display name.
    pub full_name: String,
    /// Phone number, when known (invitation placeholders).
    pub phone: Option<String>,
    /// Whether the user has pressed /start on the bot.
    pub is_bot_started: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A renovation project — the central entity ("passport").
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    /// Database row id.
    pub id: i64,
    /// Owning tenant; `None` only for pre-multi-tenant rows awaiting
    /// adoption by the default tenant.
    pub tenant_id: Option<i64>,
    /// Project name.
    pub name: String,
    /// Street address.
    pub address: Option<String>,
    /// Apartment area in square metres.
    pub area_sqm: Option<f64>,
    /// Renovation kind.
    pub renovation_type: RenovationType,
    /// Total budget cap.
    pub total_budget: Option<f64>,
    /// Linked Telegram group chat; unique when set.
    pub telegram_chat_id: Option<i64>,
    /// Soft-deactivation flag.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A major work phase in a project.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    /// Database row id.
    pub id: i64,
    /// Owning project.
    pub project_id: i64,
    /// Stage name (e.g. "Демонтаж").
    pub name: String,
    /// Position: main stages 1..13, parallel stages ≥100. Unique per project.
    pub order: i32,
    /// Work status.
    pub status: StageStatus,
    /// Payment lifecycle status.
    pub payment_status: PaymentStatus,
    /// Stage budget cap.
    pub budget: Option<f64>,
    /// Planned start.
    pub start_date: Option<DateTime<Utc>>,
    /// Planned end; must be after `start_date` when both are set.
    pub end_date: Option<DateTime<Utc>>,
    /// Responsible user, when they have an account.
    pub responsible_user_id: Option<i64>,
    /// Free-form responsible contact when there is no user record.
    pub responsible_contact: Option<String>,
    /// Whether this stage is part of a parallel furniture sub-pipeline.
    pub is_parallel: bool,
    /// Whether completing this stage requires owner approval.
    pub is_checkpoint: bool,
    /// Refreshed on every status change; drives idle-stage prompts.
    pub last_activity_at: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Stage {
    /// Whether the stage is overdue relative to `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, StageStatus::InProgress | StageStatus::Delayed)
            && self.end_date.is_some_and(|end| end < now)
    }
}

/// A task within a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct SubStage {
    /// Database row id.
    pub id: i64,
    /// Owning stage.
    pub stage_id: i64,
    /// Sub-stage name.
    pub name: String,
    /// Position within the stage.
    pub order: i32,
    /// Work status.
    pub status: StageStatus,
    /// Planned start.
    pub start_date: Option<DateTime<Utc>>,
    /// Planned end.
    pub end_date: Option<DateTime<Utc>>,
    /// Responsible user.
    pub responsible_user_id: Option<i64>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A budget expense entry within a project.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetItem {
    /// Database row id.
    pub id: i64,
    /// Owning project.
    pub project_id: i64,
    /// Related stage, when the expense is stage-specific.
    pub stage_id: Option<i64>,
    /// Expense category.
    pub category: BudgetCategory,
    /// Free-form description.
    pub description: Option<String>,
    /// Cost of work; never negative.
    pub work_cost: f64,
    /// Cost of materials; never negative.
    pub material_cost: f64,
    /// Prepaid amount; never negative.
    pub prepayment: f64,
    /// Whether the owner confirmed the entry.
    pub is_confirmed: bool,
    /// Who confirmed it.
    pub confirmed_by_user_id: Option<i64>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl BudgetItem {
    /// Total of work + materials + prepayment.
    pub fn total(&self) -> f64 {
        self.work_cost + self.material_cost + self.prepayment
    }
}

/// Immutable audit-trail row; appended on every tracked change.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ChangeLog {
    /// Database row id.
    pub id: i64,
    /// Owning project.
    pub project_id: i64,
    /// Acting user, when known.
    pub user_id: Option<i64>,
    /// Entity kind: "stage", "budget_item", ...
    pub entity_type: String,
    /// Row id of the changed entity.
    pub entity_id: i64,
    /// Field that changed (e.g. "payment_status").
    pub field_name: String,
    /// Previous value, rendered as text.
    pub old_value: Option<String>,
    /// New value, rendered as text.
    pub new_value: Option<String>,
    /// Who confirmed the change, when confirmation applies.
    pub confirmed_by_user_id: Option<i64>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Every incoming message, stored as text for retrieval.
///
/// Canonical text is `transcribed_text` when non-empty, otherwise
/// `raw_text` — see [`MessageRecord::canonical_text`].
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    /// Database row id.
    pub id: i64,
    /// Resolved project; nullable, survives project deletion as NULL.
    pub project_id: Option<i64>,
    /// Resolved sender; nullable.
    pub user_id: Option<i64>,
    /// Source platform: "telegram", "whatsapp".
    pub platform: String,
    /// Chat identifier on the platform.
    pub platform_chat_id: String,
    /// Message identifier on the platform; drives idempotent ingest.
    pub platform_message_id: Option<String>,
    /// Message kind.
    pub message_type: MessageType,
    /// Original text (or image caption).
    pub raw_text: Option<String>,
    /// Platform file reference (Telegram file_id, WhatsApp URL).
    pub file_ref: Option<String>,
    /// STT transcription or vision description.
    pub transcribed_text: Option<String>,
    /// Whether the bot itself sent the message.
    pub is_from_bot: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    /// The text used for indexing, search, and AI context.
    pub fn canonical_text(&self) -> Option<&str> {
        self.transcribed_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or(self.raw_text.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}
