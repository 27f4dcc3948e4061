//! User repository.

use sqlx::PgPool;

use crate::domain::User;
use crate::error::Result;

const USER_COLUMNS: &str =
    "id, telegram_id, whatsapp_id, full_name, phone, is_bot_started, created_at";

/// Look up a user by internal id.
pub async fn get_user_by_id(db: &PgPool, user_id: i64) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

/// Look up a user by Telegram id.
pub async fn get_user_by_telegram_id(db: &PgPool, telegram_id: i64) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE telegram_id = $1"
    ))
    .bind(telegram_id)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

/// Create or refresh a user on `/start`.
///
/// Sets `is_bot_started` and keeps the freshest display name.
pub async fn upsert_telegram_user(
    db: &PgPool,
    telegram_id: i64,
    full_name: &str,
) -> Result<User> {
    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (telegram_id, full_name, is_bot_started) \
         VALUES ($1, $2, TRUE) \
         ON CONFLICT (telegram_id) \
         DO UPDATE SET full_name = EXCLUDED.full_name, is_bot_started = TRUE \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(telegram_id)
    .bind(full_name)
    .fetch_one(db)
    .await?;
    Ok(user)
}

/// Create a placeholder user during an invitation.
///
/// The invitee has no platform id yet; they are matched up later when
/// they press /start (by name or phone, handled at the service level).
pub async fn create_placeholder_user(
    db: &PgPool,
    full_name: &str,
    phone: Option<&str>,
) -> Result<User> {
    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (full_name, phone, is_bot_started) \
         VALUES ($1, $2, FALSE) \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(full_name)
    .bind(phone)
    .fetch_one(db)
    .await?;
    Ok(user)
}
