//! Message repository — every incoming message stored as text for retrieval.
//!
//! Ingest is idempotent per `(platform, platform_message_id)`: replaying
//! the same update inserts nothing and returns the existing row.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{MessageRecord, MessageType};
use crate::error::Result;

type MessageRow = (
    i64,
    Option<i64>,
    Option<i64>,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    bool,
    DateTime<Utc>,
);

const MESSAGE_COLUMNS: &str = "id, project_id, user_id, platform, platform_chat_id, \
     platform_message_id, message_type, raw_text, file_ref, transcribed_text, \
     is_from_bot, created_at";

fn row_to_message(row: MessageRow) -> Result<MessageRecord> {
    let (
        id,
        project_id,
        user_id,
        platform,
        platform_chat_id,
        platform_message_id,
        message_type,
        raw_text,
        file_ref,
        transcribed_text,
        is_from_bot,
        created_at,
    ) = row;
    Ok(MessageRecord {
        id,
        project_id,
        user_id,
        platform,
        platform_chat_id,
        platform_message_id,
        message_type: MessageType::parse(&message_type)?,
        raw_text,
        file_ref,
        transcribed_text,
        is_from_bot,
        created_at,
    })
}

/// Outcome of an idempotent insert.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    /// The stored (or pre-existing) row.
    pub record: MessageRecord,
    /// `false` when the `(platform, platform_message_id)` pair had
    /// already been ingested.
    pub inserted: bool,
}

/// Insert a message, deduplicating on `(platform, platform_message_id)`.
#[allow(clippy::too_many_arguments)]
pub async fn create_message(
    db: &PgPool,
    project_id: Option<i64>,
    user_id: Option<i64>,
    platform: &str,
    platform_chat_id: &str,
    platform_message_id: Option<&str>,
    message_type: MessageType,
    raw_text: Option<&str>,
    file_ref: Option<&str>,
    transcribed_text: Option<&str>,
    is_from_bot: bool,
) -> Result<StoredMessage> {
    if let Some(message_id) = platform_message_id {
        let existing = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE platform = $1 AND platform_message_id = $2"
        ))
        .bind(platform)
        .bind(message_id)
        .fetch_optional(db)
        .await?;

        if let Some(row) = existing {
            return Ok(StoredMessage {
                record: row_to_message(row)?,
                inserted: false,
            });
        }
    }

    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "INSERT INTO messages \
             (project_id, user_id, platform, platform_chat_id, platform_message_id, \
              message_type, raw_text, file_ref, transcribed_text, is_from_bot) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (platform, platform_message_id) \
             WHERE platform_message_id IS NOT NULL DO NOTHING \
         RETURNING {MESSAGE_COLUMNS}"
    ))
    .bind(project_id)
    .bind(user_id)
    .bind(platform)
    .bind(platform_chat_id)
    .bind(platform_message_id)
    .bind(message_type.as_str())
    .bind(raw_text)
    .bind(file_ref)
    .bind(transcribed_text)
    .bind(is_from_bot)
    .fetch_optional(db)
    .await?;

    match row {
        Some(row) => Ok(StoredMessage {
            record: row_to_message(row)?,
            inserted: true,
        }),
        // Lost a race with a concurrent ingest of the same update.
        None => {
            let message_id = platform_message_id.unwrap_or_default();
            let row = sqlx::query_as::<_, MessageRow>(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages \
                 WHERE platform = $1 AND platform_message_id = $2"
            ))
            .bind(platform)
            .bind(message_id)
            .fetch_one(db)
            .await?;
            Ok(StoredMessage {
                record: row_to_message(row)?,
                inserted: false,
            })
        }
    }
}

/// Recent messages of one user within a project, newest first.
pub async fn get_recent_messages_for_user(
    db: &PgPool,
    project_id: i64,
    user_id: i64,
    limit: i64,
) -> Result<Vec<MessageRecord>> {
    let rows = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages \
         WHERE project_id = $1 AND user_id = $2 AND NOT is_from_bot \
         ORDER BY id DESC LIMIT $3"
    ))
    .bind(project_id)
    .bind(user_id)
    .bind(limit)
    .fetch_all(db)
    .await?;
    rows.into_iter().map(row_to_message).collect()
}

/// Per-user message counts within a project, descending.
pub async fn get_message_counts_by_user(
    db: &PgPool,
    project_id: i64,
) -> Result<Vec<(i64, i64)>> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT user_id, COUNT(*) FROM messages \
         WHERE project_id = $1 AND user_id IS NOT NULL AND NOT is_from_bot \
         GROUP BY user_id \
         ORDER BY COUNT(*) DESC",
    )
    .bind(project_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Messages of a project that have no embedding yet (backfill), oldest
/// first so the index grows chronologically.
pub async fn get_messages_without_embeddings(
    db: &PgPool,
    project_id: i64,
    limit: i64,
) -> Result<Vec<MessageRecord>> {
    let rows = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages m \
         WHERE m.project_id = $1 AND NOT m.is_from_bot \
           AND NOT EXISTS (\
               SELECT 1 FROM embeddings e \
               WHERE e.project_id = m.project_id \
                 AND (e.metadata ->> 'message_id')::bigint = m.id) \
         ORDER BY m.id LIMIT $2"
    ))
    .bind(project_id)
    .bind(limit)
    .fetch_all(db)
    .await?;
    rows.into_iter().map(row_to_message).collect()
}
