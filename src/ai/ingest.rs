//! Message ingest — store every non-command message and index it for
//! retrieval.
//!
//! Ingest is idempotent per `(platform, platform_message_id)`; replays
//! create neither a Message nor an Embedding row. Undirected group
//! messages go through the same path silently, which is how the index
//! captures full group context without the bot replying.

use serde_json::json;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::ai::AiClient;
use crate::db;
use crate::domain::{MessageRecord, MessageType};
use crate::error::Result;

/// Input for [`store_and_embed`].
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Resolved project, when the chat maps to one.
    pub project_id: Option<i64>,
    /// Resolved internal user id.
    pub user_id: Option<i64>,
    /// Source platform ("telegram", "whatsapp").
    pub platform: String,
    /// Chat identifier on the platform.
    pub platform_chat_id: String,
    /// Message identifier on the platform.
    pub platform_message_id: Option<String>,
    /// Message kind.
    pub message_type: MessageType,
    /// Original text or caption.
    pub raw_text: Option<String>,
    /// Platform file reference for voice/image.
    pub file_ref: Option<String>,
    /// STT transcription or vision description.
    pub transcribed_text: Option<String>,
}

/// Store a message row and, when a project is resolved and the
/// canonical text is non-empty, generate and insert its embedding.
///
/// Embedding failures are logged and swallowed — the message row always
/// survives, and `/backfill` can index it later.
pub async fn store_and_embed(
    db: &PgPool,
    ai: &AiClient,
    incoming: IncomingMessage,
) -> Result<MessageRecord> {
    let stored = db::messages::create_message(
        db,
        incoming.project_id,
        incoming.user_id,
        &incoming.platform,
        &incoming.platform_chat_id,
        incoming.platform_message_id.as_deref(),
        incoming.message_type,
        incoming.raw_text.as_deref(),
        incoming.file_ref.as_deref(),
        incoming.transcribed_text.as_deref(),
        false,
    )
    .await?;

    if !stored.inserted {
        debug!(
            message_id = stored.record.id,
            "message already ingested, skipping embedding"
        );
        return Ok(stored.record);
    }

    if let Err(e) = embed_message(db, ai, &stored.record).await {
        warn!(
            message_id = stored.record.id,
            error = %e,
            "embedding failed; message stored without index entry"
        );
    }

    Ok(stored.record)
}

/// Generate and insert the embedding for a stored message.
pub async fn embed_message(db: &PgPool, ai: &AiClient, record: &MessageRecord) -> Result<()> {
    let Some(project_id) = record.project_id else {
        return Ok(());
    };
    let Some(text) = record.canonical_text() else {
        return Ok(());
    };
    if !ai.is_configured() {
        debug!(message_id = record.id, "AI not configured, skipping embedding");
        return Ok(());
    }

    let vector = ai.embed(text).await?;
    let metadata = json!({
        "source": "message",
        "message_id": record.id,
        "message_type": record.message_type.as_str(),
        "user_id": record.user_id,
        "date": record.created_at.format("%d.%m.%Y").to_string(),
    });
    db::embeddings::insert_embedding(db, project_id, text, &vector, Some(&metadata)).await?;
    debug!(message_id = record.id, project_id, "message embedded");
    Ok(())
}

/// Backfill embeddings for messages that predate AI configuration.
///
/// Returns the number of messages indexed.
pub async fn backfill_project(
    db: &PgPool,
    ai: &AiClient,
    project_id: i64,
    batch_size: i64,
) -> Result<usize> {
    let pending = db::messages::get_messages_without_embeddings(db, project_id, batch_size).await?;
    let mut indexed = 0;
    for record in &pending {
        if record.canonical_text().is_none() {
            continue;
        }
        match embed_message(db, ai, record).await {
            Ok(()) => indexed += 1,
            Err(e) => warn!(message_id = record.id, error = %e, "backfill embedding failed"),
        }
    }
    Ok(indexed)
}
