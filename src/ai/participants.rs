//! Per-participant contribution summaries.
//!
//! Collects up to 200 messages per project member, renders them as a
//! dated log, and asks the chat model for a 4-point summary. Results
//! are ordered by message count, descending.

use sqlx::PgPool;

use crate::ai::chat::format_messages;
use crate::ai::{AiClient, ChatMessage};
use crate::db;
use crate::error::Result;
use crate::skills::SkillRegistry;

/// Messages collected per participant.
const MAX_MESSAGES_PER_USER: i64 = 200;

/// Sampling temperature for summaries.
const SUMMARY_TEMPERATURE: f64 = 0.3;

/// Token cap per summary.
const SUMMARY_MAX_TOKENS: u32 = 1000;

/// Fallback prompt when the `participant-summary` skill is missing.
const PARTICIPANT_PROMPT_FALLBACK: &str = "\
Ты — аналитик ремонтных проектов. Тебе дан список сообщений одного \
участника чата по ремонту квартиры.

Составь краткое резюме вклада этого участника:
1. Что он делал (какие работы выполнил или организовал)
2. Что он купил (материалы, оборудование)
3. Какие суммы упоминались
4. Ключевые решения или проблемы

Отвечай на русском. Будь кратким, по делу. \
Если информации мало — скажи об этом честно.";

/// Summary of one participant's contributions.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantSummary {
    /// Internal user id.
    pub user_id: i64,
    /// Display name.
    pub user_name: String,
    /// Number of messages considered.
    pub message_count: i64,
    /// AI-generated 4-point summary.
    pub summary: String,
}

/// Summarize every participant with messages in the project, ordered by
/// message count descending.
pub async fn summarize_all_participants(
    db: &PgPool,
    ai: &AiClient,
    skills: &SkillRegistry,
    project_id: i64,
) -> Result<Vec<ParticipantSummary>> {
    let counts = db::messages::get_message_counts_by_user(db, project_id).await?;
    let prompt = skills
        .get_prompt("participant-summary")
        .unwrap_or(PARTICIPANT_PROMPT_FALLBACK);

    let mut results = Vec::with_capacity(counts.len());
    for (user_id, message_count) in counts {
        let user = db::users::get_user_by_id(db, user_id).await?;
        let user_name = user
            .map(|u| u.full_name)
            .unwrap_or_else(|| format!("Участник #{user_id}"));

        let mut messages = db::messages::get_recent_messages_for_user(
            db,
            project_id,
            user_id,
            MAX_MESSAGES_PER_USER,
        )
        .await?;
        messages.reverse();

        if messages.is_empty() {
            continue;
        }

        let log = format_messages(&messages, &format!("Сообщения {user_name}"));
        let request = [
            ChatMessage::system(prompt),
            ChatMessage::user(format!(
                "Участник: {user_name}\nКоличество сообщений: {}\n\n{log}",
                messages.len()
            )),
        ];

        let summary = ai
            .chat_completion(&request, SUMMARY_TEMPERATURE, SUMMARY_MAX_TOKENS)
            .await?;

        results.push(ParticipantSummary {
            user_id,
            user_name,
            message_count,
            summary,
        });
    }

    Ok(results)
}
