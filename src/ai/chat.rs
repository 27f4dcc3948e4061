//! Interactive chat mode for owners and co-owners.
//!
//! Each turn gathers full project context, the team roster with message
//! counts, per-category budget, recent messages of any participant the
//! question mentions by name, and hybrid-search results — all folded
//! into the system message. A sliding window keeps the last 10 turns.

use sqlx::PgPool;
use tracing::info;

use crate::ai::search::{self, DEFAULT_FTS_WEIGHT, DEFAULT_VECTOR_WEIGHT};
use crate::ai::{rag, AiClient, ChatMessage};
use crate::db;
use crate::domain::{MessageRecord, MessageType, Project};
use crate::error::Result;
use crate::services::roles::format_role_list;
use crate::skills::SkillRegistry;

/// Conversation turns kept in the sliding window (a turn is one user +
/// one assistant message).
pub const MAX_HISTORY_TURNS: usize = 10;

/// Snippets retrieved per chat turn.
const CHAT_TOP_K: i64 = 8;

/// Minimum cosine similarity for the vector arm in chat mode.
const CHAT_MIN_SIMILARITY: f64 = 0.15;

/// Sampling temperature for chat answers.
const CHAT_TEMPERATURE: f64 = 0.4;

/// Token cap for chat answers.
const CHAT_MAX_TOKENS: u32 = 2000;

/// Recent messages pulled for a mentioned participant.
const MENTIONED_MESSAGES_LIMIT: i64 = 30;

/// Fallback system prompt when the `chat-assistant` skill is missing.
const CHAT_SYSTEM_PROMPT_FALLBACK: &str = "\
Ты — AI-ассистент по управлению ремонтом квартиры. Ты работаешь с владельцем \
проекта и отвечаешь на любые вопросы о ремонте.

Тебе доступна полная информация о проекте:
- Параметры проекта (название, адрес, тип, бюджет)
- Этапы работ (статусы, сроки, ответственные)
- Бюджет по категориям (работы, материалы, предоплаты)
- Команда проекта (участники, роли, активность)
- История сообщений участников (что писали, покупки, решения)
- Результаты поиска по сообщениям (семантический + полнотекстовый)

Правила:
1. Отвечай на русском языке
2. Будь кратким и по делу
3. Если вопрос о конкретном участнике — используй данные его сообщений
4. Если вопрос о бюджете — указывай конкретные суммы
5. Если вопрос о сроках — указывай конкретные даты
6. Не придумывай информацию, которой нет в контексте
7. Если информации недостаточно — честно скажи об этом
8. Форматируй ответ для мессенджера (короткие абзацы)";

/// Handle one conversational turn; returns the answer and the updated
/// (trimmed) history including the new user/assistant pair.
pub async fn chat_with_project(
    db: &PgPool,
    ai: &AiClient,
    skills: &SkillRegistry,
    project: &Project,
    user_message: &str,
    history: Vec<ChatMessage>,
) -> Result<(String, Vec<ChatMessage>)> {
    // 1. Structured project context.
    let project_ctx = rag::build_project_context(db, project).await?;

    // 2. Team roster with per-user message counts.
    let team = db::projects::get_project_team(db, project.id).await?;
    let counts = db::messages::get_message_counts_by_user(db, project.id).await?;
    let count_of = |user_id: i64| {
        counts
            .iter()
            .find(|(id, _)| *id == user_id)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    };

    let mut roster_lines = vec!["=== Команда проекта ===".to_owned()];
    if team.is_empty() {
        roster_lines.push("Команда: нет участников.".to_owned());
    }
    for member in &team {
        roster_lines.push(format!(
            "  • {} — роли: {}, сообщений: {}",
            member.user.full_name,
            format_role_list(&member.roles),
            count_of(member.user.id),
        ));
    }

    // 3. Recent messages of participants mentioned in the question.
    let question_lower = user_message.to_lowercase();
    let mut participant_blocks: Vec<String> = Vec::new();
    for member in &team {
        let name_lower = member.user.full_name.to_lowercase();
        let mentioned = question_lower.contains(&name_lower)
            || name_lower
                .split_whitespace()
                .filter(|part| part.chars().count() >= 3)
                .any(|part| question_lower.contains(part));
        if !mentioned {
            continue;
        }
        let messages = db::messages::get_recent_messages_for_user(
            db,
            project.id,
            member.user.id,
            MENTIONED_MESSAGES_LIMIT,
        )
        .await?;
        if messages.is_empty() {
            continue;
        }
        let mut ordered = messages;
        ordered.reverse();
        participant_blocks.push(format_messages(
            &ordered,
            &format!("Сообщения от {}", member.user.full_name),
        ));
    }

    // 4. Hybrid search on the question itself.
    let search_results = search::search_hybrid(
        db,
        ai,
        project.id,
        user_message,
        CHAT_TOP_K,
        DEFAULT_VECTOR_WEIGHT,
        DEFAULT_FTS_WEIGHT,
        CHAT_MIN_SIMILARITY,
    )
    .await?;
    let search_block = format_search_results(&search_results);

    // 5. Fold everything into the system message.
    let mut context_parts = vec![project_ctx, roster_lines.join("\n")];
    context_parts.extend(participant_blocks);
    if !search_block.is_empty() {
        context_parts.push(search_block);
    }

    let system_prompt = skills
        .get_prompt("chat-assistant")
        .unwrap_or(CHAT_SYSTEM_PROMPT_FALLBACK);
    let system_content = format!("{system_prompt}\n\n{}", context_parts.join("\n\n"));

    // 6. System + trimmed history + the new user message.
    let trimmed: Vec<ChatMessage> = history
        .into_iter()
        .rev()
        .take(MAX_HISTORY_TURNS * 2)
        .rev()
        .collect();

    let mut messages = Vec::with_capacity(trimmed.len() + 2);
    messages.push(ChatMessage::system(system_content));
    messages.extend(trimmed.iter().cloned());
    messages.push(ChatMessage::user(user_message));

    let answer = ai
        .chat_completion(&messages, CHAT_TEMPERATURE, CHAT_MAX_TOKENS)
        .await?;

    // 7. Append the new pair and trim again.
    let mut new_history = trimmed;
    new_history.push(ChatMessage::user(user_message));
    new_history.push(ChatMessage::assistant(answer.clone()));
    let overflow = new_history.len().saturating_sub(MAX_HISTORY_TURNS * 2);
    new_history.drain(..overflow);

    info!(
        project_id = project.id,
        search_results = search_results.len(),
        history_turns = new_history.len() / 2,
        "chat turn completed"
    );
    Ok((answer, new_history))
}

/// Render messages as a dated log for AI context.
pub fn format_messages(messages: &[MessageRecord], label: &str) -> String {
    let mut lines = vec![format!("=== {label} ===")];
    for msg in messages {
        let date = msg.created_at.format("%d.%m.%Y %H:%M");
        let text = msg.canonical_text().unwrap_or_default();
        let tag = match msg.message_type {
            MessageType::Text => String::new(),
            other => format!("[{}] ", other.as_str()),
        };
        lines.push(format!("[{date}] {tag}{text}"));
    }
    lines.join("\n")
}

fn format_search_results(results: &[search::SearchResult]) -> String {
    if results.is_empty() {
        return String::new();
    }
    let mut lines = vec!["=== Результаты поиска ===".to_owned()];
    for (i, r) in results.iter().enumerate() {
        let source = r
            .metadata
            .as_ref()
            .and_then(|m| m.get("source"))
            .and_then(|v| v.as_str())
            .unwrap_or("сообщение");
        let arms = r.sources.join("/");
        let snippet: String = r.content.chars().take(300).collect();
        lines.push(format!("{}. [{source}] [{arms}]: {snippet}", i + 1));
    }
    lines.join("\n")
}
