//! RAG answering — retrieval-augmented answers to project questions.
//!
//! 1. check the answer cache,
//! 2. load structured project context,
//! 3. run hybrid search for the question,
//! 4. compose the prompt (skill-provided system prompt with a fallback),
//! 5. call the chat provider,
//! 6. cache the answer for five minutes.

use sqlx::PgPool;
use tracing::{debug, info};

use crate::ai::search::{self, DEFAULT_FTS_WEIGHT, DEFAULT_VECTOR_WEIGHT};
use crate::ai::{AiClient, ChatMessage};
use crate::db;
use crate::domain::Project;
use crate::error::Result;
use crate::services::budget::format_amount;
use crate::services::stage::format_date;
use crate::skills::SkillRegistry;

/// Retrieved snippets per question.
const ASK_TOP_K: i64 = 5;

/// Minimum cosine similarity for the vector arm.
const ASK_MIN_SIMILARITY: f64 = 0.25;

/// Sampling temperature for RAG answers.
const ASK_TEMPERATURE: f64 = 0.4;

/// Token cap for RAG answers.
const ASK_MAX_TOKENS: u32 = 1500;

/// Fallback system prompt when the `rag-assistant` skill is missing.
const RAG_SYSTEM_PROMPT_FALLBACK: &str = "\
Ты — умный помощник по ремонту квартир. Ты помогаешь клиентам, прорабам \
и дизайнерам управлять ремонтом.

Тебе доступен контекст проекта (этапы, бюджет, сообщения). Используй его для ответа.

Правила:
1. Отвечай на русском языке
2. Будь кратким и по делу
3. Если в контексте нет информации для ответа — честно скажи об этом
4. Если вопрос касается бюджета — указывай конкретные суммы из контекста
5. Если вопрос касается сроков — указывай конкретные даты
6. Не придумывай информацию, которой нет в контексте
7. Форматируй ответ для мессенджера (короткие абзацы, без длинных таблиц)";

/// Cache key for a question: `ask:<project_id>:<12-hex md5 of the
/// lowercased question>`.
pub fn ask_cache_key(project_id: i64, question: &str) -> String {
    let digest = md5::compute(question.trim().to_lowercase().as_bytes());
    let hex = format!("{digest:x}");
    format!("ask:{project_id}:{}", &hex[..12])
}

/// Build a text summary of project state for AI context: header, stages
/// with dates and statuses, budget totals, per-category breakdown.
pub async fn build_project_context(db: &PgPool, project: &Project) -> Result<String> {
    let mut parts: Vec<String> = Vec::new();

    parts.push(format!(
        "Проект: {}\nАдрес: {}\nТип ремонта: {}\nОбщий бюджет: {}",
        project.name,
        project.address.as_deref().unwrap_or("не указан"),
        project.renovation_type.label(),
        project
            .total_budget
            .map(format_amount)
            .unwrap_or_else(|| "не задан".to_owned()),
    ));

    let stages = db::stages::get_stages_for_project(db, project.id).await?;
    if !stages.is_empty() {
        let mut lines = vec!["Этапы:".to_owned()];
        for s in &stages {
            let mut line = format!("  {}. {} — {}", s.order, s.name, s.status.label());
            if s.start_date.is_some() {
                line.push_str(&format!(" (с {})", format_date(s.start_date)));
            }
            if s.end_date.is_some() {
                line.push_str(&format!(" (до {})", format_date(s.end_date)));
            }
            if let Some(budget) = s.budget {
                line.push_str(&format!(" [бюджет: {}]", format_amount(budget)));
            }
            lines.push(line);
        }
        parts.push(lines.join("\n"));
    }

    let totals = crate::services::budget::project_totals(db, project.id).await?;
    parts.push(format!(
        "Бюджет: потрачено {} из {}\n  Работы: {}\n  Материалы: {}\n  Предоплаты: {}",
        format_amount(totals.total_spent),
        project
            .total_budget
            .map(format_amount)
            .unwrap_or_else(|| "не задано".to_owned()),
        format_amount(totals.total_work),
        format_amount(totals.total_materials),
        format_amount(totals.total_prepayments),
    ));

    let categories = db::budget::get_category_summaries(db, project.id).await?;
    if !categories.is_empty() {
        let mut lines = vec!["Расходы по категориям:".to_owned()];
        for c in &categories {
            lines.push(format!(
                "  {}: {} (работы {}, материалы {}, предоплаты {})",
                c.category,
                format_amount(c.total_spent),
                format_amount(c.total_work),
                format_amount(c.total_materials),
                format_amount(c.total_prepayments),
            ));
        }
        parts.push(lines.join("\n"));
    }

    Ok(parts.join("\n\n"))
}

/// Answer a question about a project using RAG, with answer caching.
pub async fn ask_project(
    db: &PgPool,
    ai: &AiClient,
    skills: &SkillRegistry,
    project: &Project,
    question: &str,
) -> Result<String> {
    let cache_key = ask_cache_key(project.id, question);
    if let Some(cached) = db::cache::cache_get(db, &cache_key).await? {
        if let Some(answer) = cached.as_str() {
            debug!(project_id = project.id, "RAG answer served from cache");
            return Ok(answer.to_owned());
        }
    }

    let project_context = build_project_context(db, project).await?;

    let chunks = search::search_hybrid(
        db,
        ai,
        project.id,
        question,
        ASK_TOP_K,
        DEFAULT_VECTOR_WEIGHT,
        DEFAULT_FTS_WEIGHT,
        ASK_MIN_SIMILARITY,
    )
    .await?;

    let mut context_parts = vec![format!(
        "=== Текущее состояние проекта ===\n{project_context}"
    )];
    if !chunks.is_empty() {
        let mut lines = vec!["=== Релевантные сообщения и записи ===".to_owned()];
        for (i, chunk) in chunks.iter().enumerate() {
            let meta = chunk.metadata.as_ref();
            let source = meta
                .and_then(|m| m.get("source"))
                .and_then(|v| v.as_str())
                .unwrap_or("сообщение");
            let date = meta
                .and_then(|m| m.get("date"))
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let mut header = format!("[{source}]");
            if !date.is_empty() {
                header.push_str(&format!(" ({date})"));
            }
            lines.push(format!("{}. {header}:\n{}", i + 1, chunk.content));
        }
        context_parts.push(lines.join("\n"));
    }
    let context_block = context_parts.join("\n\n");

    let system_prompt = skills
        .get_prompt("rag-assistant")
        .unwrap_or(RAG_SYSTEM_PROMPT_FALLBACK);

    let messages = [
        ChatMessage::system(system_prompt),
        ChatMessage::user(format!(
            "Контекст проекта:\n{context_block}\n\nВопрос пользователя:\n{question}"
        )),
    ];

    let answer = ai
        .chat_completion(&messages, ASK_TEMPERATURE, ASK_MAX_TOKENS)
        .await?;

    db::cache::cache_set(
        db,
        &cache_key,
        &serde_json::Value::String(answer.clone()),
        db::cache::ASK_TTL_SECONDS,
    )
    .await?;

    info!(
        project_id = project.id,
        chunks = chunks.len(),
        "RAG answer generated"
    );
    Ok(answer)
}
