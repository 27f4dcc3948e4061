//! Hybrid retrieval: pgvector semantic search + PostgreSQL full-text
//! search, fused with Reciprocal Rank Fusion.

use sqlx::PgPool;
use tracing::debug;

use crate::ai::AiClient;
use crate::db;
use crate::db::embeddings::EmbeddingHit;
use crate::error::Result;

/// Standard RRF constant.
const RRF_K: f64 = 60.0;

/// Default weight of the vector arm.
pub const DEFAULT_VECTOR_WEIGHT: f64 = 0.6;

/// Default weight of the full-text arm.
pub const DEFAULT_FTS_WEIGHT: f64 = 0.4;

/// A fused search result with arm provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Embedding row id.
    pub id: i64,
    /// Stored text.
    pub content: String,
    /// Structured payload (`source`, `message_id`, `user_id`, `date`).
    pub metadata: Option<serde_json::Value>,
    /// Fused RRF score.
    pub score: f64,
    /// Which arms returned this row: "vector" and/or "fts".
    pub sources: Vec<&'static str>,
}

/// Semantic search: embed the query and rank by cosine similarity.
pub async fn search_similar(
    db: &PgPool,
    ai: &AiClient,
    project_id: i64,
    query_text: &str,
    top_k: i64,
    min_similarity: f64,
) -> Result<Vec<EmbeddingHit>> {
    if !ai.is_configured() {
        return Ok(Vec::new());
    }
    let query_vector = ai.embed(query_text).await?;
    let hits =
        db::embeddings::semantic_search(db, project_id, &query_vector, top_k, min_similarity)
            .await?;
    debug!(
        project_id,
        results = hits.len(),
        "semantic search completed"
    );
    Ok(hits)
}

/// Full-text search via the generated tsvector column.
pub async fn search_fulltext(
    db: &PgPool,
    project_id: i64,
    query_text: &str,
    top_k: i64,
) -> Result<Vec<EmbeddingHit>> {
    let tsq = build_tsquery(query_text);
    if tsq.is_empty() {
        return Ok(Vec::new());
    }
    let hits = db::embeddings::fulltext_search(db, project_id, &tsq, top_k).await?;
    debug!(project_id, results = hits.len(), "full-text search completed");
    Ok(hits)
}

/// Build a PostgreSQL tsquery string from a user query.
///
/// Tokens of length ≥ 2 (after stripping punctuation) become prefix
/// matches (`lexeme:*`) OR-joined, compiled under the language-agnostic
/// `simple` configuration so Russian and English both work.
pub fn build_tsquery(query_text: &str) -> String {
    const STRIP: &[char] = &[
        '.', ',', ';', ':', '!', '?', '"', '\'', '(', ')', '[', ']', '{', '}', '«', '»', '—',
        '–', '&', '|', '*', '\\',
    ];

    let tokens: Vec<String> = query_text
        .split_whitespace()
        .map(|t| t.trim_matches(STRIP).to_owned())
        .filter(|t| t.chars().count() >= 2 && t.chars().all(|c| !STRIP.contains(&c)))
        .map(|t| format!("{t}:*"))
        .collect();

    tokens.join(" | ")
}

/// Hybrid search: run both arms (over-fetching 2×top_k each), then fuse
/// with weighted Reciprocal Rank Fusion.
///
/// `score(e) = Σ_arm weight_arm / (60 + rank_arm(e) + 1)`; rows are
/// annotated with the arms that produced them.
#[allow(clippy::too_many_arguments)]
pub async fn search_hybrid(
    db: &PgPool,
    ai: &AiClient,
    project_id: i64,
    query_text: &str,
    top_k: i64,
    vector_weight: f64,
    fts_weight: f64,
    min_similarity: f64,
) -> Result<Vec<SearchResult>> {
    let vector_results = search_similar(
        db,
        ai,
        project_id,
        query_text,
        top_k * 2,
        min_similarity,
    )
    .await?;
    let fts_results = search_fulltext(db, project_id, query_text, top_k * 2).await?;

    let fused = rrf_fuse(
        vector_results,
        fts_results,
        vector_weight,
        fts_weight,
        top_k as usize,
    );

    debug!(
        project_id,
        fused = fused.len(),
        "hybrid search completed"
    );
    Ok(fused)
}

/// Fuse two ranked lists with weighted RRF; pure so it can be tested
/// without a database.
pub fn rrf_fuse(
    vector_results: Vec<EmbeddingHit>,
    fts_results: Vec<EmbeddingHit>,
    vector_weight: f64,
    fts_weight: f64,
    top_k: usize,
) -> Vec<SearchResult> {
    let mut merged: Vec<SearchResult> = Vec::new();

    let mut accumulate = |hits: Vec<EmbeddingHit>, weight: f64, arm: &'static str| {
        for (rank, hit) in hits.into_iter().enumerate() {
            let rrf = weight / (RRF_K + rank as f64 + 1.0);
            match merged.iter_mut().find(|r| r.id == hit.id) {
                Some(existing) => {
                    existing.score += rrf;
                    existing.sources.push(arm);
                }
                None => merged.push(SearchResult {
                    id: hit.id,
                    content: hit.content,
                    metadata: hit.metadata,
                    score: rrf,
                    sources: vec![arm],
                }),
            }
        }
    };

    accumulate(vector_results, vector_weight, "vector");
    accumulate(fts_results, fts_weight, "fts");

    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged.truncate(top_k);
    merged
}
