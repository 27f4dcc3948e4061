//! Embedding repository — pgvector rows plus the two retrieval arms.
//!
//! Vectors travel as pgvector text literals (`[0.1,0.2,...]`) cast with
//! `CAST(.. AS vector)`; similarity is `1 - (embedding <=> query)` over
//! the HNSW-indexed column. Full-text search matches the generated
//! `search_tsv` column with a `simple`-config tsquery.

use sqlx::PgPool;

use crate::error::Result;

/// One retrieval hit from either arm.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingHit {
    /// Embedding row id.
    pub id: i64,
    /// Stored text.
    pub content: String,
    /// Structured payload: `source`, `message_id`, `user_id`, `date`.
    pub metadata: Option<serde_json::Value>,
    /// Cosine similarity (vector arm) or `ts_rank` (FTS arm).
    pub score: f64,
}

/// Render a vector as the pgvector text literal.
pub fn vector_literal(vector: &[f32]) -> String {
    let mut out = String::with_capacity(vector.len() * 10 + 2);
    out.push('[');
    for (i, v) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&v.to_string());
    }
    out.push(']');
    out
}

/// Insert an embedding row.
pub async fn insert_embedding(
    db: &PgPool,
    project_id: i64,
    content: &str,
    vector: &[f32],
    metadata: Option<&serde_json::Value>,
) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO embeddings (project_id, content, embedding, metadata) \
         VALUES ($1, $2, CAST($3 AS vector), $4) \
         RETURNING id",
    )
    .bind(project_id)
    .bind(content)
    .bind(vector_literal(vector))
    .bind(metadata)
    .fetch_one(db)
    .await?;
    Ok(id)
}

/// Semantic search: top `top_k` rows by ascending cosine distance with
/// similarity at or above `min_similarity`.
pub async fn semantic_search(
    db: &PgPool,
    project_id: i64,
    query_vector: &[f32],
    top_k: i64,
    min_similarity: f64,
) -> Result<Vec<EmbeddingHit>> {
    let literal = vector_literal(query_vector);
    let rows: Vec<(i64, String, Option<serde_json::Value>, f64)> = sqlx::query_as(
        "SELECT id, content, metadata, \
                1 - (embedding <=> CAST($2 AS vector)) AS similarity \
         FROM embeddings \
         WHERE project_id = $1 \
           AND 1 - (embedding <=> CAST($2 AS vector)) >= $3 \
         ORDER BY embedding <=> CAST($2 AS vector) \
         LIMIT $4",
    )
    .bind(project_id)
    .bind(&literal)
    .bind(min_similarity)
    .bind(top_k)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, content, metadata, score)| EmbeddingHit {
            id,
            content,
            metadata,
            score,
        })
        .collect())
}

/// Full-text search over the generated `search_tsv` column, ranked by
/// `ts_rank` descending. `tsquery` must already be compiled (see
/// [`crate::ai::search::build_tsquery`]).
pub async fn fulltext_search(
    db: &PgPool,
    project_id: i64,
    tsquery: &str,
    top_k: i64,
) -> Result<Vec<EmbeddingHit>> {
    if tsquery.is_empty() {
        return Ok(Vec::new());
    }

    let rows: Vec<(i64, String, Option<serde_json::Value>, f32)> = sqlx::query_as(
        "SELECT id, content, metadata, \
                ts_rank(search_tsv, to_tsquery('simple', $2)) AS rank \
         FROM embeddings \
         WHERE project_id = $1 \
           AND search_tsv @@ to_tsquery('simple', $2) \
         ORDER BY rank DESC \
         LIMIT $3",
    )
    .bind(project_id)
    .bind(tsquery)
    .bind(top_k)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, content, metadata, score)| EmbeddingHit {
            id,
            content,
            metadata,
            score: f64::from(score),
        })
        .collect())
}

/// Number of embeddings stored for a project.
pub async fn count_for_project(db: &PgPool, project_id: i64) -> Result<i64> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM embeddings WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(db)
            .await?;
    Ok(count)
}
