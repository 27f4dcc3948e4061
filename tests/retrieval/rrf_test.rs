//! Tests for Reciprocal Rank Fusion in `src/ai/search.rs`.

use remobot::ai::search::rrf_fuse;
use remobot::db::embeddings::EmbeddingHit;

fn hit(id: i64, content: &str) -> EmbeddingHit {
    EmbeddingHit {
        id,
        content: content.to_owned(),
        metadata: None,
        score: 0.0,
    }
}

#[test]
fn rows_hit_by_both_arms_rank_first() {
    let vector = vec![hit(1, "плитка 80000"), hit(2, "электрика 152340")];
    let fts = vec![hit(2, "электрика 152340"), hit(3, "демонтаж")];

    let fused = rrf_fuse(vector, fts, 0.6, 0.4, 10);
    assert_eq!(fused[0].id, 2, "the double hit should fuse to the top");
    assert_eq!(fused[0].sources, ["vector", "fts"]);
    assert_eq!(fused.len(), 3);
}

#[test]
fn zero_fts_weight_reproduces_pure_vector_order() {
    let vector = vec![hit(5, "a"), hit(6, "b"), hit(7, "c")];
    let fts = vec![hit(7, "c"), hit(9, "d"), hit(5, "a")];

    let fused = rrf_fuse(vector.clone(), fts, 0.6, 0.0, 10);
    let order: Vec<i64> = fused.iter().map(|r| r.id).take(3).collect();
    let vector_order: Vec<i64> = vector.iter().map(|h| h.id).collect();
    assert_eq!(order, vector_order);
}

#[test]
fn zero_vector_weight_reproduces_pure_fts_order() {
    let vector = vec![hit(1, "a"), hit(2, "b")];
    let fts = vec![hit(3, "c"), hit(1, "a"), hit(4, "d")];

    let fused = rrf_fuse(vector, fts.clone(), 0.0, 0.4, 10);
    let order: Vec<i64> = fused.iter().map(|r| r.id).take(3).collect();
    let fts_order: Vec<i64> = fts.iter().map(|h| h.id).collect();
    assert_eq!(order, fts_order);
}

#[test]
fn scores_follow_the_rrf_formula() {
    // score = weight / (60 + rank + 1)
    let fused = rrf_fuse(vec![hit(1, "a")], vec![hit(1, "a")], 0.6, 0.4, 10);
    let expected = 0.6 / 61.0 + 0.4 / 61.0;
    assert!((fused[0].score - expected).abs() < 1e-12);
}

#[test]
fn result_set_is_truncated_to_top_k() {
    let vector: Vec<EmbeddingHit> = (0..10).map(|i| hit(i, "v")).collect();
    let fts: Vec<EmbeddingHit> = (10..20).map(|i| hit(i, "f")).collect();
    let fused = rrf_fuse(vector, fts, 0.6, 0.4, 5);
    assert_eq!(fused.len(), 5);
}
