//! Tests for the `/ask` answer-cache key in `src/ai/rag.rs`.

use remobot::ai::rag::ask_cache_key;

#[test]
fn key_shape_is_ask_project_and_twelve_hex() {
    let key = ask_cache_key(42, "Сколько потрачено на электрику?");
    let mut parts = key.split(':');
    assert_eq!(parts.next(), Some("ask"));
    assert_eq!(parts.next(), Some("42"));

    let digest = parts.next().expect("digest part");
    assert_eq!(digest.len(), 12);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(parts.next(), None);
}

#[test]
fn key_is_case_and_whitespace_insensitive() {
    let a = ask_cache_key(1, "Сколько потрачено?");
    let b = ask_cache_key(1, "  СКОЛЬКО ПОТРАЧЕНО?  ");
    assert_eq!(a, b);
}

#[test]
fn different_questions_produce_different_keys() {
    assert_ne!(ask_cache_key(1, "бюджет?"), ask_cache_key(1, "сроки?"));
}

#[test]
fn different_projects_produce_different_keys() {
    assert_ne!(ask_cache_key(1, "бюджет?"), ask_cache_key(2, "бюджет?"));
}
