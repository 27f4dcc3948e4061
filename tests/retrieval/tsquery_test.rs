//! Tests for the tsquery builder in `src/ai/search.rs`.

use remobot::ai::search::build_tsquery;

#[test]
fn tokens_become_prefix_matches_joined_with_or() {
    assert_eq!(build_tsquery("бюджет электрика"), "бюджет:* | электрика:*");
}

#[test]
fn punctuation_is_stripped() {
    assert_eq!(
        build_tsquery("Сколько потратили на плитку?"),
        "Сколько:* | потратили:* | на:* | плитку:*"
    );
}

#[test]
fn single_character_tokens_are_dropped() {
    assert_eq!(build_tsquery("а бюджет и сроки"), "бюджет:* | сроки:*");
}

#[test]
fn tsquery_operators_cannot_be_injected() {
    let query = build_tsquery("плитка & электрика | стены");
    assert!(!query.contains("& "));
    assert_eq!(query, "плитка:* | электрика:* | стены:*");
}

#[test]
fn empty_input_produces_empty_query() {
    assert_eq!(build_tsquery(""), "");
    assert_eq!(build_tsquery("   "), "");
    assert_eq!(build_tsquery("? !"), "");
}
