//! Tests for the mention gate in `src/telegram/gate.rs`.

use remobot::telegram::gate::{
    compile_patterns, entity_text, evaluate, is_directed_at_bot, strip_leading_mention,
    GateDecision, GateInput,
};

const BOT_ID: u64 = 7_000_001;
const BOT_USERNAME: &str = "remobot";

fn group_text(text: &str) -> GateInput {
    GateInput {
        is_private: false,
        text: text.to_owned(),
        is_reply_to_bot: false,
        mentions: Vec::new(),
        text_mention_ids: Vec::new(),
    }
}

#[test]
fn private_chats_always_pass() {
    let input = GateInput {
        is_private: true,
        ..GateInput::default()
    };
    assert_eq!(
        evaluate(&input, true, BOT_USERNAME, BOT_ID, &[]),
        GateDecision::Handle
    );
}

#[test]
fn commands_pass_in_groups() {
    let input = group_text("/stages");
    assert_eq!(
        evaluate(&input, true, BOT_USERNAME, BOT_ID, &[]),
        GateDecision::Handle
    );
}

#[test]
fn undirected_group_text_is_silent() {
    let input = group_text("покраска будет стоить 80 000");
    assert_eq!(
        evaluate(&input, true, BOT_USERNAME, BOT_ID, &[]),
        GateDecision::Silent
    );
}

#[test]
fn disabled_gate_passes_everything() {
    let input = group_text("просто болтаем");
    assert_eq!(
        evaluate(&input, false, BOT_USERNAME, BOT_ID, &[]),
        GateDecision::Handle
    );
}

#[test]
fn reply_to_bot_opens_the_gate() {
    let mut input = group_text("да, согласен");
    input.is_reply_to_bot = true;
    assert!(is_directed_at_bot(&input, BOT_USERNAME, BOT_ID, &[]));
}

#[test]
fn username_mention_opens_the_gate() {
    let mut input = group_text("@remobot покажи бюджет");
    input.mentions.push("remobot".to_owned());
    assert!(is_directed_at_bot(&input, BOT_USERNAME, BOT_ID, &[]));

    // A mention of some other bot does not.
    let mut other = group_text("@otherbot привет");
    other.mentions.push("otherbot".to_owned());
    assert!(!is_directed_at_bot(&other, BOT_USERNAME, BOT_ID, &[]));
}

#[test]
fn text_mention_matches_by_user_id() {
    let mut input = group_text("Ремобот, статус?");
    input.text_mention_ids.push(BOT_ID);
    assert!(is_directed_at_bot(&input, BOT_USERNAME, BOT_ID, &[]));
}

#[test]
fn custom_prefix_patterns_are_word_bounded() {
    let patterns = compile_patterns("бот,помощник");
    assert_eq!(patterns.len(), 2);

    let directed = group_text("бот, покажи бюджет");
    assert!(is_directed_at_bot(&directed, BOT_USERNAME, BOT_ID, &patterns));

    let with_helper = group_text("Помощник нужен на объект");
    assert!(is_directed_at_bot(&with_helper, BOT_USERNAME, BOT_ID, &patterns));

    // "бот" inside a longer word does not count.
    let undirected = group_text("работа идёт по плану");
    assert!(!is_directed_at_bot(&undirected, BOT_USERNAME, BOT_ID, &patterns));
}

#[test]
fn empty_pattern_config_compiles_to_nothing() {
    assert!(compile_patterns("").is_empty());
    assert!(compile_patterns(" , ,").is_empty());
}

#[test]
fn entity_text_uses_utf16_offsets() {
    // Telegram counts offsets in UTF-16 code units; Cyrillic letters
    // are one unit each.
    let text = "привет @remobot как дела";
    assert_eq!(entity_text(text, 7, 8), "@remobot");
}

#[test]
fn leading_mention_is_stripped_from_questions() {
    assert_eq!(
        strip_leading_mention("@remobot сколько потрачено?", BOT_USERNAME),
        "сколько потрачено?"
    );
    assert_eq!(
        strip_leading_mention("сколько потрачено?", BOT_USERNAME),
        "сколько потрачено?"
    );
}
