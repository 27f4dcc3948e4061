//! Mention gate — drops group messages not directed at the bot.
//!
//! The gate opens when any of these holds:
//! - the chat is private (always passes),
//! - the message is an explicit command (`/...`),
//! - it replies to one of this bot's own messages,
//! - a mention entity matches the bot's `@username`,
//! - a text-mention entity carries the bot's user id,
//! - the text or caption starts with a configured prefix ("бот", ...),
//! - the gate is disabled in configuration.
//!
//! A closed gate is a no-op for the handler chain, but the message is
//! still stored and indexed silently so retrieval sees full group
//! context.

use regex::Regex;
use teloxide::types::{Message, MessageEntityKind};
use tracing::warn;

/// What to do with an inbound group message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Run the handler chain.
    Handle,
    /// Skip handlers; store and index silently.
    Silent,
}

/// Platform-independent view of the fields the gate inspects.
///
/// Extracted from the raw message so the decision logic stays pure.
#[derive(Debug, Clone, Default)]
pub struct GateInput {
    /// Whether the chat is private.
    pub is_private: bool,
    /// Message text or caption.
    pub text: String,
    /// Whether the message replies to one of this bot's messages.
    pub is_reply_to_bot: bool,
    /// `@username` mentions present in the message (lowercase, no `@`).
    pub mentions: Vec<String>,
    /// User ids carried by text-mention entities.
    pub text_mention_ids: Vec<u64>,
}

/// Compile the comma-separated prefix patterns from configuration.
///
/// Each prefix becomes a case-insensitive, word-bounded, line-anchored
/// pattern; invalid entries are logged and skipped.
pub fn compile_patterns(raw: &str) -> Vec<Regex> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter_map(|p| {
            match Regex::new(&format!(r"(?i)^\s*{}\b", regex::escape(p))) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = p, error = %e, "invalid mention gate pattern, skipping");
                    None
                }
            }
        })
        .collect()
}

/// Extract the gate-relevant view from a Telegram message.
pub fn gate_input(msg: &Message, bot_user_id: u64) -> GateInput {
    let text = msg
        .text()
        .or_else(|| msg.caption())
        .unwrap_or_default()
        .to_owned();

    let is_reply_to_bot = msg
        .reply_to_message()
        .and_then(|reply| reply.from.as_ref())
        .is_some_and(|from| from.id.0 == bot_user_id);

    let mut mentions = Vec::new();
    let mut text_mention_ids = Vec::new();
    let source_text = msg.text().or_else(|| msg.caption()).unwrap_or_default();
    let entities = msg
        .entities()
        .or_else(|| msg.caption_entities())
        .unwrap_or_default();
    for entity in entities {
        match &entity.kind {
            MessageEntityKind::Mention => {
                let mention = entity_text(source_text, entity.offset, entity.length);
                mentions.push(mention.trim_start_matches('@').to_lowercase());
            }
            MessageEntityKind::TextMention { user } => {
                text_mention_ids.push(user.id.0);
            }
            _ => {}
        }
    }

    GateInput {
        is_private: msg.chat.is_private(),
        text,
        is_reply_to_bot,
        mentions,
        text_mention_ids,
    }
}

/// Decide whether the message passes the gate.
pub fn evaluate(
    input: &GateInput,
    enabled: bool,
    bot_username: &str,
    bot_user_id: u64,
    patterns: &[Regex],
) -> GateDecision {
    if input.is_private || !enabled {
        return GateDecision::Handle;
    }
    if input.text.starts_with('/') {
        return GateDecision::Handle;
    }
    if is_directed_at_bot(input, bot_username, bot_user_id, patterns) {
        return GateDecision::Handle;
    }
    GateDecision::Silent
}

/// Whether a group message is directed at the bot.
pub fn is_directed_at_bot(
    input: &GateInput,
    bot_username: &str,
    bot_user_id: u64,
    patterns: &[Regex],
) -> bool {
    if input.is_reply_to_bot {
        return true;
    }

    let username = bot_username.trim_start_matches('@').to_lowercase();
    if !username.is_empty() && input.mentions.iter().any(|m| *m == username) {
        return true;
    }

    if input.text_mention_ids.contains(&bot_user_id) {
        return true;
    }

    patterns.iter().any(|re| re.is_match(&input.text))
}

/// Extract an entity's text. Telegram entity offsets are UTF-16 code
/// units, so slicing must go through a UTF-16 view.
pub fn entity_text(text: &str, offset: usize, length: usize) -> String {
    let units: Vec<u16> = text.encode_utf16().collect();
    let start = offset.min(units.len());
    let end = (offset + length).min(units.len());
    String::from_utf16_lossy(&units[start..end])
}

/// Strip the leading mention of the bot from directed text, so
/// "@bot сколько потрачено?" asks "сколько потрачено?".
pub fn strip_leading_mention(text: &str, bot_username: &str) -> String {
    let username = bot_username.trim_start_matches('@');
    let trimmed = text.trim_start();
    if let Some(rest) = trimmed.strip_prefix('@') {
        if let Some(tail) = rest.strip_prefix(username) {
            return tail.trim_start_matches([',', ':']).trim().to_owned();
        }
    }
    text.trim().to_owned()
}
