//! Non-text message handling: download voice and photo files and turn
//! them into text via STT / vision.
//!
//! The produced text becomes the message's `transcribed_text`, so voice
//! notes and photos participate in retrieval like any other message.

use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{PhotoSize, Voice};
use tracing::debug;

use crate::ai::AiClient;
use crate::domain::MessageType;
use crate::error::{BotError, Result};

/// Result of processing a voice or photo message.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedMedia {
    /// Message kind for storage.
    pub message_type: MessageType,
    /// Platform file reference (Telegram `file_id`).
    pub file_ref: String,
    /// Transcription or description.
    pub text: String,
}

/// Download a voice note and transcribe it.
///
/// # Errors
///
/// [`BotError::Upstream`] when the download or the STT call fails;
/// [`BotError::Configuration`] when no AI provider is set up.
pub async fn process_voice(bot: &Bot, ai: &AiClient, voice: &Voice) -> Result<ProcessedMedia> {
    let audio = download_file(bot, &voice.file.id).await?;
    debug!(bytes = audio.len(), duration = ?voice.duration, "voice downloaded");

    let text = ai.transcribe(audio, "voice.ogg").await?;
    Ok(ProcessedMedia {
        message_type: MessageType::Voice,
        file_ref: voice.file.id.clone(),
        text,
    })
}

/// Download the largest photo size and describe it.
///
/// # Errors
///
/// [`BotError::Upstream`] when the download or the vision call fails;
/// [`BotError::Configuration`] when no AI provider is set up.
pub async fn process_photo(
    bot: &Bot,
    ai: &AiClient,
    photos: &[PhotoSize],
    caption: Option<&str>,
) -> Result<ProcessedMedia> {
    // Largest size is last by Telegram convention.
    let photo = photos
        .last()
        .ok_or_else(|| BotError::Validation("Пустое фото".to_owned()))?;

    let image = download_file(bot, &photo.file.id).await?;
    debug!(bytes = image.len(), "photo downloaded");

    let description = ai.describe_image(&image, caption).await?;
    let text = match caption {
        Some(caption) if !caption.trim().is_empty() => {
            format!("{caption}\n[Фото: {description}]")
        }
        _ => format!("[Фото: {description}]"),
    };

    Ok(ProcessedMedia {
        message_type: MessageType::Image,
        file_ref: photo.file.id.clone(),
        text,
    })
}

/// Download a Telegram file into memory by `file_id`.
async fn download_file(bot: &Bot, file_id: &str) -> Result<Vec<u8>> {
    let file = bot
        .get_file(file_id)
        .await
        .map_err(|e| BotError::Upstream(format!("get_file failed: {e}")))?;

    let mut buffer: Vec<u8> = Vec::new();
    bot.download_file(&file.path, &mut buffer)
        .await
        .map_err(|e| BotError::Upstream(format!("download failed: {e}")))?;
    Ok(buffer)
}
