//! AI provider client — chat completions, embeddings, speech-to-text,
//! and image description over OpenAI-compatible HTTP APIs.
//!
//! Three provider variants are supported (Azure OpenAI, standard
//! OpenAI, and any OpenAI-compatible endpoint); embeddings and STT can
//! optionally go to separate endpoints (e.g. a local model server).
//! All calls share a 30-second timeout.

pub mod chat;
pub mod ingest;
pub mod participants;
pub mod rag;
pub mod search;

use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::{AiProviderConfig, Config};
use crate::error::{BotError, Result};

/// Timeout for every outgoing AI HTTP call.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// A chat message in provider wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user`, or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_owned(),
            content: content.into(),
        }
    }

    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_owned(),
            content: content.into(),
        }
    }

    /// Build an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_owned(),
            content: content.into(),
        }
    }
}

/// Multi-provider AI client. All AI interactions go through this type;
/// handlers never talk to provider HTTP APIs directly.
pub struct AiClient {
    http: reqwest::Client,
    provider: AiProviderConfig,
    embedding_dimensions: usize,
    embedding_base_url: Option<String>,
    embedding_api_key: Option<String>,
    whisper_base_url: Option<String>,
    whisper_api_key: Option<String>,
}

impl std::fmt::Debug for AiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiClient")
            .field("configured", &self.is_configured())
            .field("embedding_dimensions", &self.embedding_dimensions)
            .finish_non_exhaustive()
    }
}

impl AiClient {
    /// Build the client from configuration.
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeout, using default");
                reqwest::Client::new()
            });

        Self {
            http,
            provider: config.ai_provider.clone(),
            embedding_dimensions: config.ai_embedding_dimensions,
            embedding_base_url: config.ai_embedding_base_url.clone(),
            embedding_api_key: config.ai_embedding_api_key.clone(),
            whisper_base_url: config.ai_whisper_base_url.clone(),
            whisper_api_key: config.ai_whisper_api_key.clone(),
        }
    }

    /// Whether a provider is configured at all.
    pub fn is_configured(&self) -> bool {
        self.provider.is_configured()
    }

    /// Embedding dimensionality the provider is asked to produce.
    pub fn embedding_dimensions(&self) -> usize {
        self.embedding_dimensions
    }

    fn require_configured(&self) -> Result<()> {
        if self.is_configured() {
            return Ok(());
        }
        Err(BotError::Configuration(
            "AI provider is not configured".to_owned(),
        ))
    }

    /// Resolve (url, auth headers) for a chat-completions call.
    fn chat_endpoint(&self) -> Result<(String, Vec<(&'static str, String)>)> {
        match &self.provider {
            AiProviderConfig::Azure {
                endpoint,
                api_key,
                api_version,
                chat_deployment,
                ..
            } => Ok((
                format!(
                    "{}/openai/deployments/{chat_deployment}/chat/completions?api-version={api_version}",
                    endpoint.trim_end_matches('/'),
                ),
                vec![("api-key", api_key.clone())],
            )),
            AiProviderConfig::OpenAi { api_key, .. } => Ok((
                "https://api.openai.com/v1/chat/completions".to_owned(),
                vec![("Authorization", format!("Bearer {api_key}"))],
            )),
            AiProviderConfig::OpenAiCompatible {
                base_url, api_key, ..
            } => Ok((
                format!("{}/chat/completions", base_url.trim_end_matches('/')),
                vec![("Authorization", format!("Bearer {api_key}"))],
            )),
            AiProviderConfig::Disabled => Err(BotError::Configuration(
                "AI provider is not configured".to_owned(),
            )),
        }
    }

    /// The chat model name to put in the request body (ignored by Azure,
    /// which addresses the deployment in the URL).
    fn chat_model(&self) -> &str {
        match &self.provider {
            AiProviderConfig::Azure {
                chat_deployment, ..
            } => chat_deployment,
            AiProviderConfig::OpenAi { chat_model, .. }
            | AiProviderConfig::OpenAiCompatible { chat_model, .. } => chat_model,
            AiProviderConfig::Disabled => "",
        }
    }

    /// Run a chat completion and return the assistant text.
    ///
    /// # Errors
    ///
    /// [`BotError::Configuration`] when no provider is set up;
    /// [`BotError::Upstream`] on transport or API errors.
    pub async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String> {
        self.require_configured()?;
        let (url, headers) = self.chat_endpoint()?;

        let body = json!({
            "model": self.chat_model(),
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let mut request = self.http.post(&url).json(&body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(BotError::Upstream(format!(
                "chat completion failed: {status}: {body_text}"
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| BotError::Upstream(format!("chat response parse error: {e}")))?;

        let answer = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        debug!(chars = answer.len(), "chat completion received");
        Ok(answer)
    }

    // -----------------------------------------------------------------
    // Embeddings
    // -----------------------------------------------------------------

    fn embedding_endpoint(&self) -> Result<(String, Vec<(&'static str, String)>, String)> {
        // A dedicated embedding endpoint overrides the main provider.
        if let Some(base) = &self.embedding_base_url {
            let key = self
                .embedding_api_key
                .clone()
                .unwrap_or_else(|| "not-needed".to_owned());
            let model = match &self.provider {
                AiProviderConfig::OpenAi {
                    embedding_model, ..
                }
                | AiProviderConfig::OpenAiCompatible {
                    embedding_model, ..
                } => embedding_model.clone(),
                AiProviderConfig::Azure {
                    embedding_deployment,
                    ..
                } => embedding_deployment.clone(),
                AiProviderConfig::Disabled => String::new(),
            };
            return Ok((
                format!("{}/embeddings", base.trim_end_matches('/')),
                vec![("Authorization", format!("Bearer {key}"))],
                model,
            ));
        }

        match &self.provider {
            AiProviderConfig::Azure {
                endpoint,
                api_key,
                api_version,
                embedding_deployment,
                ..
            } => Ok((
                format!(
                    "{}/openai/deployments/{embedding_deployment}/embeddings?api-version={api_version}",
                    endpoint.trim_end_matches('/'),
                ),
                vec![("api-key", api_key.clone())],
                embedding_deployment.clone(),
            )),
            AiProviderConfig::OpenAi {
                api_key,
                embedding_model,
                ..
            } => Ok((
                "https://api.openai.com/v1/embeddings".to_owned(),
                vec![("Authorization", format!("Bearer {api_key}"))],
                embedding_model.clone(),
            )),
            AiProviderConfig::OpenAiCompatible {
                base_url,
                api_key,
                embedding_model,
                ..
            } => Ok((
                format!("{}/embeddings", base_url.trim_end_matches('/')),
                vec![("Authorization", format!("Bearer {api_key}"))],
                embedding_model.clone(),
            )),
            AiProviderConfig::Disabled => Err(BotError::Configuration(
                "AI provider is not configured".to_owned(),
            )),
        }
    }

    /// Generate an embedding vector for one text.
    ///
    /// # Errors
    ///
    /// [`BotError::Configuration`] when no provider is set up;
    /// [`BotError::Upstream`] on transport or API errors.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_owned()]).await?;
        vectors
            .pop()
            .ok_or_else(|| BotError::Upstream("empty embeddings array".to_owned()))
    }

    /// Generate embeddings for a batch of texts, preserving order.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.require_configured()?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let (url, headers, model) = self.embedding_endpoint()?;

        let mut body = json!({ "model": model, "input": texts });
        // Providers that support Matryoshka truncation accept a
        // `dimensions` parameter; others ignore unknown fields.
        if self.embedding_dimensions > 0 {
            body["dimensions"] = json!(self.embedding_dimensions);
        }

        let mut request = self.http.post(&url).json(&body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(BotError::Upstream(format!(
                "embedding request failed: {status}: {body_text}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| BotError::Upstream(format!("embedding response parse error: {e}")))?;

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    // -----------------------------------------------------------------
    // Speech to text
    // -----------------------------------------------------------------

    fn whisper_endpoint(&self) -> Result<(String, Vec<(&'static str, String)>, String)> {
        if let Some(base) = &self.whisper_base_url {
            let key = self
                .whisper_api_key
                .clone()
                .unwrap_or_else(|| "not-needed".to_owned());
            let model = match &self.provider {
                AiProviderConfig::OpenAi { whisper_model, .. }
                | AiProviderConfig::OpenAiCompatible { whisper_model, .. } => {
                    whisper_model.clone()
                }
                AiProviderConfig::Azure {
                    whisper_deployment, ..
                } => whisper_deployment.clone(),
                AiProviderConfig::Disabled => String::new(),
            };
            return Ok((
                format!("{}/audio/transcriptions", base.trim_end_matches('/')),
                vec![("Authorization", format!("Bearer {key}"))],
                model,
            ));
        }

        match &self.provider {
            AiProviderConfig::Azure {
                endpoint,
                api_key,
                api_version,
                whisper_deployment,
                ..
            } => Ok((
                format!(
                    "{}/openai/deployments/{whisper_deployment}/audio/transcriptions?api-version={api_version}",
                    endpoint.trim_end_matches('/'),
                ),
                vec![("api-key", api_key.clone())],
                whisper_deployment.clone(),
            )),
            AiProviderConfig::OpenAi {
                api_key,
                whisper_model,
                ..
            } => Ok((
                "https://api.openai.com/v1/audio/transcriptions".to_owned(),
                vec![("Authorization", format!("Bearer {api_key}"))],
                whisper_model.clone(),
            )),
            AiProviderConfig::OpenAiCompatible {
                base_url,
                api_key,
                whisper_model,
                ..
            } => Ok((
                format!("{}/audio/transcriptions", base_url.trim_end_matches('/')),
                vec![("Authorization", format!("Bearer {api_key}"))],
                whisper_model.clone(),
            )),
            AiProviderConfig::Disabled => Err(BotError::Configuration(
                "AI provider is not configured".to_owned(),
            )),
        }
    }

    /// Transcribe a voice note (OGG/Opus bytes) into text.
    pub async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String> {
        self.require_configured()?;
        let (url, headers, model) = self.whisper_endpoint()?;

        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(filename.to_owned())
            .mime_str("audio/ogg")
            .map_err(|e| BotError::Upstream(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model", model)
            .part("file", part);

        let mut request = self.http.post(&url).multipart(form);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(BotError::Upstream(format!(
                "transcription failed: {status}: {body_text}"
            )));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| BotError::Upstream(format!("transcription parse error: {e}")))?;
        Ok(parsed.text)
    }

    // -----------------------------------------------------------------
    // Vision
    // -----------------------------------------------------------------

    /// Describe a photo (JPEG bytes) in one or two sentences.
    ///
    /// The description becomes the message's canonical text so images
    /// participate in retrieval like any other message.
    pub async fn describe_image(&self, image: &[u8], caption: Option<&str>) -> Result<String> {
        self.require_configured()?;
        let (url, headers) = self.chat_endpoint()?;

        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let prompt = match caption {
            Some(caption) => format!(
                "Опиши фото с ремонта квартиры (1-2 предложения, по-русски). \
                 Подпись автора: {caption}"
            ),
            None => "Опиши фото с ремонта квартиры (1-2 предложения, по-русски).".to_owned(),
        };

        let body = json!({
            "model": self.chat_model(),
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url",
                      "image_url": { "url": format!("data:image/jpeg;base64,{encoded}") } },
                ],
            }],
            "max_tokens": 300,
        });

        let mut request = self.http.post(&url).json(&body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(BotError::Upstream(format!(
                "image description failed: {status}: {body_text}"
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| BotError::Upstream(format!("vision response parse error: {e}")))?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}
