//! Argument text backends.

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{TextRequest, TextService, build_http_client, ensure_success};
use crate::config::{PromptsConfig, ServicesConfig};
use crate::error::{DebateError, StageError};

/// Text generation through any OpenAI-compatible chat endpoint (OpenAI, LM Studio, Ollama).
pub struct OpenAiTextService {
    client: Client<OpenAIConfig>,
    model: String,
    prompts: PromptsConfig,
    max_retries: u32,
}

impl OpenAiTextService {
    pub fn new(services: &ServicesConfig, prompts: &PromptsConfig) -> Result<Self, DebateError> {
        let http_client = build_http_client(services.text_timeout(), services.verify_tls)?;

        let config = OpenAIConfig::new()
            .with_api_key(&services.api_key)
            .with_api_base(&services.api_base);

        Ok(Self {
            client: Client::with_config(config).with_http_client(http_client),
            model: services.model.clone(),
            prompts: prompts.clone(),
            max_retries: services.text_retries.max(1),
        })
    }

    fn messages(&self, request: &TextRequest) -> Vec<ChatCompletionRequestMessage> {
        let prompt = self
            .prompts
            .render(&request.topic, request.position, &request.context);

        vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: self.prompts.system.clone().into(),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: prompt.into(),
                name: None,
            }),
        ]
    }
}

#[async_trait]
impl TextService for OpenAiTextService {
    /// Includes retry logic with exponential backoff for resilience.
    async fn generate(&self, request: &TextRequest) -> Result<String, StageError> {
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_completion_tokens(self.prompts.max_tokens)
            .temperature(self.prompts.temperature)
            .messages(self.messages(request))
            .build()?;

        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry_delay(attempt)).await;
            }

            match self.client.chat().create(chat_request.clone()).await {
                Ok(response) => {
                    let content = response
                        .choices
                        .first()
                        .and_then(|c| c.message.content.clone())
                        .unwrap_or_default();
                    debug!(
                        "Completion for {} position: {} chars",
                        request.position,
                        content.len()
                    );
                    return Ok(sanitize_response(&content));
                }
                Err(e) => {
                    warn!(
                        "Completion attempt {}/{} failed: {}",
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .map(StageError::from)
            .unwrap_or_else(|| StageError::Backend("Unknown API error after retries".to_string())))
    }
}

/// Backoff before retry `attempt`: 1s, 2s, 4s...
pub(crate) fn retry_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(16))
}

/// Text service speaking the plain `{topic, position, context}` → `{content}` protocol.
pub struct HttpTextService {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TextResponse {
    content: String,
}

impl HttpTextService {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, DebateError> {
        Ok(Self {
            client: build_http_client(timeout, true)?,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl TextService for HttpTextService {
    async fn generate(&self, request: &TextRequest) -> Result<String, StageError> {
        let response = self.client.post(&self.endpoint).json(request).send().await?;
        let response = ensure_success(response).await?;
        let body: TextResponse = response
            .json()
            .await
            .map_err(|e| StageError::Malformed(format!("text response: {}", e)))?;
        Ok(body.content)
    }
}

/// Sanitize AI response by stripping reasoning tokens and XML-like tags.
///
/// Removes patterns like <thinking>...</thinking>, <reflection>...</reflection>, etc.
fn sanitize_response(response: &str) -> String {
    let tags_to_strip = [
        "thinking",
        "think",
        "reflection",
        "reflect",
        "internal",
        "reasoning",
        "thought",
        "scratchpad",
        "analysis",
    ];

    let mut result = response.to_string();

    for tag in &tags_to_strip {
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag);
        if let Ok(re) = regex::Regex::new(&pattern) {
            result = re.replace_all(&result, "").to_string();
        }
    }

    if let Ok(orphan_re) = regex::Regex::new(r"</?[\w]+[^>]*>") {
        result = orphan_re.replace_all(&result, "").to_string();
    }

    // Markdown emphasis would be read aloud by the speech backend
    result = result.replace('*', "");

    if let Ok(ws_re) = regex::Regex::new(r"\s+") {
        result = ws_re.replace_all(&result, " ").to_string();
    }

    result.trim().to_string()
}
