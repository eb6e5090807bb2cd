use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatMessage, Completion, CompletionOptions, LlmClient, ResponseFormat};
use crate::config::LlmConfig;
use crate::error::LlmError;

const PROVIDER: &str = "openai";

/// Client for any OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    /// Builds a client when the configured API key variable is set and
    /// non-empty.
    pub fn from_env(config: &LlmConfig) -> Option<Self> {
        let api_key = std::env::var(&config.api_key_env).ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        Some(Self::new(api_key.trim(), &config.base_url, &config.model))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: options.response_format.map(|format| match format {
                ResponseFormat::JsonObject => ResponseFormatBody {
                    kind: "json_object",
                },
            }),
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, model = %self.model, messages = messages.len(), "sending chat completion");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| request_failed(0, format!("HTTP request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            let message = serde_json::from_str::<ApiError>(&text)
                .map(|api_error| api_error.error.message)
                .unwrap_or(text);
            return Err(request_failed(status.as_u16(), message));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|error| invalid_response(format!("failed to parse response: {error}")))?;
        let content = parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| invalid_response("no completion in response".to_string()))?;

        Ok(Completion { content })
    }
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

fn request_failed(status: u16, message: String) -> LlmError {
    LlmError::RequestFailed {
        provider: PROVIDER.to_string(),
        status,
        message,
    }
}

fn invalid_response(reason: String) -> LlmError {
    LlmError::InvalidResponse {
        provider: PROVIDER.to_string(),
        reason,
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormatBody>,
}

#[derive(Serialize)]
struct ResponseFormatBody {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}
