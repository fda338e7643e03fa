//! OpenAI-compatible chat completion client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{AppError, AppResult};
use crate::external::client::HTTP_CLIENT;

const SERVICE: &str = "llm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatCompletion {
    pub content: String,
    pub finish_reason: Option<String>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// A model that turns role-tagged messages into generated text plus token usage.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> AppResult<ChatCompletion>;
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl CompletionResponse {
    fn into_completion(self) -> AppResult<ChatCompletion> {
        let usage = self.usage.unwrap_or_default();
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::external(SERVICE, "Invalid API response"))?;

        Ok(ChatCompletion {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    }
}

/// `POST {base_url}/chat/completions` with a bearer key.
#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    endpoint: String,
    api_key: String,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, request: ChatRequest) -> AppResult<ChatCompletion> {
        debug!(model = %request.model, messages = request.messages.len(), "Calling chat model");

        let response = HTTP_CLIENT
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::external(SERVICE, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(500).collect();
            return Err(AppError::external(
                SERVICE,
                format!("API call failed with status {status}: {snippet}"),
            ));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::external(SERVICE, format!("invalid JSON: {e}")))?;
        body.into_completion()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> AppResult<ChatCompletion> {
        serde_json::from_str::<CompletionResponse>(json)
            .unwrap()
            .into_completion()
    }

    #[test]
    fn test_parses_first_choice_and_usage() {
        let completion = parse(
            r#"{
                "choices": [{"message": {"role": "assistant", "content": "Busy week."}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 1200, "completion_tokens": 80, "total_tokens": 1280}
            }"#,
        )
        .unwrap();

        assert_eq!(completion.content, "Busy week.");
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
        assert_eq!(completion.prompt_tokens, 1200);
        assert_eq!(completion.completion_tokens, 80);
    }

    #[test]
    fn test_missing_choices_is_external_failure() {
        let err = parse(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, AppError::ExternalCall { ref message, .. } if message == "Invalid API response"));
    }

    #[test]
    fn test_missing_usage_counts_zero_tokens() {
        let completion = parse(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        assert_eq!(completion, ChatCompletion::default());
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let config = LlmConfig {
            base_url: "https://openrouter.ai/api/v1/".to_string(),
            ..LlmConfig::default()
        };
        assert_eq!(
            OpenAiChatModel::new(&config).endpoint(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }
}
