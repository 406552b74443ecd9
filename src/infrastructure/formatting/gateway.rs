//! OpenAI-compatible LLM gateway formatting backend adapter

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::application::ports::{FormatBackend, FormatBackendError, FormatOutcome};

/// Default model routed through the gateway
const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

const API_BASE_URL: &str = "https://llm-gateway.internal/v1";

const MAX_TOKENS: u32 = 8192;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// Request types, OpenAI chat-completions shape

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

// Response types

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<Choice>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Formatting backend over an OpenAI-compatible gateway.
///
/// The gateway expects the raw key in the Authorization header, without a
/// Bearer prefix.
pub struct GatewayFormatter {
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GatewayFormatter {
    pub fn new(api_key: Option<String>, model: Option<String>) -> Self {
        Self {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: API_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the adapter at a different endpoint, used by tests
    pub fn with_base_url(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: MAX_TOKENS,
        }
    }
}

#[async_trait]
impl FormatBackend for GatewayFormatter {
    fn key(&self) -> &'static str {
        "gemini"
    }

    async fn complete(&self, prompt: &str) -> Result<FormatOutcome, FormatBackendError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(FormatBackendError::MissingCredentials)?;

        let body = self.build_request(prompt);
        let response = self
            .client
            .post(self.api_url())
            .header("Authorization", api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FormatBackendError::Timeout
                } else {
                    FormatBackendError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(FormatBackendError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| FormatBackendError::ParseError(e.to_string()))?;

        let choice = response
            .choices
            .as_ref()
            .and_then(|c| c.first())
            .ok_or_else(|| FormatBackendError::ParseError("response has no choices".to_string()))?;

        let text = choice
            .message
            .as_ref()
            .and_then(|m| m.content.as_deref())
            .ok_or_else(|| FormatBackendError::ParseError("choice has no content".to_string()))?;

        Ok(FormatOutcome {
            text: text.to_string(),
            truncated: choice.finish_reason.as_deref() == Some("length"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_uses_configured_model_and_token_cap() {
        let formatter = GatewayFormatter::new(Some("key".to_string()), Some("my-model".to_string()));
        let request = formatter.build_request("fix this");

        assert_eq!(request.model, "my-model");
        assert_eq!(request.max_tokens, 8192);
        assert_eq!(request.messages[0].role, "user");
    }

    #[test]
    fn default_model_when_unconfigured() {
        let formatter = GatewayFormatter::new(Some("key".to_string()), None);
        assert_eq!(formatter.model, "gemini-3-flash-preview");
    }

    #[tokio::test]
    async fn missing_key_is_reported_without_a_request() {
        let formatter = GatewayFormatter::new(None, None);
        let result = formatter.complete("prompt").await;
        assert!(matches!(result, Err(FormatBackendError::MissingCredentials)));
    }
}
