//! DashScope (Qwen) formatting backend adapter

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::application::ports::{FormatBackend, FormatBackendError, FormatOutcome};

/// Model used for transcript formatting
const DEFAULT_MODEL: &str = "qwen-turbo";

/// DashScope text generation endpoint
const API_BASE_URL: &str = "https://dashscope.aliyuncs.com/api/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// Request types for the DashScope API

#[derive(Debug, Serialize)]
struct GenerationRequest {
    model: String,
    input: GenerationInput,
    parameters: GenerationParameters,
}

#[derive(Debug, Serialize)]
struct GenerationInput {
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct GenerationParameters {
    result_format: String,
}

// Response types for the DashScope API

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    output: Option<GenerationOutput>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerationOutput {
    /// Present with `result_format = "message"`
    choices: Option<Vec<Choice>>,
    /// Legacy plain-text field, still present on some responses
    text: Option<String>,
    finish_reason: Option<String>,
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

/// Formatting backend over the DashScope generation API.
///
/// Built without a key it reports [`FormatBackendError::MissingCredentials`]
/// so the chain can skip past it.
pub struct DashScopeFormatter {
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl DashScopeFormatter {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
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
        format!("{}/services/aigc/text-generation/generation", self.base_url)
    }

    fn build_request(&self, prompt: &str) -> GenerationRequest {
        GenerationRequest {
            model: self.model.clone(),
            input: GenerationInput {
                messages: vec![Message {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                }],
            },
            parameters: GenerationParameters {
                result_format: "message".to_string(),
            },
        }
    }

    /// Pull text and finish reason out of a response, preferring the
    /// structured choice over the legacy text field
    fn extract(output: &GenerationOutput) -> Option<(String, Option<&str>)> {
        if let Some(choice) = output.choices.as_ref().and_then(|c| c.first()) {
            let content = choice.message.as_ref()?.content.as_deref()?;
            return Some((content.to_string(), choice.finish_reason.as_deref()));
        }
        output
            .text
            .as_deref()
            .map(|t| (t.to_string(), output.finish_reason.as_deref()))
    }
}

#[async_trait]
impl FormatBackend for DashScopeFormatter {
    fn key(&self) -> &'static str {
        "qwen-llm"
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
            .bearer_auth(api_key)
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

        let response: GenerationResponse = response
            .json()
            .await
            .map_err(|e| FormatBackendError::ParseError(e.to_string()))?;

        let output = response.output.ok_or_else(|| {
            FormatBackendError::ParseError(
                response
                    .message
                    .unwrap_or_else(|| "response has no output".to_string()),
            )
        })?;

        let (text, finish_reason) = Self::extract(&output)
            .ok_or_else(|| FormatBackendError::ParseError("response has no text".to_string()))?;

        Ok(FormatOutcome {
            text,
            truncated: finish_reason == Some("length"),
        })
    }
}
