//! DashScope speech recognition adapter

use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::application::ports::{SpeechError, SpeechToText};
use crate::domain::TranscribeBackend;

const DEFAULT_MODEL: &str = "qwen3-asr-flash";

const API_BASE_URL: &str = "https://dashscope.aliyuncs.com/api/v1";

// Request types for the multimodal generation API

#[derive(Debug, Serialize)]
struct AsrRequest {
    model: String,
    input: AsrInput,
}

#[derive(Debug, Serialize)]
struct AsrInput {
    messages: Vec<AsrMessage>,
}

#[derive(Debug, Serialize)]
struct AsrMessage {
    role: String,
    content: Vec<AsrContent>,
}

#[derive(Debug, Serialize)]
struct AsrContent {
    audio: String,
}

// Response types

#[derive(Debug, Deserialize)]
struct AsrResponse {
    output: Option<AsrOutput>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AsrOutput {
    choices: Option<Vec<AsrChoice>>,
}

#[derive(Debug, Deserialize)]
struct AsrChoice {
    message: Option<AsrChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct AsrChoiceMessage {
    content: Option<Vec<AsrChoiceContent>>,
}

#[derive(Debug, Deserialize)]
struct AsrChoiceContent {
    text: Option<String>,
}

/// Speech recognizer over the DashScope ASR API.
///
/// Audio is inlined as a base64 data URI, which keeps the adapter free of
/// any upload step.
pub struct DashScopeSpeech {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl DashScopeSpeech {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: API_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the adapter at a different endpoint, used by tests
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self) -> String {
        format!(
            "{}/services/aigc/multimodal-generation/generation",
            self.base_url
        )
    }

    fn build_request(&self, audio: &[u8]) -> AsrRequest {
        let encoded = base64::engine::general_purpose::STANDARD.encode(audio);
        AsrRequest {
            model: self.model.clone(),
            input: AsrInput {
                messages: vec![AsrMessage {
                    role: "user".to_string(),
                    content: vec![AsrContent {
                        audio: format!("data:audio/mp3;base64,{encoded}"),
                    }],
                }],
            },
        }
    }

    fn extract_text(response: &AsrResponse) -> Option<String> {
        let parts: Vec<&str> = response
            .output
            .as_ref()?
            .choices
            .as_ref()?
            .first()?
            .message
            .as_ref()?
            .content
            .as_ref()?
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(""))
        }
    }
}

#[async_trait]
impl SpeechToText for DashScopeSpeech {
    async fn transcribe(&self, path: &Path) -> Result<String, SpeechError> {
        let audio = tokio::fs::read(path)
            .await
            .map_err(|e| SpeechError::RequestFailed(format!("read audio: {e}")))?;

        let body = self.build_request(&audio);
        let response = self
            .client
            .post(self.api_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeechError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SpeechError::InvalidApiKey);
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SpeechError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let response: AsrResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::ParseError(e.to_string()))?;

        if let Some(message) = response.message.as_deref() {
            if response.output.is_none() {
                return Err(SpeechError::ApiError {
                    status: status.as_u16(),
                    message: message.to_string(),
                });
            }
        }

        let text = Self::extract_text(&response).ok_or(SpeechError::NoSpeech)?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SpeechError::NoSpeech);
        }

        Ok(trimmed.to_string())
    }

    fn backend(&self) -> TranscribeBackend {
        TranscribeBackend::CloudApi
    }
}
