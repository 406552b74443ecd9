//! Application configuration value object

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::domain::progress::TranscribeBackend;

/// Application configuration.
/// All fields are optional to support partial configs and merging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub max_file_size: Option<u64>,
    pub default_estimate_minutes: Option<f64>,
    pub aggregation_window_ms: Option<u64>,
    pub queue_wait_secs: Option<u64>,
    pub workers: Option<usize>,
    pub max_message_length: Option<usize>,
    pub format_backend: Option<String>,
    pub transcribe_backend: Option<String>,
    pub dashscope_api_key: Option<String>,
    pub gateway_api_key: Option<String>,
    pub gateway_model: Option<String>,
    pub balance_max_retries: Option<u32>,
}

impl AppConfig {
    /// Create config with default values
    pub fn defaults() -> Self {
        Self {
            max_file_size: Some(50 * 1024 * 1024),
            default_estimate_minutes: Some(5.0),
            aggregation_window_ms: Some(2_000),
            queue_wait_secs: Some(10),
            workers: Some(2),
            max_message_length: Some(4_000),
            format_backend: Some("qwen".to_string()),
            transcribe_backend: Some("cloud_api".to_string()),
            dashscope_api_key: None,
            gateway_api_key: None,
            gateway_model: None,
            balance_max_retries: Some(3),
        }
    }

    /// Create an empty config (all None)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a TOML document into a partial config
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read overrides from the process environment
    pub fn from_env() -> Self {
        Self {
            dashscope_api_key: std::env::var("DASHSCOPE_API_KEY").ok(),
            gateway_api_key: std::env::var("LLM_GATEWAY_API_KEY").ok(),
            gateway_model: std::env::var("LLM_GATEWAY_MODEL").ok(),
            format_backend: std::env::var("FORMAT_BACKEND").ok(),
            transcribe_backend: std::env::var("TRANSCRIBE_BACKEND").ok(),
            ..Default::default()
        }
    }

    /// Merge this config with another, where other takes precedence.
    /// Only non-None values from other will override this.
    pub fn merge(self, other: Self) -> Self {
        Self {
            max_file_size: other.max_file_size.or(self.max_file_size),
            default_estimate_minutes: other
                .default_estimate_minutes
                .or(self.default_estimate_minutes),
            aggregation_window_ms: other.aggregation_window_ms.or(self.aggregation_window_ms),
            queue_wait_secs: other.queue_wait_secs.or(self.queue_wait_secs),
            workers: other.workers.or(self.workers),
            max_message_length: other.max_message_length.or(self.max_message_length),
            format_backend: other.format_backend.or(self.format_backend),
            transcribe_backend: other.transcribe_backend.or(self.transcribe_backend),
            dashscope_api_key: other.dashscope_api_key.or(self.dashscope_api_key),
            gateway_api_key: other.gateway_api_key.or(self.gateway_api_key),
            gateway_model: other.gateway_model.or(self.gateway_model),
            balance_max_retries: other.balance_max_retries.or(self.balance_max_retries),
        }
    }

    /// Get max accepted file size in bytes, or 50 MiB if not set
    pub fn max_file_size_or_default(&self) -> u64 {
        self.max_file_size.unwrap_or(50 * 1024 * 1024)
    }

    /// Get fallback duration estimate in minutes for files that report none
    pub fn default_estimate_minutes_or_default(&self) -> f64 {
        self.default_estimate_minutes.unwrap_or(5.0)
    }

    /// Get aggregation window, or 2 seconds if not set
    pub fn aggregation_window_or_default(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.aggregation_window_ms.unwrap_or(2_000))
    }

    /// Get queue long-poll wait, or 10 seconds if not set
    pub fn queue_wait_or_default(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.queue_wait_secs.unwrap_or(10))
    }

    /// Get worker count, or 2 if not set
    pub fn workers_or_default(&self) -> usize {
        self.workers.unwrap_or(2)
    }

    /// Get message length above which transcripts go out as documents
    pub fn max_message_length_or_default(&self) -> usize {
        self.max_message_length.unwrap_or(4_000)
    }

    /// Get transcription backend, or the cloud API if not set/invalid
    pub fn transcribe_backend_or_default(&self) -> TranscribeBackend {
        match self.transcribe_backend.as_deref() {
            Some("gpu") => TranscribeBackend::Gpu,
            _ => TranscribeBackend::CloudApi,
        }
    }

    /// Get max CAS retries for balance updates, or 3 if not set
    pub fn balance_max_retries_or_default(&self) -> u32 {
        self.balance_max_retries.unwrap_or(3)
    }
}
