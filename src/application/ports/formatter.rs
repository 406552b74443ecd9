//! Formatting backend port interface

use async_trait::async_trait;
use thiserror::Error;

/// Formatting backend errors
#[derive(Debug, Clone, Error)]
pub enum FormatBackendError {
    /// No API key configured; the chain skips this backend without an
    /// HTTP attempt
    #[error("No credentials configured for this backend")]
    MissingCredentials,

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// A completion from a formatting backend
#[derive(Debug, Clone)]
pub struct FormatOutcome {
    pub text: String,
    /// The model stopped because it hit its output limit
    pub truncated: bool,
}

/// Port for one LLM formatting backend in the fallback chain
#[async_trait]
pub trait FormatBackend: Send + Sync {
    /// Stable key used in metrics and logs
    fn key(&self) -> &'static str;

    async fn complete(&self, prompt: &str) -> Result<FormatOutcome, FormatBackendError>;
}
