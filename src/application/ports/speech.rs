//! Speech recognition port interface

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::TranscribeBackend;

/// Speech recognition errors
#[derive(Debug, Clone, Error)]
pub enum SpeechError {
    #[error("No speech detected")]
    NoSpeech,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Recognition request failed: {0}")]
    RequestFailed(String),

    #[error("Recognition API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse recognition response: {0}")]
    ParseError(String),
}

/// Port for speech-to-text recognition
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe the prepared audio at `path` to raw text
    async fn transcribe(&self, path: &Path) -> Result<String, SpeechError>;

    /// Which engine this adapter runs on, used for ETA estimates
    fn backend(&self) -> TranscribeBackend;
}
