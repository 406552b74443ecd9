//! Media conversion port interface

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// Media conversion errors
#[derive(Debug, Clone, Error)]
pub enum MediaError {
    #[error("Unsupported media format: {0}")]
    UnsupportedFormat(String),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Media tool error: {0}")]
    Tool(String),
}

/// Audio ready for the speech recognizer
#[derive(Debug, Clone)]
pub struct PreparedAudio {
    pub path: PathBuf,
    pub duration_secs: f64,
}

/// Port for turning an incoming media file into recognizer-ready audio
#[async_trait]
pub trait MediaConverter: Send + Sync {
    async fn prepare_for_asr(&self, input: &Path) -> Result<PreparedAudio, MediaError>;
}
