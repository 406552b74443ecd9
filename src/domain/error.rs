//! Domain error types

use thiserror::Error;

/// Error when configuration fails
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(String),

    #[error("Failed to parse config file: {0}")]
    Parse(String),

    #[error("Invalid config value for '{key}': {message}")]
    Validation { key: String, message: String },
}

/// How a job failed, carried on the job record and shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Download,
    Convert,
    NoSpeech,
    Transcribe,
    Internal,
}

impl FailureKind {
    /// Message sent to the chat when a job ends in this failure
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Download => "Could not download the file. Please try sending it again.",
            Self::Convert => "Could not process this audio format.",
            Self::NoSpeech => "No speech was detected in this file.",
            Self::Transcribe => "Transcription failed. Please try again later.",
            Self::Internal => "Something went wrong. Please try again later.",
        }
    }
}
