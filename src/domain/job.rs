//! Job entity and inbound file descriptors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of inbound media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Voice,
    Audio,
    Video,
    VideoNote,
}

impl MediaKind {
    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video | Self::VideoNote)
    }
}

/// A file as it arrives from the chat platform, before admission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingFile {
    /// Platform file reference used for download
    pub file_id: String,
    pub file_size: u64,
    /// Duration reported by the platform, zero when unknown
    pub duration_secs: u32,
    pub kind: MediaKind,
    /// Platform file-group identifier; files sharing it belong to one batch
    pub group_id: Option<String>,
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal jobs are immutable; settlement short-circuits on them
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Result attached to a completed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub raw_text: String,
    pub formatted_text: String,
    pub char_count: usize,
}

/// A persisted transcription job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub user_id: i64,
    pub chat_id: i64,
    pub file_id: String,
    pub file_size: u64,
    pub duration_secs: u32,
    pub kind: MediaKind,
    pub user_name: String,
    pub status: JobStatus,
    /// Handle of the progress message this job is allowed to edit
    pub status_message_id: Option<i64>,
    /// Whether this job owns the batch's single progress thread
    pub is_batch_confirmation: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub result: Option<JobResult>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Job {
    /// Create a pending job for an admitted file
    pub fn new(
        user_id: i64,
        chat_id: i64,
        user_name: impl Into<String>,
        file: &IncomingFile,
        status_message_id: Option<i64>,
        is_batch_confirmation: bool,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            user_id,
            chat_id,
            file_id: file.file_id.clone(),
            file_size: file.file_size,
            duration_secs: file.duration_secs,
            kind: file.kind,
            user_name: user_name.into(),
            status: JobStatus::Pending,
            status_message_id,
            is_batch_confirmation,
            created_at: Utc::now(),
            result: None,
            error: None,
        }
    }
}
