//! Storage port interfaces for users, jobs and the usage log

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Job, JobStatus, StoredMinutes, User};

/// Storage errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The stored value no longer matches the expected one
    #[error("Conditional update failed for user {user_id}")]
    ConditionFailed { user_id: i64 },

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// One settled job in the usage log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub job_id: String,
    pub user_id: i64,
    pub minutes_charged: i64,
    pub duration_secs: u32,
    pub char_count: usize,
    pub recorded_at: DateTime<Utc>,
}

/// Port for the user table
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: i64) -> Result<Option<User>, StoreError>;

    async fn put_user(&self, user: &User) -> Result<(), StoreError>;

    /// Set the balance to `new_minutes` only if the stored raw value still
    /// equals `expected`. Fails with [`StoreError::ConditionFailed`] when a
    /// concurrent writer got there first.
    async fn update_balance_if(
        &self,
        user_id: i64,
        expected: &StoredMinutes,
        new_minutes: f64,
    ) -> Result<(), StoreError>;
}

/// Port for the job table
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn put_job(&self, job: &Job) -> Result<(), StoreError>;

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>, StoreError>;

    async fn set_status(&self, job_id: &str, status: JobStatus) -> Result<(), StoreError>;
}

/// Port for the append-only usage log
#[async_trait]
pub trait UsageLog: Send + Sync {
    async fn append(&self, record: &UsageRecord) -> Result<(), StoreError>;
}
