//! Job queue port interface

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Job;

/// Queue errors
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("Failed to publish job: {0}")]
    PublishFailed(String),

    #[error("Failed to receive from queue: {0}")]
    ReceiveFailed(String),

    #[error("Unknown receipt: {0}")]
    UnknownReceipt(String),

    #[error("Queue backend error: {0}")]
    Backend(String),
}

/// A received job together with the receipt needed to delete it
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub receipt: String,
    pub job: Job,
}

/// Port for the at-least-once job queue.
///
/// A received message stays invisible until it is deleted or its visibility
/// timeout lapses, after which it is redelivered.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn publish(&self, job: &Job) -> Result<(), QueueError>;

    /// Wait up to `wait` for a message; `None` when the queue stayed empty
    async fn receive(&self, wait: Duration) -> Result<Option<QueueMessage>, QueueError>;

    /// Acknowledge a message so it is never redelivered
    async fn delete(&self, receipt: &str) -> Result<(), QueueError>;

    /// Extend or shorten how long a received message stays invisible
    async fn change_visibility(&self, receipt: &str, timeout: Duration) -> Result<(), QueueError>;
}
