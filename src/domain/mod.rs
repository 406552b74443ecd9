//! Domain layer - Core business logic
//!
//! Contains value objects, entities, and domain errors.
//! This layer has no dependencies on external systems.

pub mod batch;
pub mod config;
pub mod error;
pub mod job;
pub mod progress;
pub mod text;
pub mod user;

// Re-export common types
pub use batch::Batch;
pub use config::AppConfig;
pub use error::{ConfigError, FailureKind};
pub use job::{IncomingFile, Job, JobResult, JobStatus, MediaKind};
pub use progress::{ProcessingStage, ProgressState, TranscribeBackend};
pub use user::{StoredMinutes, User, UserSettings};
