//! Port interfaces (traits) for external systems
//!
//! These traits define the boundaries between the application
//! and infrastructure layers.

pub mod chat;
pub mod formatter;
pub mod media;
pub mod metrics;
pub mod queue;
pub mod speech;
pub mod store;

// Re-export common types
pub use chat::{ChatClient, ChatError, MessageId};
pub use formatter::{FormatBackend, FormatBackendError, FormatOutcome};
pub use media::{MediaConverter, MediaError, PreparedAudio};
pub use metrics::MetricsSink;
pub use queue::{JobQueue, QueueError, QueueMessage};
pub use speech::{SpeechError, SpeechToText};
pub use store::{JobStore, StoreError, UsageLog, UsageRecord, UserStore};
