//! Infrastructure layer - Adapter implementations
//!
//! Contains concrete implementations of the port interfaces,
//! integrating with external systems like ffmpeg, DashScope, the
//! LLM gateway, storage and the job queue.

pub mod chat;
pub mod formatting;
pub mod media;
pub mod metrics;
pub mod queue;
pub mod speech;
pub mod store;

// Re-export adapters
pub use chat::ConsoleChat;
pub use formatting::{DashScopeFormatter, GatewayFormatter};
pub use media::FfmpegConverter;
pub use metrics::TracingMetrics;
pub use queue::MemoryQueue;
pub use speech::DashScopeSpeech;
pub use store::MemoryStore;
