//! VoxBot - asynchronous transcription-job pipeline for a chat bot
//!
//! Accepts voice, audio and video submissions, checks the sender's prepaid
//! minute balance, queues a job per file and drives each job through
//! download, conversion, speech recognition, LLM formatting and delivery.
//!
//! # Architecture
//!
//! The crate follows hexagonal (ports & adapters) architecture:
//!
//! - **Domain**: Core business logic, value objects, entities, and errors
//! - **Application**: Use cases and port interfaces (traits)
//! - **Infrastructure**: Adapter implementations (DashScope, gateway, ffmpeg,
//!   storage, queue)

pub mod application;
pub mod domain;
pub mod infrastructure;
