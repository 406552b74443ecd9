//! Shared service context handed to workers and handlers

use std::sync::Arc;
use std::time::Duration;

use crate::application::formatting::FormattingChain;
use crate::application::ports::{
    ChatClient, JobQueue, JobStore, MediaConverter, SpeechToText, UserStore,
};
use crate::application::settlement::SettlementService;

/// Everything a worker needs, wired once at startup and passed explicitly.
pub struct ServiceContext {
    pub users: Arc<dyn UserStore>,
    pub jobs: Arc<dyn JobStore>,
    pub queue: Arc<dyn JobQueue>,
    pub chat: Arc<dyn ChatClient>,
    pub media: Arc<dyn MediaConverter>,
    pub speech: Arc<dyn SpeechToText>,
    pub formatting: Arc<FormattingChain>,
    pub settlement: Arc<SettlementService>,
    pub queue_wait: Duration,
    pub max_message_length: usize,
}
