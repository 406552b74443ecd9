//! Progress notifier: throttled status message edits

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::application::ports::{ChatClient, MessageId};
use crate::domain::{ProcessingStage, ProgressState, TranscribeBackend};

/// Pushes a job's progress into its status message.
///
/// Wraps [`ProgressState`] and edits the chat message only when the throttle
/// allows it. Jobs without a status message handle still track progress; they
/// just never edit anything.
pub struct ProgressNotifier {
    chat: Arc<dyn ChatClient>,
    chat_id: i64,
    message_id: Option<MessageId>,
    state: ProgressState,
}

impl ProgressNotifier {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        chat_id: i64,
        message_id: Option<MessageId>,
        backend: TranscribeBackend,
        audio_secs: f64,
    ) -> Self {
        Self {
            chat,
            chat_id,
            message_id,
            state: ProgressState::new(backend, audio_secs),
        }
    }

    /// Advance to `stage` and push an update if the throttle allows.
    ///
    /// Edit failures are logged and swallowed; progress display never fails
    /// a job.
    pub async fn advance(&mut self, stage: ProcessingStage) {
        self.push(stage, false).await;
    }

    /// Advance to `stage` and push the update past the minimum-interval
    /// throttle. Identical text is still never re-sent.
    pub async fn advance_forced(&mut self, stage: ProcessingStage) {
        self.push(stage, true).await;
    }

    async fn push(&mut self, stage: ProcessingStage, forced: bool) {
        self.state.advance(stage);

        let Some(message_id) = self.message_id else {
            return;
        };

        let now = Instant::now();
        let text = self.state.render(now);
        if !self.state.should_send(&text, now, forced) {
            return;
        }

        match self.chat.edit_message(self.chat_id, message_id, &text).await {
            Ok(_) => self.state.record_sent(&text, now),
            Err(e) => debug!(error = %e, "progress edit failed"),
        }
    }

    pub fn message_id(&self) -> Option<MessageId> {
        self.message_id
    }
}
