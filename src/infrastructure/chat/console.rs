//! Console chat adapter for local runs

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::application::ports::{ChatClient, ChatError, MessageId};

/// Chat adapter that logs instead of talking to a platform.
///
/// Downloads succeed with an empty file so the rest of the pipeline can be
/// exercised end to end without network access.
#[derive(Default)]
pub struct ConsoleChat {
    next_message_id: AtomicI64,
}

impl ConsoleChat {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatClient for ConsoleChat {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        _reply_to: Option<MessageId>,
    ) -> Result<Option<MessageId>, ChatError> {
        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        info!(chat_id, message_id, %text, "send");
        Ok(Some(message_id))
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: MessageId,
        text: &str,
    ) -> Result<Option<MessageId>, ChatError> {
        info!(chat_id, message_id, %text, "edit");
        Ok(Some(message_id))
    }

    async fn delete_message(&self, chat_id: i64, message_id: MessageId) -> Result<(), ChatError> {
        info!(chat_id, message_id, "delete");
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
    ) -> Result<Option<MessageId>, ChatError> {
        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        info!(chat_id, message_id, path = %path.display(), %caption, "send document");
        Ok(Some(message_id))
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<(), ChatError> {
        info!(file_id, dest = %dest.display(), "download");
        // In local runs the file reference is a path on disk
        if tokio::fs::copy(file_id, dest).await.is_ok() {
            return Ok(());
        }
        tokio::fs::write(dest, b"")
            .await
            .map_err(|e| ChatError::RequestFailed(e.to_string()))
    }
}
