//! Chat platform port interface

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

/// Message identifier on the chat platform
pub type MessageId = i64;

/// Chat delivery errors
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    #[error("Chat request failed: {0}")]
    RequestFailed(String),

    #[error("Chat API error ({status}): {message}")]
    ApiError { status: u16, message: String },
}

/// Port for sending and editing messages in a chat.
///
/// Send and edit return `None` instead of an error when the platform refuses
/// the operation for a benign reason (message unchanged, deleted, chat gone);
/// callers carry on without a handle in that case.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send a text message, returning its id when the platform assigns one
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<Option<MessageId>, ChatError>;

    /// Edit a previously sent message in place
    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: MessageId,
        text: &str,
    ) -> Result<Option<MessageId>, ChatError>;

    /// Delete a previously sent message
    async fn delete_message(&self, chat_id: i64, message_id: MessageId) -> Result<(), ChatError>;

    /// Send a file as a document with a caption
    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
    ) -> Result<Option<MessageId>, ChatError>;

    /// Download a platform file to a local path
    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<(), ChatError>;
}
