pub mod delivery;
pub mod presence;
pub mod store;

use thiserror::Error;

/// Error taxonomy for the chat delivery pipeline. Every public operation
/// either succeeds or signals exactly one of these; lower-level store errors
/// never leak across the boundary.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message content is empty")]
    EmptyMessage,
    #[error("message content exceeds the maximum length")]
    MessageTooLong,
    #[error("receiver does not exist")]
    UserNotFound,
    #[error("failed to store message")]
    MessageCreationFailed,
    #[error("message not found")]
    MessageNotFound,
    #[error("internal error")]
    Internal,
}

impl ChatError {
    /// Stable error kind carried in outbound `error` events.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::EmptyMessage => "empty-message",
            ChatError::MessageTooLong => "message-too-long",
            ChatError::UserNotFound => "user-not-found",
            ChatError::MessageCreationFailed => "message-creation-failed",
            ChatError::MessageNotFound => "message-not-found",
            ChatError::Internal => "internal",
        }
    }
}
