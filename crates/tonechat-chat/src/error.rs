//! Error types for the orchestration core.

use tonechat_core::error::ToneChatError;
use tonechat_core::types::{FailureKind, TurnId};

/// Errors from the chat engine.
///
/// Remote failures are folded into the transport / service / playback
/// taxonomy shown to the user; none of them is fatal to the orchestrator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service error: {0}")]
    Service(String),
    #[error("playback error: {0}")]
    Playback(String),
    #[error("voice error: {0}")]
    VoiceError(String),
    #[error("turn not found: {0}")]
    TurnNotFound(TurnId),
    #[error("invalid turn transition: {0}")]
    InvalidTransition(String),
}

impl ChatError {
    /// Where this error falls in the failure taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            ChatError::Transport(_) => FailureKind::Transport,
            ChatError::Playback(_) => FailureKind::Playback,
            _ => FailureKind::Service,
        }
    }
}

impl From<ToneChatError> for ChatError {
    fn from(err: ToneChatError) -> Self {
        match err.kind() {
            FailureKind::Transport => ChatError::Transport(err.to_string()),
            FailureKind::Playback => ChatError::Playback(err.to_string()),
            FailureKind::Service => ChatError::Service(err.to_string()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
