use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Branch, FailureKind, MessageId, TurnId};

/// Everything the chat screen may need to react to.
///
/// Events are broadcast by the turn orchestrator after its state changes
/// and consumed by the UI (re-render, passive notifications) and by tests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ChatEvent {
    // =========================================================================
    // Turn lifecycle
    // =========================================================================
    /// The user's message was appended and both branches were issued.
    TurnStarted {
        turn_id: TurnId,
        message_id: MessageId,
        timestamp: DateTime<Utc>,
    },

    /// An agent reply was appended. `turn_id` is `None` for the greeting.
    ReplyAppended {
        turn_id: Option<TurnId>,
        message_id: MessageId,
        timestamp: DateTime<Utc>,
    },

    /// A tone record arrived; bubble colors must be recomputed.
    ToneScored {
        turn_id: TurnId,
        anger: f64,
        timestamp: DateTime<Utc>,
    },

    /// One branch of a turn failed. The rest of the turn proceeds.
    BranchFailed {
        turn_id: Option<TurnId>,
        branch: Branch,
        kind: FailureKind,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Both branches of a turn resolved.
    TurnCompleted {
        turn_id: TurnId,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Speech
    // =========================================================================
    /// Reply audio started playing.
    PlaybackStarted {
        turn_id: Option<TurnId>,
        bytes: usize,
        timestamp: DateTime<Utc>,
    },

    /// Reply audio could not be synthesized or played.
    PlaybackFailed {
        turn_id: Option<TurnId>,
        kind: FailureKind,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A recognition session opened.
    ListeningStarted { timestamp: DateTime<Utc> },

    /// The input draft was replaced by a newer transcript.
    TranscriptUpdated {
        text: String,
        is_final: bool,
        timestamp: DateTime<Utc>,
    },

    /// The recognizer failed; whatever was transcribed stays in the draft.
    ListeningFailed {
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A recognition session closed; `draft` is left for the user to edit.
    ListeningStopped {
        draft: String,
        timestamp: DateTime<Utc>,
    },
}

impl ChatEvent {
    /// A one-line notice for failures, shown passively by the UI.
    pub fn notice(&self) -> Option<String> {
        match self {
            ChatEvent::BranchFailed { branch, reason, .. } => {
                Some(format!("{} unavailable: {}", branch, reason))
            }
            ChatEvent::PlaybackFailed { reason, .. } => Some(format!("audio unavailable: {}", reason)),
            ChatEvent::ListeningFailed { reason, .. } => {
                Some(format!("speech recognition unavailable: {}", reason))
            }
            _ => None,
        }
    }
}
