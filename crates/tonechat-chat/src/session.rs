//! Dialogue session holding the server-issued context token.

use std::sync::{Arc, Mutex};

use tonechat_core::types::{DialogueContext, DialogueReply};
use tonechat_services::{DialogueRequest, DialogueService};

use crate::error::ChatError;
use crate::lock;

/// One conversation with the dialogue service.
///
/// Holds exactly one live context. Every successful reply replaces it
/// (last write wins), a reply without context clears it, and failures
/// leave it untouched and are not retried.
pub struct DialogueSession {
    service: Arc<dyn DialogueService>,
    context: Mutex<Option<DialogueContext>>,
}

impl DialogueSession {
    pub fn new(service: Arc<dyn DialogueService>) -> Self {
        Self {
            service,
            context: Mutex::new(None),
        }
    }

    /// The context the next request would carry.
    pub fn current_context(&self) -> Option<DialogueContext> {
        lock(&self.context, "dialogue context").clone()
    }

    /// Send `utterance` with an explicit `context`.
    ///
    /// Callers snapshot the context when the turn is issued, so overlapping
    /// turns each carry the context that was current at their start.
    pub async fn send(
        &self,
        utterance: &str,
        context: Option<DialogueContext>,
    ) -> Result<DialogueReply, ChatError> {
        let request = DialogueRequest::new(utterance, context);
        self.exchange(request).await
    }

    /// Open the conversation: no text, no context. The greeting's context
    /// becomes the session context.
    pub async fn open(&self) -> Result<DialogueReply, ChatError> {
        self.exchange(DialogueRequest::opening()).await
    }

    async fn exchange(&self, request: DialogueRequest) -> Result<DialogueReply, ChatError> {
        let reply = self.service.message(request).await?;
        if reply.context.is_none() {
            tracing::warn!("Dialogue reply carried no context; next request starts without one");
        }
        *lock(&self.context, "dialogue context") = reply.context.clone();
        Ok(reply)
    }
}

// =============================================================================
// Tests
// =============================================================================
