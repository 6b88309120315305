//! Per-turn state keyed by turn id.
//!
//! Turn lifecycle:
//! - Composing -> Sent (user submitted, message appended)
//! - Sent -> Awaiting (dialogue and tone branches issued)
//! - Awaiting -> Completed (both branches resolved, successfully or not)
//!
//! Each turn also carries the status of its two branches. The tone status
//! is what bubble rendering reads; nothing is inferred from list positions.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tonechat_core::types::{FailureKind, MessageId, ToneScoreRecord, TurnId};

use crate::error::ChatError;
use crate::tone::AngerSeries;

/// Lifecycle phase of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurnPhase {
    /// The user is still editing the utterance.
    Composing,
    /// The user message is in the store; branches not issued yet.
    Sent,
    /// Dialogue and/or tone calls are in flight.
    Awaiting,
    /// Both branches resolved.
    Completed,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnPhase::Composing => write!(f, "Composing"),
            TurnPhase::Sent => write!(f, "Sent"),
            TurnPhase::Awaiting => write!(f, "Awaiting"),
            TurnPhase::Completed => write!(f, "Completed"),
        }
    }
}

impl TurnPhase {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &TurnPhase) -> bool {
        matches!(
            (self, target),
            (TurnPhase::Composing, TurnPhase::Sent)
                | (TurnPhase::Sent, TurnPhase::Awaiting)
                | (TurnPhase::Awaiting, TurnPhase::Completed)
        )
    }
}

/// Status of the dialogue branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchStatus {
    Awaiting,
    Succeeded,
    Failed(FailureKind),
}

/// Tone state of a user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToneState {
    Pending,
    Scored(ToneScoreRecord),
    Failed(FailureKind),
}

impl ToneState {
    pub fn record(&self) -> Option<&ToneScoreRecord> {
        match self {
            ToneState::Scored(record) => Some(record),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ToneState::Pending)
    }
}

/// Everything known about one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn_id: TurnId,
    /// Issue order, starting at 0.
    pub seq: u64,
    pub message_id: MessageId,
    pub phase: TurnPhase,
    pub dialogue: BranchStatus,
    pub tone: ToneState,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TurnRecord {
    fn new(turn_id: TurnId, seq: u64, message_id: MessageId) -> Self {
        Self {
            turn_id,
            seq,
            message_id,
            phase: TurnPhase::Composing,
            dialogue: BranchStatus::Awaiting,
            tone: ToneState::Pending,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Both branches have resolved.
    pub fn is_settled(&self) -> bool {
        self.dialogue != BranchStatus::Awaiting && !self.tone.is_pending()
    }

    fn transition(&mut self, target: TurnPhase) -> Result<(), ChatError> {
        if !self.phase.can_transition_to(&target) {
            return Err(ChatError::InvalidTransition(format!(
                "{}: {} -> {}",
                self.turn_id, self.phase, target
            )));
        }
        tracing::debug!(turn_id = %self.turn_id, "Turn state: {} -> {}", self.phase, target);
        self.phase = target;
        Ok(())
    }
}

/// Per-turn state for the whole conversation.
///
/// Owns the anger series so a tone record and its series point are added
/// under the same lock.
#[derive(Debug, Default)]
pub struct TurnLedger {
    turns: HashMap<TurnId, TurnRecord>,
    order: Vec<TurnId>,
    series: AngerSeries,
}

impl TurnLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a submitted turn (Composing -> Sent).
    pub fn open(&mut self, turn_id: TurnId, message_id: MessageId) -> Result<(), ChatError> {
        if self.turns.contains_key(&turn_id) {
            return Err(ChatError::InvalidTransition(format!(
                "turn {} already open",
                turn_id
            )));
        }
        let mut record = TurnRecord::new(turn_id, self.order.len() as u64, message_id);
        record.transition(TurnPhase::Sent)?;
        self.turns.insert(turn_id, record);
        self.order.push(turn_id);
        Ok(())
    }

    /// Mark both branches as issued (Sent -> Awaiting).
    pub fn issue(&mut self, turn_id: TurnId) -> Result<(), ChatError> {
        self.get_mut(turn_id)?.transition(TurnPhase::Awaiting)
    }

    /// Record the dialogue outcome. Returns `true` when this completed the
    /// turn.
    pub fn resolve_dialogue(
        &mut self,
        turn_id: TurnId,
        status: BranchStatus,
    ) -> Result<bool, ChatError> {
        let record = self.get_mut(turn_id)?;
        record.dialogue = status;
        Self::try_complete(record)
    }

    /// Record the tone outcome; a scored record also extends the anger
    /// series. Returns `true` when this completed the turn.
    pub fn resolve_tone(&mut self, turn_id: TurnId, state: ToneState) -> Result<bool, ChatError> {
        let record = self.turns.get_mut(&turn_id).ok_or(ChatError::TurnNotFound(turn_id))?;
        if !record.tone.is_pending() {
            return Err(ChatError::InvalidTransition(format!(
                "tone of turn {} already resolved",
                turn_id
            )));
        }
        if let ToneState::Scored(tone) = &state {
            self.series.record(record.seq, turn_id, tone.anger());
        }
        record.tone = state;
        Self::try_complete(record)
    }

    fn try_complete(record: &mut TurnRecord) -> Result<bool, ChatError> {
        if record.phase == TurnPhase::Awaiting && record.is_settled() {
            record.transition(TurnPhase::Completed)?;
            record.completed_at = Some(Utc::now());
            return Ok(true);
        }
        Ok(false)
    }

    fn get_mut(&mut self, turn_id: TurnId) -> Result<&mut TurnRecord, ChatError> {
        self.turns
            .get_mut(&turn_id)
            .ok_or(ChatError::TurnNotFound(turn_id))
    }

    pub fn get(&self, turn_id: TurnId) -> Option<&TurnRecord> {
        self.turns.get(&turn_id)
    }

    pub fn tone(&self, turn_id: TurnId) -> Option<&ToneState> {
        self.turns.get(&turn_id).map(|r| &r.tone)
    }

    /// Turns in issue order.
    pub fn turns(&self) -> impl Iterator<Item = &TurnRecord> {
        self.order.iter().filter_map(|id| self.turns.get(id))
    }

    /// Scored tone records in issue order.
    pub fn records(&self) -> Vec<ToneScoreRecord> {
        self.turns()
            .filter_map(|r| r.tone.record().cloned())
            .collect()
    }

    pub fn anger_series(&self) -> &AngerSeries {
        &self.series
    }

    /// Turns with at least one branch still in flight.
    pub fn in_flight(&self) -> usize {
        self.turns
            .values()
            .filter(|r| r.phase != TurnPhase::Completed)
            .count()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
