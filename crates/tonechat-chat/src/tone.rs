//! Tone scoring and the anger series derived from it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tonechat_core::types::{ToneCategory, ToneScore, ToneScoreRecord, TurnId};
use tonechat_services::{ToneAnalysis, ToneService};

use crate::error::ChatError;

/// Scores utterances across the three fixed tone categories.
pub struct ToneScorer {
    service: Arc<dyn ToneService>,
}

impl ToneScorer {
    pub fn new(service: Arc<dyn ToneService>) -> Self {
        Self { service }
    }

    /// Score `utterance` for `turn_id`.
    ///
    /// Fails with a service error when the emotion category is missing or
    /// empty, since the anger score could not be derived.
    pub async fn score(
        &self,
        turn_id: TurnId,
        utterance: &str,
    ) -> Result<ToneScoreRecord, ChatError> {
        let analysis = self.service.analyze(utterance, &ToneCategory::ALL).await?;
        let record = build_record(turn_id, &analysis)?;
        tracing::debug!(
            turn_id = %turn_id,
            anger = record.anger(),
            "Tone scored"
        );
        Ok(record)
    }
}

/// Map a raw analysis onto a [`ToneScoreRecord`], clamping every score.
pub fn build_record(
    turn_id: TurnId,
    analysis: &ToneAnalysis,
) -> Result<ToneScoreRecord, ChatError> {
    let scores = |category: ToneCategory| -> Vec<ToneScore> {
        analysis
            .category(category)
            .map(|c| c.tones.iter().map(clamped).collect())
            .unwrap_or_default()
    };

    let emotion = scores(ToneCategory::Emotion);
    if emotion.is_empty() {
        return Err(ChatError::Service(
            "tone response carried no emotion scores".to_string(),
        ));
    }

    Ok(ToneScoreRecord {
        turn_id,
        emotion,
        language: scores(ToneCategory::Language),
        social: scores(ToneCategory::Social),
    })
}

fn clamped(score: &ToneScore) -> ToneScore {
    let value = if score.score.is_nan() {
        0.0
    } else {
        score.score.clamp(0.0, 1.0)
    };
    ToneScore::new(score.tone_id.clone(), score.label.clone(), value)
}

// =============================================================================
// Anger series
// =============================================================================

/// One point of the anger series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct AngerPoint {
    /// Issue order of the turn, starting at 0.
    pub seq: u64,
    pub turn_id: TurnId,
    pub anger: f64,
}

/// Anger score per scored turn, kept in turn issue order.
///
/// Derived for display only. Tone results of overlapping turns may arrive
/// out of order; points are inserted by `seq` so the series always reads in
/// the order the user spoke.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AngerSeries {
    points: Vec<AngerPoint>,
}

impl AngerSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the anger of a scored turn. A turn is recorded at most once.
    pub fn record(&mut self, seq: u64, turn_id: TurnId, anger: f64) -> bool {
        if self.points.iter().any(|p| p.turn_id == turn_id) {
            return false;
        }
        let at = self.points.partition_point(|p| p.seq < seq);
        self.points.insert(at, AngerPoint { seq, turn_id, anger });
        true
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.anger).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Mean anger, or `None` for an empty series.
    pub fn mean(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        Some(self.points.iter().map(|p| p.anger).sum::<f64>() / self.points.len() as f64)
    }
}

// =============================================================================
// Tests
// =============================================================================
