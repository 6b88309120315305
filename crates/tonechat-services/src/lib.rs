//! tonechat services crate - contracts for the remote services behind the
//! chat screen.
//!
//! Each remote collaborator (dialogue, tone analysis, speech synthesis,
//! speech recognition) is a trait so the orchestration core can be driven by
//! the HTTP clients in this crate or by the scripted implementations in
//! [`mock`] for testing and offline use. The local audio devices
//! (microphone, speaker) are traits as well; their implementations live in
//! the application binary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use tonechat_core::config::RecognitionConfig;
use tonechat_core::error::Result;
use tonechat_core::types::{
    AudioClip, DialogueContext, DialogueReply, PartialTranscript, ToneCategory, ToneScore,
};

pub mod dialogue;
pub mod http;
pub mod mock;
pub mod recognition;
pub mod synthesis;
pub mod tone;

#[cfg(test)]
mod testing;

pub use dialogue::HttpDialogueService;
pub use recognition::HttpSpeechRecognizer;
pub use synthesis::HttpSpeechSynthesizer;
pub use tone::HttpToneService;

// =============================================================================
// Dialogue
// =============================================================================

/// One request to the dialogue service.
///
/// `text` is `None` when opening a conversation; `context` is `None` for the
/// first request of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DialogueRequest {
    pub text: Option<String>,
    pub context: Option<DialogueContext>,
}

impl DialogueRequest {
    pub fn new(text: impl Into<String>, context: Option<DialogueContext>) -> Self {
        Self {
            text: Some(text.into()),
            context,
        }
    }

    /// The request that opens a fresh conversation.
    pub fn opening() -> Self {
        Self::default()
    }
}

/// Stateful conversation service. Context is carried by the caller.
#[async_trait]
pub trait DialogueService: Send + Sync {
    async fn message(&self, request: DialogueRequest) -> Result<DialogueReply>;
}

// =============================================================================
// Tone
// =============================================================================

/// One category as returned by the tone service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    /// e.g. `emotion_tone`. May be empty if the service omits it.
    pub category_id: String,
    pub category_name: String,
    pub tones: Vec<ToneScore>,
}

/// Raw document-level tone analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToneAnalysis {
    pub categories: Vec<CategoryScores>,
}

impl ToneAnalysis {
    /// Find a category by service id, falling back to its positional slot
    /// when the service did not label categories.
    pub fn category(&self, category: ToneCategory) -> Option<&CategoryScores> {
        if let Some(found) = self
            .categories
            .iter()
            .find(|c| c.category_id == category.service_id())
        {
            return Some(found);
        }
        if self.categories.iter().all(|c| c.category_id.is_empty()) {
            let slot = ToneCategory::ALL.iter().position(|c| *c == category)?;
            return self.categories.get(slot);
        }
        None
    }
}

/// Sentiment service scoring text across the requested categories.
#[async_trait]
pub trait ToneService: Send + Sync {
    async fn analyze(&self, text: &str, categories: &[ToneCategory]) -> Result<ToneAnalysis>;
}

// =============================================================================
// Speech
// =============================================================================

/// Text to audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioClip>;
}

/// Settings for one recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionSettings {
    /// Format of the captured audio.
    pub content_type: String,
    /// Emit interim transcripts while audio is still arriving.
    pub interim_results: bool,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            content_type: "audio/ogg;codecs=opus".to_string(),
            interim_results: true,
        }
    }
}

impl From<&RecognitionConfig> for RecognitionSettings {
    fn from(config: &RecognitionConfig) -> Self {
        Self {
            content_type: config.content_type.clone(),
            interim_results: config.interim_results,
        }
    }
}

/// Streaming audio to text.
///
/// Implementations push transcripts into `results` until `stop` flips to
/// `true` (or its sender is dropped), then return. Returning drops `results`,
/// which closes the caller's stream.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(
        &self,
        settings: RecognitionSettings,
        results: mpsc::Sender<PartialTranscript>,
        stop: watch::Receiver<bool>,
    ) -> Result<()>;
}

// =============================================================================
// Local devices
// =============================================================================

/// The single playback channel.
pub trait AudioPlayer: Send + Sync {
    /// Start playing `clip`. Callers stop any previous clip first.
    fn play(&self, clip: &AudioClip) -> Result<()>;
    /// Stop whatever is playing. No-op when idle.
    fn stop(&self);
    fn is_playing(&self) -> bool;
}

/// A live capture opened from a [`Microphone`].
#[async_trait]
pub trait AudioSource: Send {
    /// Next chunk of encoded audio, or `None` when the capture ended.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Audio capture device.
#[async_trait]
pub trait Microphone: Send + Sync {
    async fn open(&self, content_type: &str) -> Result<Box<dyn AudioSource>>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: &str, scores: &[f64]) -> CategoryScores {
        CategoryScores {
            category_id: id.to_string(),
            category_name: id.to_string(),
            tones: scores
                .iter()
                .map(|s| ToneScore::new("t", "T", *s))
                .collect(),
        }
    }

    #[test]
    fn test_category_lookup_by_id_ignores_order() {
        let analysis = ToneAnalysis {
            categories: vec![
                category("social_tone", &[0.1]),
                category("emotion_tone", &[0.9]),
            ],
        };
        let emotion = analysis.category(ToneCategory::Emotion).unwrap();
        assert_eq!(emotion.tones[0].score, 0.9);
        assert!(analysis.category(ToneCategory::Language).is_none());
    }

    #[test]
    fn test_category_lookup_falls_back_to_position() {
        let analysis = ToneAnalysis {
            categories: vec![
                category("", &[0.4]),
                category("", &[0.5]),
                category("", &[0.6]),
            ],
        };
        assert_eq!(
            analysis.category(ToneCategory::Social).unwrap().tones[0].score,
            0.6
        );
    }

    #[test]
    fn test_dialogue_request_constructors() {
        let opening = DialogueRequest::opening();
        assert!(opening.text.is_none());
        assert!(opening.context.is_none());

        let ctx = DialogueContext(serde_json::json!({"conversation_id": "c1"}));
        let req = DialogueRequest::new("hi", Some(ctx.clone()));
        assert_eq!(req.text.as_deref(), Some("hi"));
        assert_eq!(req.context, Some(ctx));
    }

    #[test]
    fn test_recognition_settings_from_config() {
        let config = RecognitionConfig {
            interim_results: false,
            content_type: "audio/wav".into(),
            ..RecognitionConfig::default()
        };
        let settings = RecognitionSettings::from(&config);
        assert_eq!(settings.content_type, "audio/wav");
        assert!(!settings.interim_results);
        assert!(RecognitionSettings::default().interim_results);
    }
}
