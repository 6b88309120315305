use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Who authored a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderKind {
    /// The person typing (or dictating) into the chat screen.
    User,
    /// The remote dialogue service.
    Agent,
}

impl SenderKind {
    /// Display name shown next to the bubble.
    pub fn display_name(&self) -> &'static str {
        match self {
            SenderKind::User => "Me",
            SenderKind::Agent => "Watson",
        }
    }
}

/// The remote services the chat screen talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Dialogue,
    Tone,
    Synthesis,
    Recognition,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceKind::Dialogue => write!(f, "dialogue"),
            ServiceKind::Tone => write!(f, "tone"),
            ServiceKind::Synthesis => write!(f, "synthesis"),
            ServiceKind::Recognition => write!(f, "recognition"),
        }
    }
}

/// One of the two concurrent branches of a user turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Dialogue,
    Tone,
}

impl std::fmt::Display for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Branch::Dialogue => write!(f, "dialogue"),
            Branch::Tone => write!(f, "tone"),
        }
    }
}

/// Failure taxonomy surfaced to the user as a passive notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network, auth or timeout failure reaching a remote service.
    Transport,
    /// The remote service answered with an error payload.
    Service,
    /// The local audio subsystem failed.
    Playback,
}

/// Tone category groupings returned by the tone service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToneCategory {
    Emotion,
    Language,
    Social,
}

impl ToneCategory {
    /// All categories, in the order they are requested and stored.
    pub const ALL: [ToneCategory; 3] = [
        ToneCategory::Emotion,
        ToneCategory::Language,
        ToneCategory::Social,
    ];

    /// Identifier used by the tone service for this category.
    pub fn service_id(&self) -> &'static str {
        match self {
            ToneCategory::Emotion => "emotion_tone",
            ToneCategory::Language => "language_tone",
            ToneCategory::Social => "social_tone",
        }
    }

    /// Short name used in the `tones` request parameter.
    pub fn request_name(&self) -> &'static str {
        match self {
            ToneCategory::Emotion => "emotion",
            ToneCategory::Language => "language",
            ToneCategory::Social => "social",
        }
    }
}

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier shared by a user message and the tone record of its turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TurnId(pub Uuid);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier for a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Messages
// =============================================================================

/// A single chat bubble.
///
/// Immutable once created. User messages carry the id of the turn they
/// opened; agent messages carry the id of the turn they answer, or `None`
/// for the conversation greeting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub turn_id: Option<TurnId>,
    pub sender: SenderKind,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a user message opening the given turn.
    pub fn user(turn_id: TurnId, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            turn_id: Some(turn_id),
            sender: SenderKind::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an agent message, optionally answering a turn.
    pub fn agent(turn_id: Option<TurnId>, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            turn_id,
            sender: SenderKind::Agent,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.sender == SenderKind::User
    }
}

// =============================================================================
// Dialogue
// =============================================================================

/// Opaque conversation state issued by the dialogue service.
///
/// Never inspected locally; sent back verbatim on the next request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DialogueContext(pub serde_json::Value);

/// A dialogue reply together with the context that must accompany the
/// next request. `None` when the service answered without one.
#[derive(Clone, Debug, PartialEq)]
pub struct DialogueReply {
    pub text: String,
    pub context: Option<DialogueContext>,
}

// =============================================================================
// Tone
// =============================================================================

/// One named sub-score inside a tone category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToneScore {
    /// Stable identifier, e.g. `anger`.
    pub tone_id: String,
    /// Human readable label, e.g. `Anger`.
    pub label: String,
    /// Probability-like score in [0, 1].
    pub score: f64,
}

impl ToneScore {
    pub fn new(tone_id: impl Into<String>, label: impl Into<String>, score: f64) -> Self {
        Self {
            tone_id: tone_id.into(),
            label: label.into(),
            score,
        }
    }
}

/// Tone analysis of one user utterance.
///
/// Produced once per turn whose tone call succeeded and never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToneScoreRecord {
    pub turn_id: TurnId,
    pub emotion: Vec<ToneScore>,
    pub language: Vec<ToneScore>,
    pub social: Vec<ToneScore>,
}

impl ToneScoreRecord {
    /// The anger score: first slot of the emotion vector.
    pub fn anger(&self) -> f64 {
        self.emotion.first().map(|s| s.score).unwrap_or(0.0)
    }

    /// Scores of one category, in service order.
    pub fn category(&self, category: ToneCategory) -> &[ToneScore] {
        match category {
            ToneCategory::Emotion => &self.emotion,
            ToneCategory::Language => &self.language,
            ToneCategory::Social => &self.social,
        }
    }

    /// The highest scoring tone of a category, if any.
    pub fn dominant(&self, category: ToneCategory) -> Option<&ToneScore> {
        self.category(category)
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }
}

// =============================================================================
// Speech
// =============================================================================

/// Synthesized audio returned by the speech synthesis service.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioClip {
    /// MIME type of `data`, e.g. `audio/wav`.
    pub content_type: String,
    pub data: Vec<u8>,
}

impl AudioClip {
    pub fn new(content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            data,
        }
    }

    /// File extension matching the content type.
    pub fn extension(&self) -> &'static str {
        let essence = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        match essence {
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/ogg" => "ogg",
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/flac" => "flac",
            "audio/l16" => "pcm",
            _ => "bin",
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One incremental result from the speech recognition stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartialTranscript {
    pub text: String,
    pub is_final: bool,
}

impl PartialTranscript {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn last(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

// =============================================================================
// Color
// =============================================================================

/// An RGBA color with channels in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    #[serde(default = "opaque")]
    pub a: f64,
}

fn opaque() -> f64 {
    1.0
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::rgb(1.0, 1.0, 1.0);
    pub const RED: Rgba = Rgba::rgb(1.0, 0.0, 0.0);
    /// Bubble gray used for outgoing messages.
    pub const LIGHT_GRAY: Rgba = Rgba::rgb(0.898, 0.898, 0.918);
    /// Slate blue used for incoming messages.
    pub const SLATE: Rgba = Rgba::rgb(0.29, 0.44, 0.54);

    pub const fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Channels scaled to 8-bit, rounding to nearest.
    pub fn to_rgb8(&self) -> (u8, u8, u8) {
        fn channel(v: f64) -> u8 {
            (v.clamp(0.0, 1.0) * 255.0).round() as u8
        }
        (channel(self.r), channel(self.g), channel(self.b))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(emotion: &[f64]) -> ToneScoreRecord {
        ToneScoreRecord {
            turn_id: TurnId::new(),
            emotion: emotion
                .iter()
                .enumerate()
                .map(|(i, s)| ToneScore::new(format!("e{}", i), format!("E{}", i), *s))
                .collect(),
            language: vec![],
            social: vec![],
        }
    }

    #[test]
    fn test_anger_is_first_emotion_slot() {
        let r = record(&[0.9, 0.1, 0.3]);
        assert_eq!(r.anger(), 0.9);
    }

    #[test]
    fn test_anger_defaults_to_zero_when_empty() {
        let r = record(&[]);
        assert_eq!(r.anger(), 0.0);
    }

    #[test]
    fn test_dominant_picks_highest() {
        let r = record(&[0.2, 0.7, 0.3]);
        assert_eq!(r.dominant(ToneCategory::Emotion).unwrap().tone_id, "e1");
        assert!(r.dominant(ToneCategory::Social).is_none());
    }

    #[test]
    fn test_message_constructors() {
        let turn = TurnId::new();
        let m = Message::user(turn, "hi");
        assert!(m.is_user());
        assert_eq!(m.turn_id, Some(turn));

        let a = Message::agent(None, "hello");
        assert!(!a.is_user());
        assert_eq!(a.turn_id, None);
        assert_ne!(m.id, a.id);
    }

    #[test]
    fn test_sender_display_names() {
        assert_eq!(SenderKind::User.display_name(), "Me");
        assert_eq!(SenderKind::Agent.display_name(), "Watson");
    }

    #[test]
    fn test_category_ids() {
        let ids: Vec<_> = ToneCategory::ALL.iter().map(|c| c.service_id()).collect();
        assert_eq!(ids, vec!["emotion_tone", "language_tone", "social_tone"]);
        assert_eq!(ToneCategory::Social.request_name(), "social");
    }

    #[test]
    fn test_audio_clip_extension() {
        assert_eq!(AudioClip::new("audio/wav", vec![]).extension(), "wav");
        assert_eq!(
            AudioClip::new("audio/ogg;codecs=opus", vec![]).extension(),
            "ogg"
        );
        assert_eq!(AudioClip::new("text/plain", vec![]).extension(), "bin");
    }

    #[test]
    fn test_rgba_to_rgb8_clamps() {
        assert_eq!(Rgba::WHITE.to_rgb8(), (255, 255, 255));
        assert_eq!(Rgba::RED.to_rgb8(), (255, 0, 0));
        assert_eq!(Rgba::rgb(2.0, -1.0, 0.5).to_rgb8(), (255, 0, 128));
    }

    #[test]
    fn test_rgba_alpha_defaults_when_missing() {
        let c: Rgba = serde_json::from_str(r#"{"r":0.1,"g":0.2,"b":0.3}"#).unwrap();
        assert_eq!(c.a, 1.0);
    }

    #[test]
    fn test_display_impls() {
        assert_eq!(ServiceKind::Tone.to_string(), "tone");
        assert_eq!(Branch::Dialogue.to_string(), "dialogue");
        let id = TurnId(Uuid::nil());
        assert_eq!(id.to_string(), "00000000-0000-0000-0000-000000000000");
    }
}
