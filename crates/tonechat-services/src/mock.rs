//! Scripted service implementations.
//!
//! Used by tests to drive the orchestrator deterministically and by the
//! binary's offline mode. Each scripted service pops the next queued
//! [`Step`] per call and falls back to a canned behaviour once the script
//! runs dry.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{mpsc, watch};

use tonechat_core::error::{Result, ToneChatError};
use tonechat_core::types::{
    AudioClip, DialogueContext, DialogueReply, PartialTranscript, ServiceKind, ToneCategory,
    ToneScore,
};

use crate::{
    AudioPlayer, CategoryScores, DialogueRequest, DialogueService, RecognitionSettings,
    SpeechRecognizer, SpeechSynthesizer, ToneAnalysis, ToneService,
};

/// One scripted call outcome.
#[derive(Debug, Clone)]
pub enum Step<T> {
    /// Succeed with `T` after an optional delay.
    Reply(T, Duration),
    /// Fail at the transport level.
    Transport(String),
    /// Fail with a service error payload.
    Service(String),
    /// Never answer.
    Hang,
}

impl<T> Step<T> {
    pub fn now(value: T) -> Self {
        Step::Reply(value, Duration::ZERO)
    }

    pub fn after(value: T, delay: Duration) -> Self {
        Step::Reply(value, delay)
    }

    async fn resolve(self, service: ServiceKind) -> Result<T> {
        match self {
            Step::Reply(value, delay) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(value)
            }
            Step::Transport(message) => Err(ToneChatError::transport(service, message)),
            Step::Service(message) => Err(ToneChatError::service(service, Some(500), message)),
            Step::Hang => std::future::pending().await,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Dialogue
// =============================================================================

/// Dialogue service answering from a script, then by echoing.
///
/// Every request is recorded so tests can check which context was sent.
/// The fallback reply issues a context `{"turn": n}` with `n` counting
/// answered requests.
#[derive(Default)]
pub struct ScriptedDialogue {
    script: Mutex<VecDeque<Step<DialogueReply>>>,
    requests: Mutex<Vec<DialogueRequest>>,
    answered: AtomicUsize,
}

impl ScriptedDialogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(steps: impl IntoIterator<Item = Step<DialogueReply>>) -> Self {
        let service = Self::default();
        lock(&service.script).extend(steps);
        service
    }

    pub fn push(&self, step: Step<DialogueReply>) {
        lock(&self.script).push_back(step);
    }

    /// All requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<DialogueRequest> {
        lock(&self.requests).clone()
    }

    /// Build a reply with a `{"turn": n}` context.
    pub fn reply(text: impl Into<String>, turn: u64) -> DialogueReply {
        DialogueReply {
            text: text.into(),
            context: Some(DialogueContext(json!({ "turn": turn }))),
        }
    }

    fn echo(&self, request: &DialogueRequest) -> DialogueReply {
        let n = self.answered.load(Ordering::SeqCst) as u64;
        let text = match &request.text {
            Some(text) => format!("You said: {}", text),
            None => "Hello, I'm Watson. How can I help?".to_string(),
        };
        Self::reply(text, n)
    }
}

#[async_trait]
impl DialogueService for ScriptedDialogue {
    async fn message(&self, request: DialogueRequest) -> Result<DialogueReply> {
        lock(&self.requests).push(request.clone());
        let step = lock(&self.script).pop_front();
        let result = match step {
            Some(step) => step.resolve(ServiceKind::Dialogue).await,
            None => Ok(self.echo(&request)),
        };
        if result.is_ok() {
            self.answered.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

// =============================================================================
// Tone
// =============================================================================

const ANGER_WORDS: &[&str] = &[
    "angry", "furious", "hate", "mad", "annoyed", "terrible", "worst", "awful", "useless",
];
const JOY_WORDS: &[&str] = &["thanks", "thank", "great", "love", "happy", "awesome", "good"];

/// Tone service answering from a script, then by keyword heuristics.
#[derive(Default)]
pub struct ScriptedTone {
    script: Mutex<VecDeque<Step<ToneAnalysis>>>,
    texts: Mutex<Vec<String>>,
}

impl ScriptedTone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(steps: impl IntoIterator<Item = Step<ToneAnalysis>>) -> Self {
        let service = Self::default();
        lock(&service.script).extend(steps);
        service
    }

    pub fn push(&self, step: Step<ToneAnalysis>) {
        lock(&self.script).push_back(step);
    }

    /// Texts analyzed so far.
    pub fn texts(&self) -> Vec<String> {
        lock(&self.texts).clone()
    }

    /// A full three-category analysis with the given anger score.
    pub fn analysis_with_anger(anger: f64) -> ToneAnalysis {
        Self::analysis(anger, 0.0)
    }

    fn analysis(anger: f64, joy: f64) -> ToneAnalysis {
        let emotion = vec![
            ToneScore::new("anger", "Anger", anger),
            ToneScore::new("disgust", "Disgust", anger * 0.5),
            ToneScore::new("fear", "Fear", 0.05),
            ToneScore::new("joy", "Joy", joy),
            ToneScore::new("sadness", "Sadness", 0.05),
        ];
        let language = vec![
            ToneScore::new("analytical", "Analytical", 0.0),
            ToneScore::new("confident", "Confident", 0.0),
            ToneScore::new("tentative", "Tentative", 0.0),
        ];
        let social = vec![
            ToneScore::new("openness_big5", "Openness", 0.5),
            ToneScore::new("conscientiousness_big5", "Conscientiousness", 0.5),
            ToneScore::new("extraversion_big5", "Extraversion", 0.5),
            ToneScore::new("agreeableness_big5", "Agreeableness", 1.0 - anger),
            ToneScore::new("emotional_range_big5", "Emotional Range", anger),
        ];
        let category = |c: ToneCategory, name: &str, tones: Vec<ToneScore>| CategoryScores {
            category_id: c.service_id().to_string(),
            category_name: name.to_string(),
            tones,
        };
        ToneAnalysis {
            categories: vec![
                category(ToneCategory::Emotion, "Emotion Tone", emotion),
                category(ToneCategory::Language, "Language Tone", language),
                category(ToneCategory::Social, "Social Tone", social),
            ],
        }
    }

    fn heuristic(text: &str) -> ToneAnalysis {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let hits = |list: &[&str]| {
            words
                .iter()
                .filter(|w| list.iter().any(|l| l == *w))
                .count() as f64
        };
        let shout = text.chars().filter(|c| c.is_uppercase()).count() > 3
            && !text.chars().any(|c| c.is_lowercase());
        let anger = (hits(ANGER_WORDS) * 0.45 + if shout { 0.3 } else { 0.0 }).min(1.0);
        let joy = (hits(JOY_WORDS) * 0.4).min(1.0);
        Self::analysis(anger, joy)
    }
}

#[async_trait]
impl ToneService for ScriptedTone {
    async fn analyze(&self, text: &str, _categories: &[ToneCategory]) -> Result<ToneAnalysis> {
        lock(&self.texts).push(text.to_string());
        let step = lock(&self.script).pop_front();
        match step {
            Some(step) => step.resolve(ServiceKind::Tone).await,
            None => Ok(Self::heuristic(text)),
        }
    }
}

// =============================================================================
// Speech
// =============================================================================

/// Synthesizer returning a short silent WAV unless scripted otherwise.
#[derive(Default)]
pub struct ScriptedSynthesizer {
    script: Mutex<VecDeque<Step<AudioClip>>>,
    texts: Mutex<Vec<String>>,
}

impl ScriptedSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, step: Step<AudioClip>) {
        lock(&self.script).push_back(step);
    }

    /// Texts synthesized so far.
    pub fn texts(&self) -> Vec<String> {
        lock(&self.texts).clone()
    }

    /// 44-byte WAV header followed by `samples` zeroed 16-bit mono samples.
    pub fn silence(samples: usize) -> AudioClip {
        let data_len = (samples * 2) as u32;
        let mut data = Vec::with_capacity(44 + samples * 2);
        data.extend_from_slice(b"RIFF");
        data.extend_from_slice(&(36 + data_len).to_le_bytes());
        data.extend_from_slice(b"WAVEfmt ");
        data.extend_from_slice(&16u32.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&22_050u32.to_le_bytes());
        data.extend_from_slice(&44_100u32.to_le_bytes());
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&16u16.to_le_bytes());
        data.extend_from_slice(b"data");
        data.extend_from_slice(&data_len.to_le_bytes());
        data.resize(44 + samples * 2, 0);
        AudioClip::new("audio/wav", data)
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        lock(&self.texts).push(text.to_string());
        let step = lock(&self.script).pop_front();
        match step {
            Some(step) => step.resolve(ServiceKind::Synthesis).await,
            None => Ok(Self::silence(text.len() * 100)),
        }
    }
}

/// Recognizer emitting a fixed sequence of transcripts, then idling until
/// stopped.
pub struct ScriptedRecognizer {
    transcripts: Vec<PartialTranscript>,
    interval: Duration,
    sessions: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new(transcripts: Vec<PartialTranscript>, interval: Duration) -> Self {
        Self {
            transcripts,
            interval,
            sessions: AtomicUsize::new(0),
        }
    }

    /// Interim transcripts growing word by word, ending in a final one.
    pub fn dictating(sentence: &str, interval: Duration) -> Self {
        let words: Vec<&str> = sentence.split_whitespace().collect();
        let mut transcripts: Vec<PartialTranscript> = (1..words.len())
            .map(|n| PartialTranscript::interim(words[..n].join(" ")))
            .collect();
        transcripts.push(PartialTranscript::last(words.join(" ")));
        Self::new(transcripts, interval)
    }

    /// How many sessions were opened.
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn recognize(
        &self,
        _settings: RecognitionSettings,
        results: mpsc::Sender<PartialTranscript>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<()> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        for transcript in &self.transcripts {
            if *stop.borrow() {
                return Ok(());
            }
            tokio::select! {
                biased;
                _ = stop.changed() => return Ok(()),
                _ = tokio::time::sleep(self.interval) => {}
            }
            if results.send(transcript.clone()).await.is_err() {
                return Ok(());
            }
        }
        // Live microphones never end on their own.
        while !*stop.borrow() {
            if stop.changed().await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// In-memory playback channel that records what it was asked to play.
#[derive(Default)]
pub struct MemoryPlayer {
    played: Mutex<Vec<AudioClip>>,
    playing: Mutex<bool>,
    stops: AtomicUsize,
    fail_next: Mutex<Option<String>>,
}

impl MemoryPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `play` call fail with a playback error.
    pub fn fail_next(&self, reason: impl Into<String>) {
        *lock(&self.fail_next) = Some(reason.into());
    }

    pub fn played(&self) -> Vec<AudioClip> {
        lock(&self.played).clone()
    }

    /// Number of `stop` calls that interrupted an active clip.
    pub fn interruptions(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl AudioPlayer for MemoryPlayer {
    fn play(&self, clip: &AudioClip) -> Result<()> {
        if let Some(reason) = lock(&self.fail_next).take() {
            return Err(ToneChatError::Playback(reason));
        }
        let mut playing = lock(&self.playing);
        if *playing {
            return Err(ToneChatError::Playback(
                "playback channel already in use".to_string(),
            ));
        }
        lock(&self.played).push(clip.clone());
        *playing = true;
        Ok(())
    }

    fn stop(&self) {
        let mut playing = lock(&self.playing);
        if *playing {
            self.stops.fetch_add(1, Ordering::SeqCst);
            *playing = false;
        }
    }

    fn is_playing(&self) -> bool {
        *lock(&self.playing)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_dialogue_follows_script_then_echoes() {
        let service = ScriptedDialogue::with_script([
            Step::now(ScriptedDialogue::reply("scripted", 7)),
            Step::Transport("offline".into()),
        ]);

        let first = service.message(DialogueRequest::new("a", None)).await.unwrap();
        assert_eq!(first.text, "scripted");
        assert_eq!(first.context.unwrap().0["turn"], 7);

        let second = service.message(DialogueRequest::new("b", None)).await;
        assert!(matches!(second, Err(ToneChatError::Transport { .. })));

        let third = service.message(DialogueRequest::new("c", None)).await.unwrap();
        assert_eq!(third.text, "You said: c");
        assert_eq!(third.context.unwrap().0["turn"], 1);

        assert_eq!(service.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_scripted_dialogue_opening_greets() {
        let service = ScriptedDialogue::new();
        let reply = service.message(DialogueRequest::opening()).await.unwrap();
        assert!(reply.text.starts_with("Hello"));
    }

    #[tokio::test]
    async fn test_tone_heuristic_detects_anger() {
        let service = ScriptedTone::new();
        let analysis = service
            .analyze("I am furious", &ToneCategory::ALL)
            .await
            .unwrap();
        let emotion = analysis.category(ToneCategory::Emotion).unwrap();
        assert_eq!(emotion.tones[0].tone_id, "anger");
        assert!(emotion.tones[0].score > 0.4);

        let calm = service.analyze("ok thanks", &ToneCategory::ALL).await.unwrap();
        assert_eq!(calm.category(ToneCategory::Emotion).unwrap().tones[0].score, 0.0);
        assert_eq!(service.texts(), vec!["I am furious", "ok thanks"]);
    }

    #[tokio::test]
    async fn test_tone_script_service_error() {
        let service = ScriptedTone::with_script([Step::Service("quota exceeded".into())]);
        let err = service.analyze("x", &ToneCategory::ALL).await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn test_silence_header() {
        let clip = ScriptedSynthesizer::silence(10);
        assert_eq!(clip.data.len(), 64);
        assert_eq!(&clip.data[0..4], b"RIFF");
        assert_eq!(&clip.data[8..12], b"WAVE");
        assert_eq!(clip.extension(), "wav");
    }

    #[tokio::test]
    async fn test_scripted_recognizer_emits_then_waits_for_stop() {
        let recognizer = ScriptedRecognizer::dictating("i am furious", Duration::from_millis(1));
        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            recognizer
                .recognize(RecognitionSettings::default(), tx, stop_rx)
                .await
        });

        assert_eq!(rx.recv().await.unwrap(), PartialTranscript::interim("i"));
        assert_eq!(rx.recv().await.unwrap(), PartialTranscript::interim("i am"));
        assert_eq!(rx.recv().await.unwrap(), PartialTranscript::last("i am furious"));

        stop_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_memory_player_single_channel() {
        let player = MemoryPlayer::new();
        let clip = ScriptedSynthesizer::silence(1);
        player.play(&clip).unwrap();
        assert!(player.is_playing());
        assert!(player.play(&clip).is_err());

        player.stop();
        assert!(!player.is_playing());
        assert_eq!(player.interruptions(), 1);

        player.stop();
        assert_eq!(player.interruptions(), 1);
    }

    #[test]
    fn test_memory_player_scripted_failure() {
        let player = MemoryPlayer::new();
        player.fail_next("device busy");
        let err = player.play(&ScriptedSynthesizer::silence(1)).unwrap_err();
        assert!(matches!(err, ToneChatError::Playback(_)));
        assert!(player.played().is_empty());
    }
}
