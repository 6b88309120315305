//! Speech in and out of the chat screen.
//!
//! Outbound, [`SpeechBridge::speak`] synthesizes a reply and plays it on the
//! single playback channel, stopping whatever was playing. Inbound,
//! [`SpeechBridge::start_listening`] opens a recognition session whose
//! transcripts replace the input draft until [`SpeechBridge::stop_listening`]
//! is called. Opening a session stops the previous one first.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use tonechat_core::events::ChatEvent;
use tonechat_core::types::{PartialTranscript, TurnId};
use tonechat_services::{AudioPlayer, RecognitionSettings, SpeechRecognizer, SpeechSynthesizer};

use crate::error::ChatError;
use crate::lock;

/// Transcripts buffered per session before the consumer falls behind.
const TRANSCRIPT_BUFFER: usize = 32;

/// A running recognition session.
struct ListenSession {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Bridge between the chat and the speech services.
pub struct SpeechBridge {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    recognizer: Arc<dyn SpeechRecognizer>,
    player: Arc<dyn AudioPlayer>,
    settings: RecognitionSettings,
    synthesis_timeout: Duration,
    events: broadcast::Sender<ChatEvent>,
    /// Bumped by every `speak`; a clip only plays if its generation is
    /// still current.
    generation: Mutex<u64>,
    session: tokio::sync::Mutex<Option<ListenSession>>,
    draft: Arc<Mutex<String>>,
}

impl SpeechBridge {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        recognizer: Arc<dyn SpeechRecognizer>,
        player: Arc<dyn AudioPlayer>,
        settings: RecognitionSettings,
        synthesis_timeout: Duration,
        events: broadcast::Sender<ChatEvent>,
    ) -> Self {
        Self {
            synthesizer,
            recognizer,
            player,
            settings,
            synthesis_timeout,
            events,
            generation: Mutex::new(0),
            session: tokio::sync::Mutex::new(None),
            draft: Arc::new(Mutex::new(String::new())),
        }
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Synthesize `text` and play it, preempting any earlier playback.
    ///
    /// A newer `speak` call wins even if this one's synthesis finishes last;
    /// the stale clip is dropped and `Ok` is returned.
    pub async fn speak(&self, text: &str, turn_id: Option<TurnId>) -> Result<(), ChatError> {
        let generation = {
            let mut current = lock(&self.generation, "playback generation");
            *current += 1;
            *current
        };
        self.player.stop();

        let clip = match tokio::time::timeout(
            self.synthesis_timeout,
            self.synthesizer.synthesize(text),
        )
        .await
        {
            Ok(Ok(clip)) => clip,
            Ok(Err(e)) => return Err(self.playback_failed(turn_id, e.into())),
            Err(_) => {
                let err = ChatError::Transport(format!(
                    "synthesis timed out after {}s",
                    self.synthesis_timeout.as_secs_f64()
                ));
                return Err(self.playback_failed(turn_id, err));
            }
        };

        {
            let current = lock(&self.generation, "playback generation");
            if *current != generation {
                tracing::debug!(?turn_id, "Dropping superseded reply audio");
                return Ok(());
            }
            self.player.stop();
            if let Err(e) = self.player.play(&clip) {
                drop(current);
                return Err(self.playback_failed(turn_id, e.into()));
            }
        }

        tracing::info!(?turn_id, bytes = clip.data.len(), "Playing reply audio");
        let _ = self.events.send(ChatEvent::PlaybackStarted {
            turn_id,
            bytes: clip.data.len(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Stop playback without starting anything new.
    pub fn stop_speaking(&self) {
        *lock(&self.generation, "playback generation") += 1;
        self.player.stop();
    }

    pub fn is_speaking(&self) -> bool {
        self.player.is_playing()
    }

    fn playback_failed(&self, turn_id: Option<TurnId>, err: ChatError) -> ChatError {
        tracing::warn!(?turn_id, error = %err, "Reply audio unavailable");
        let _ = self.events.send(ChatEvent::PlaybackFailed {
            turn_id,
            kind: err.kind(),
            reason: err.to_string(),
            timestamp: Utc::now(),
        });
        err
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Open a recognition session and return its transcript stream.
    ///
    /// Any session already running is stopped and awaited first, so its
    /// stream ends before the new one yields anything. Playback is stopped
    /// too. The draft is cleared and then replaced by each transcript.
    pub async fn start_listening(&self) -> Result<ReceiverStream<PartialTranscript>, ChatError> {
        let mut slot = self.session.lock().await;
        if let Some(previous) = slot.take() {
            tracing::debug!("Preempting previous recognition session");
            self.finish(previous).await;
        }
        self.stop_speaking();
        lock(&self.draft, "draft").clear();

        let (stop_tx, stop_rx) = watch::channel(false);
        let (raw_tx, mut raw_rx) = mpsc::channel::<PartialTranscript>(TRANSCRIPT_BUFFER);
        let (out_tx, out_rx) = mpsc::channel(TRANSCRIPT_BUFFER);

        let recognizer = Arc::clone(&self.recognizer);
        let settings = self.settings.clone();
        let draft = Arc::clone(&self.draft);
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            let recognize = recognizer.recognize(settings, raw_tx, stop_rx);
            let forward = async {
                while let Some(transcript) = raw_rx.recv().await {
                    *lock(&draft, "draft") = transcript.text.clone();
                    let _ = events.send(ChatEvent::TranscriptUpdated {
                        text: transcript.text.clone(),
                        is_final: transcript.is_final,
                        timestamp: Utc::now(),
                    });
                    // The draft is authoritative; a slow consumer only
                    // misses intermediate transcripts.
                    if let Err(mpsc::error::TrySendError::Full(_)) = out_tx.try_send(transcript) {
                        tracing::debug!("Transcript consumer lagging");
                    }
                }
            };
            let (result, ()) = tokio::join!(recognize, forward);
            if let Err(e) = result {
                tracing::warn!(error = %e, "Speech recognition failed");
                let _ = events.send(ChatEvent::ListeningFailed {
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        });

        *slot = Some(ListenSession {
            stop: stop_tx,
            task,
        });
        tracing::info!("Listening");
        let _ = self.events.send(ChatEvent::ListeningStarted {
            timestamp: Utc::now(),
        });
        Ok(ReceiverStream::new(out_rx))
    }

    /// Stop the running session and return the draft it left behind.
    pub async fn stop_listening(&self) -> Result<String, ChatError> {
        let session = self
            .session
            .lock()
            .await
            .take()
            .ok_or_else(|| ChatError::VoiceError("not listening".to_string()))?;
        Ok(self.finish(session).await)
    }

    async fn finish(&self, session: ListenSession) -> String {
        let _ = session.stop.send(true);
        if let Err(e) = session.task.await {
            tracing::warn!(error = %e, "Recognition task ended abnormally");
        }
        let draft = self.draft();
        tracing::info!(chars = draft.len(), "Stopped listening");
        let _ = self.events.send(ChatEvent::ListeningStopped {
            draft: draft.clone(),
            timestamp: Utc::now(),
        });
        draft
    }

    pub async fn is_listening(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Current input draft.
    pub fn draft(&self) -> String {
        lock(&self.draft, "draft").clone()
    }

    /// Replace the draft, e.g. after the user edited it.
    pub fn set_draft(&self, text: impl Into<String>) {
        *lock(&self.draft, "draft") = text.into();
    }

    /// Take the draft, leaving it empty.
    pub fn take_draft(&self) -> String {
        std::mem::take(&mut *lock(&self.draft, "draft"))
    }
}

// =============================================================================
// Tests
// =============================================================================
