//! Turn orchestrator: central coordinator wiring store, session, scorer and
//! speech.
//!
//! `handle_turn` appends the user message, then spawns the dialogue and tone
//! branches as independent tasks. Each branch is bounded by a timeout and
//! fails on its own; neither waits for the other. Turns may overlap.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use tonechat_core::config::{HighlightMode, ToneChatConfig};
use tonechat_core::events::ChatEvent;
use tonechat_core::types::{
    Branch, DialogueContext, Message, MessageId, PartialTranscript, ServiceKind,
    ToneScoreRecord, TurnId,
};
use tonechat_services::{
    AudioPlayer, DialogueService, RecognitionSettings, SpeechRecognizer, SpeechSynthesizer,
    ToneService,
};

use crate::error::ChatError;
use crate::lock;
use crate::render::{self, Palette, RenderedMessage};
use crate::session::DialogueSession;
use crate::store::MessageStore;
use crate::tone::{AngerSeries, ToneScorer};
use crate::turn::{BranchStatus, ToneState, TurnLedger, TurnRecord};
use crate::voice::SpeechBridge;

/// Capacity of the event channel.
const EVENT_CAPACITY: usize = 256;

/// Runtime settings of the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound for each dialogue / tone call.
    pub branch_timeout: Duration,
    pub synthesis_timeout: Duration,
    /// Maximum message length in characters.
    pub max_message_length: usize,
    /// Speak agent replies aloud.
    pub speak_replies: bool,
    pub highlight: HighlightMode,
    pub palette: Palette,
    pub recognition: RecognitionSettings,
}

impl From<&ToneChatConfig> for OrchestratorConfig {
    fn from(config: &ToneChatConfig) -> Self {
        Self {
            branch_timeout: config.turn.branch_timeout(),
            synthesis_timeout: config.turn.synthesis_timeout(),
            max_message_length: config.turn.max_message_length,
            speak_replies: config.turn.speak_replies,
            highlight: config.display.highlight,
            palette: Palette::from(&config.display),
            recognition: RecognitionSettings::from(&config.recognition),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&ToneChatConfig::default())
    }
}

/// The remote collaborators and local devices.
#[derive(Clone)]
pub struct Services {
    pub dialogue: Arc<dyn DialogueService>,
    pub tone: Arc<dyn ToneService>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub player: Arc<dyn AudioPlayer>,
}

struct Shared {
    config: OrchestratorConfig,
    store: MessageStore,
    session: DialogueSession,
    scorer: ToneScorer,
    speech: SpeechBridge,
    ledger: Mutex<TurnLedger>,
    events: broadcast::Sender<ChatEvent>,
}

impl Shared {
    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Central chat orchestrator. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct TurnOrchestrator {
    shared: Arc<Shared>,
}

impl TurnOrchestrator {
    pub fn new(services: Services, config: OrchestratorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let speech = SpeechBridge::new(
            services.synthesizer,
            services.recognizer,
            services.player,
            config.recognition.clone(),
            config.synthesis_timeout,
            events.clone(),
        );
        Self {
            shared: Arc::new(Shared {
                store: MessageStore::new(),
                session: DialogueSession::new(services.dialogue),
                scorer: ToneScorer::new(services.tone),
                speech,
                ledger: Mutex::new(TurnLedger::new()),
                events,
                config,
            }),
        }
    }

    /// Subscribe to chat events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    // =========================================================================
    // Turns
    // =========================================================================

    /// Open the conversation and append the greeting.
    ///
    /// The greeting is not tied to a user turn. It is spoken like any reply.
    pub async fn open_conversation(&self) -> Result<MessageId, ChatError> {
        let shared = &self.shared;
        let outcome = within(
            ServiceKind::Dialogue,
            shared.config.branch_timeout,
            shared.session.open(),
        )
        .await;

        let reply = match outcome {
            Ok(reply) => reply,
            Err(err) => {
                branch_failed(shared, None, Branch::Dialogue, &err);
                return Err(err);
            }
        };

        let message_id = shared.store.append(Message::agent(None, reply.text.clone()));
        tracing::info!(message_id = %message_id, "Conversation opened");
        shared.emit(ChatEvent::ReplyAppended {
            turn_id: None,
            message_id,
            timestamp: Utc::now(),
        });
        spawn_speak(&self.shared, reply.text, None);
        Ok(message_id)
    }

    /// Submit a user utterance.
    ///
    /// The user message is appended before either branch is issued. The
    /// returned handle resolves when both branches (and reply playback, if
    /// any) have finished; dropping it does not cancel anything.
    pub fn handle_turn(&self, text: &str) -> Result<TurnHandle, ChatError> {
        let shared = &self.shared;
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.chars().count() > shared.config.max_message_length {
            return Err(ChatError::MessageTooLong(shared.config.max_message_length));
        }

        let turn_id = TurnId::new();
        let message = Message::user(turn_id, text);
        let message_id = message.id;

        // The ledger knows the turn before the message becomes visible, so a
        // render never sees a user message without tone state.
        lock(&shared.ledger, "turn ledger").open(turn_id, message_id)?;
        shared.store.append(message);
        let context = shared.session.current_context();
        lock(&shared.ledger, "turn ledger").issue(turn_id)?;

        tracing::info!(turn_id = %turn_id, chars = text.len(), "Turn started");
        shared.emit(ChatEvent::TurnStarted {
            turn_id,
            message_id,
            timestamp: Utc::now(),
        });

        let dialogue = tokio::spawn(dialogue_branch(
            Arc::clone(&self.shared),
            turn_id,
            text.to_string(),
            context,
        ));
        let tone = tokio::spawn(tone_branch(
            Arc::clone(&self.shared),
            turn_id,
            text.to_string(),
        ));

        Ok(TurnHandle {
            turn_id,
            message_id,
            dialogue,
            tone,
        })
    }

    /// Submit the current speech draft as a turn and clear it.
    pub fn send_draft(&self) -> Result<TurnHandle, ChatError> {
        let draft = self.shared.speech.draft();
        let handle = self.handle_turn(&draft)?;
        self.shared.speech.take_draft();
        Ok(handle)
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// All messages in order.
    pub fn messages(&self) -> Vec<Message> {
        self.shared.store.snapshot()
    }

    /// Messages with their bubble styles.
    pub fn render(&self) -> Vec<RenderedMessage> {
        let messages = self.shared.store.snapshot();
        let ledger = lock(&self.shared.ledger, "turn ledger");
        render::render(
            &messages,
            &ledger,
            &self.shared.config.palette,
            self.shared.config.highlight,
        )
    }

    /// Anger score of every scored turn, in turn order.
    pub fn anger_series(&self) -> AngerSeries {
        lock(&self.shared.ledger, "turn ledger")
            .anger_series()
            .clone()
    }

    /// Tone state of one turn.
    pub fn tone_for(&self, turn_id: TurnId) -> Option<ToneState> {
        lock(&self.shared.ledger, "turn ledger")
            .tone(turn_id)
            .cloned()
    }

    /// Snapshot of one turn.
    pub fn turn(&self, turn_id: TurnId) -> Option<TurnRecord> {
        lock(&self.shared.ledger, "turn ledger")
            .get(turn_id)
            .cloned()
    }

    /// Every tone record received so far, in turn order.
    pub fn tone_records(&self) -> Vec<ToneScoreRecord> {
        lock(&self.shared.ledger, "turn ledger").records()
    }

    /// Number of turns with a branch still in flight.
    pub fn turns_in_flight(&self) -> usize {
        lock(&self.shared.ledger, "turn ledger").in_flight()
    }

    /// The dialogue context the next turn would carry.
    pub fn context(&self) -> Option<DialogueContext> {
        self.shared.session.current_context()
    }

    // =========================================================================
    // Speech
    // =========================================================================

    pub fn speech(&self) -> &SpeechBridge {
        &self.shared.speech
    }

    pub async fn start_listening(&self) -> Result<ReceiverStream<PartialTranscript>, ChatError> {
        self.shared.speech.start_listening().await
    }

    pub async fn stop_listening(&self) -> Result<String, ChatError> {
        self.shared.speech.stop_listening().await
    }
}

// =============================================================================
// Branches
// =============================================================================

async fn within<T, F>(service: ServiceKind, limit: Duration, call: F) -> Result<T, ChatError>
where
    F: Future<Output = Result<T, ChatError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ChatError::Transport(format!(
            "{} did not answer within {}s",
            service,
            limit.as_secs_f64()
        ))),
    }
}

fn branch_failed(shared: &Shared, turn_id: Option<TurnId>, branch: Branch, err: &ChatError) {
    tracing::warn!(?turn_id, branch = %branch, error = %err, "Branch failed");
    shared.emit(ChatEvent::BranchFailed {
        turn_id,
        branch,
        kind: err.kind(),
        reason: err.to_string(),
        timestamp: Utc::now(),
    });
}

fn settle(shared: &Shared, turn_id: TurnId, completed: Result<bool, ChatError>) {
    match completed {
        Ok(true) => {
            tracing::info!(turn_id = %turn_id, "Turn completed");
            shared.emit(ChatEvent::TurnCompleted {
                turn_id,
                timestamp: Utc::now(),
            });
        }
        Ok(false) => {}
        Err(e) => tracing::warn!(turn_id = %turn_id, error = %e, "Turn ledger rejected update"),
    }
}

fn spawn_speak(
    shared: &Arc<Shared>,
    text: String,
    turn_id: Option<TurnId>,
) -> Option<JoinHandle<Result<(), ChatError>>> {
    if !shared.config.speak_replies || text.trim().is_empty() {
        return None;
    }
    let shared = Arc::clone(shared);
    Some(tokio::spawn(async move {
        shared.speech.speak(&text, turn_id).await
    }))
}

/// What the dialogue branch hands back to the turn handle.
struct DialogueDone {
    message_id: MessageId,
    playback: Option<JoinHandle<Result<(), ChatError>>>,
}

async fn dialogue_branch(
    shared: Arc<Shared>,
    turn_id: TurnId,
    text: String,
    context: Option<DialogueContext>,
) -> Result<DialogueDone, ChatError> {
    let outcome = within(
        ServiceKind::Dialogue,
        shared.config.branch_timeout,
        shared.session.send(&text, context),
    )
    .await;

    match outcome {
        Ok(reply) => {
            let message_id = shared
                .store
                .append(Message::agent(Some(turn_id), reply.text.clone()));
            shared.emit(ChatEvent::ReplyAppended {
                turn_id: Some(turn_id),
                message_id,
                timestamp: Utc::now(),
            });
            let playback = spawn_speak(&shared, reply.text, Some(turn_id));
            let completed = lock(&shared.ledger, "turn ledger")
                .resolve_dialogue(turn_id, BranchStatus::Succeeded);
            settle(&shared, turn_id, completed);
            Ok(DialogueDone {
                message_id,
                playback,
            })
        }
        Err(err) => {
            branch_failed(&shared, Some(turn_id), Branch::Dialogue, &err);
            let completed = lock(&shared.ledger, "turn ledger")
                .resolve_dialogue(turn_id, BranchStatus::Failed(err.kind()));
            settle(&shared, turn_id, completed);
            Err(err)
        }
    }
}

async fn tone_branch(
    shared: Arc<Shared>,
    turn_id: TurnId,
    text: String,
) -> Result<ToneScoreRecord, ChatError> {
    let outcome = within(
        ServiceKind::Tone,
        shared.config.branch_timeout,
        shared.scorer.score(turn_id, &text),
    )
    .await;

    match outcome {
        Ok(record) => {
            let anger = record.anger();
            let completed = lock(&shared.ledger, "turn ledger")
                .resolve_tone(turn_id, ToneState::Scored(record.clone()));
            shared.emit(ChatEvent::ToneScored {
                turn_id,
                anger,
                timestamp: Utc::now(),
            });
            settle(&shared, turn_id, completed);
            Ok(record)
        }
        Err(err) => {
            branch_failed(&shared, Some(turn_id), Branch::Tone, &err);
            let completed = lock(&shared.ledger, "turn ledger")
                .resolve_tone(turn_id, ToneState::Failed(err.kind()));
            settle(&shared, turn_id, completed);
            Err(err)
        }
    }
}

// =============================================================================
// Turn handle
// =============================================================================

/// Handle to a turn whose branches are running.
pub struct TurnHandle {
    pub turn_id: TurnId,
    /// The user message that opened the turn.
    pub message_id: MessageId,
    dialogue: JoinHandle<Result<DialogueDone, ChatError>>,
    tone: JoinHandle<Result<ToneScoreRecord, ChatError>>,
}

/// Final outcome of a turn.
#[derive(Debug)]
pub struct TurnOutcome {
    pub turn_id: TurnId,
    /// Id of the appended agent reply.
    pub reply: Result<MessageId, ChatError>,
    pub tone: Result<ToneScoreRecord, ChatError>,
    /// Reply playback, if a reply was spoken.
    pub playback: Option<Result<(), ChatError>>,
}

impl TurnHandle {
    /// Wait for both branches and for reply playback to start.
    pub async fn join(self) -> TurnOutcome {
        let (dialogue, tone) = tokio::join!(self.dialogue, self.tone);

        let (reply, playback) = match flatten(dialogue) {
            Ok(done) => {
                let playback = match done.playback {
                    Some(handle) => Some(flatten(handle.await)),
                    None => None,
                };
                (Ok(done.message_id), playback)
            }
            Err(e) => (Err(e), None),
        };

        TurnOutcome {
            turn_id: self.turn_id,
            reply,
            tone: flatten(tone),
            playback,
        }
    }
}

fn flatten<T>(
    joined: Result<Result<T, ChatError>, tokio::task::JoinError>,
) -> Result<T, ChatError> {
    joined.unwrap_or_else(|e| Err(ChatError::Service(format!("branch task aborted: {}", e))))
}

// =============================================================================
// Tests
// =============================================================================
