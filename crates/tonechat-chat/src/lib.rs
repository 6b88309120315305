//! Turn orchestration core for the tonechat screen.
//!
//! For each submitted utterance the [`TurnOrchestrator`] appends the user
//! message, then runs two independent branches: the dialogue branch advances
//! the [`DialogueSession`] and speaks the reply through the [`SpeechBridge`],
//! the tone branch scores the utterance with the [`ToneScorer`] and feeds the
//! anger series that drives bubble colors in [`render`].

use std::sync::{Mutex, MutexGuard};

pub mod color;
pub mod error;
pub mod orchestrator;
pub mod render;
pub mod session;
pub mod store;
pub mod tone;
pub mod turn;
pub mod voice;

pub use color::{color_fraction, interpolate};
pub use error::ChatError;
pub use orchestrator::{OrchestratorConfig, Services, TurnHandle, TurnOrchestrator, TurnOutcome};
pub use render::{BubbleStyle, Palette, RenderedMessage};
pub use session::DialogueSession;
pub use store::MessageStore;
pub use tone::{AngerSeries, ToneScorer};
pub use turn::{BranchStatus, ToneState, TurnLedger, TurnPhase, TurnRecord};
pub use voice::SpeechBridge;

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Everything guarded this way is append-only or replaced wholesale, so a
/// poisoned guard still holds consistent data.
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::warn!(lock = what, "Recovering poisoned lock");
        poisoned.into_inner()
    })
}
