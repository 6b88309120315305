//! Terminal chat screen.
//!
//! Reads lines from stdin and prints bubbles in true color. Plain lines are
//! sent as turns; slash commands drive speech and the tone panel:
//!
//! - `/listen` start dictating, `/stop` stop and keep the draft
//! - `/draft <text>` replace the draft, `/send` send it
//! - `/tones` anger series and per-turn tone summary
//! - `/history` redraw the conversation, `/quit` leave

use colored::{ColoredString, Colorize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

use tonechat_chat::{AngerSeries, RenderedMessage, TurnOrchestrator};
use tonechat_core::events::ChatEvent;
use tonechat_core::types::{Message, ToneCategory, ToneScoreRecord};

/// Width of the anger bar in `/tones`.
const BAR_WIDTH: usize = 20;

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    Listen,
    Stop,
    Draft(String),
    Send,
    Tones,
    History,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        if !line.starts_with('/') {
            return Command::Say(line.to_string());
        }
        if let Some(text) = line.strip_prefix("/draft ") {
            return Command::Draft(text.trim().to_string());
        }
        match line {
            "/listen" => Command::Listen,
            "/stop" => Command::Stop,
            "/send" => Command::Send,
            "/tones" => Command::Tones,
            "/history" => Command::History,
            "/help" => Command::Help,
            "/quit" | "/exit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// Run the screen until `/quit` or end of input.
pub async fn run(orch: TurnOrchestrator) -> std::io::Result<()> {
    println!("{}", "=== tonechat ===".bright_magenta().bold());
    println!("{}", "Type a message, or /help for commands.".dimmed());

    let printer = spawn_printer(&orch, |line| println!("{}", line));

    if let Err(e) = orch.open_conversation().await {
        tracing::debug!(error = %e, "No greeting");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut transcripts: Option<JoinHandle<()>> = None;

    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Empty => {}
            Command::Say(text) => {
                if let Err(e) = orch.handle_turn(&text) {
                    println!("{}", format!("  ! {}", e).yellow());
                }
            }
            Command::Listen => {
                let was_speaking = orch.speech().is_speaking();
                match orch.start_listening().await {
                    Ok(mut stream) => {
                        if was_speaking {
                            println!("{}", "  (reply audio stopped)".dimmed());
                        }
                        transcripts = Some(tokio::spawn(async move {
                            while let Some(partial) = stream.next().await {
                                let marker = if partial.is_final { "=" } else { "~" };
                                println!("{}", format!("  {} {}", marker, partial.text).dimmed());
                            }
                        }));
                    }
                    Err(e) => println!("{}", format!("  ! {}", e).yellow()),
                }
            }
            Command::Stop => {
                if let Err(e) = orch.stop_listening().await {
                    println!("{}", format!("  ! {}", e).yellow());
                }
                if let Some(task) = transcripts.take() {
                    let _ = task.await;
                }
            }
            Command::Draft(text) => {
                orch.speech().set_draft(text);
            }
            Command::Send => {
                if orch.speech().is_listening().await {
                    let _ = orch.stop_listening().await;
                }
                if let Err(e) = orch.send_draft() {
                    println!("{}", format!("  ! {}", e).yellow());
                }
            }
            Command::Tones => {
                let lines = tone_summary(
                    &orch.messages(),
                    &orch.tone_records(),
                    &orch.anger_series(),
                );
                for line in lines {
                    println!("{}", line);
                }
            }
            Command::History => {
                for rendered in orch.render() {
                    println!("{}", bubble(&rendered));
                }
            }
            Command::Help => print_help(),
            Command::Quit => break,
            Command::Unknown(command) => {
                println!("{}", format!("  ! unknown command {}", command).yellow());
            }
        }
    }

    if orch.speech().is_listening().await {
        let _ = orch.stop_listening().await;
    }
    orch.speech().stop_speaking();
    printer.abort();
    tracing::info!(
        messages = orch.messages().len(),
        in_flight = orch.turns_in_flight(),
        "Chat closed"
    );
    Ok(())
}

fn print_help() {
    for (command, help) in [
        ("/listen", "start dictating from the microphone"),
        ("/stop", "stop dictating and keep the draft"),
        ("/draft", "replace the draft with the given text"),
        ("/send", "send the dictated draft"),
        ("/tones", "show the anger series and tone summary"),
        ("/history", "redraw the conversation"),
        ("/quit", "leave"),
    ] {
        println!("  {:<9} {}", command.bold(), help);
    }
}

/// Subscribe to chat events and hand each printable line to `out` from a
/// background task. The subscription is taken before this returns, so
/// events emitted right after (the greeting) are not missed.
fn spawn_printer<F>(orch: &TurnOrchestrator, out: F) -> JoinHandle<()>
where
    F: FnMut(String) + Send + 'static,
{
    let events = orch.subscribe();
    tokio::spawn(print_events(orch.clone(), events, out))
}

async fn print_events<F>(
    orch: TurnOrchestrator,
    mut events: broadcast::Receiver<ChatEvent>,
    mut out: F,
) where
    F: FnMut(String),
{
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(line) = show(&orch, &event) {
                    out(line);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Screen fell behind chat events");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn show(orch: &TurnOrchestrator, event: &ChatEvent) -> Option<String> {
    if let Some(notice) = event.notice() {
        return Some(format!("  ! {}", notice).yellow().to_string());
    }
    match event {
        ChatEvent::TurnStarted { message_id, .. } | ChatEvent::ReplyAppended { message_id, .. } => {
            orch.render().iter().find(|r| r.message.id == *message_id).map(bubble)
        }
        ChatEvent::ToneScored { turn_id, .. } => orch
            .render()
            .iter()
            .find(|r| r.message.is_user() && r.message.turn_id == Some(*turn_id))
            .filter(|r| r.style.fraction.is_some())
            .map(bubble),
        ChatEvent::ListeningStarted { .. } => {
            Some("  (listening, /stop when done)".dimmed().to_string())
        }
        ChatEvent::ListeningStopped { draft, .. } if !draft.is_empty() => {
            Some(format!("  draft: {}  (/send to send)", draft).dimmed().to_string())
        }
        _ => None,
    }
}

/// One bubble line: sender label, colored body and anger fraction if any.
pub fn bubble(rendered: &RenderedMessage) -> String {
    let (r, g, b) = rendered.style.text.to_rgb8();
    let (br, bg, bb) = rendered.style.bubble.to_rgb8();
    let body: ColoredString = format!(" {} ", rendered.message.text)
        .truecolor(r, g, b)
        .on_truecolor(br, bg, bb);
    let label = format!("{:>5}:", rendered.message.sender.display_name());
    match rendered.style.fraction {
        Some(fraction) => format!("{} {} {}", label, body, format!("[{:.2}]", fraction).dimmed()),
        None => format!("{} {}", label, body),
    }
}

/// Lines of the tone panel.
pub fn tone_summary(
    messages: &[Message],
    records: &[ToneScoreRecord],
    series: &AngerSeries,
) -> Vec<String> {
    let mean = match series.mean() {
        Some(mean) => mean,
        None => return vec!["  no tone scores yet".to_string()],
    };

    let mut lines = vec![format!(
        "  {} scored turns, mean anger {:.2}",
        series.len(),
        mean
    )];
    for record in records {
        let text = messages
            .iter()
            .find(|m| m.is_user() && m.turn_id == Some(record.turn_id))
            .map(|m| m.text.as_str())
            .unwrap_or("?");
        let anger = record.anger().clamp(0.0, 1.0);
        let filled = (anger * BAR_WIDTH as f64).round() as usize;
        let dominant: Vec<String> = ToneCategory::ALL
            .iter()
            .filter_map(|c| record.dominant(*c))
            .map(|t| t.label.clone())
            .collect();
        lines.push(format!(
            "  [{}{}] {:.2}  {}  ({})",
            "#".repeat(filled),
            "-".repeat(BAR_WIDTH - filled),
            anger,
            text,
            dominant.join(", ")
        ));
    }
    lines
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tonechat_chat::{BubbleStyle, OrchestratorConfig, Palette, Services};
    use tonechat_core::types::{Rgba, ToneScore, TurnId};
    use tonechat_services::mock::{
        MemoryPlayer, ScriptedDialogue, ScriptedRecognizer, ScriptedSynthesizer, ScriptedTone,
    };

    fn offline_orchestrator() -> TurnOrchestrator {
        let services = Services {
            dialogue: Arc::new(ScriptedDialogue::new()),
            tone: Arc::new(ScriptedTone::new()),
            synthesizer: Arc::new(ScriptedSynthesizer::new()),
            recognizer: Arc::new(ScriptedRecognizer::new(vec![], Duration::from_millis(1))),
            player: Arc::new(MemoryPlayer::new()),
        };
        TurnOrchestrator::new(services, OrchestratorConfig::default())
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("  "), Command::Empty);
        assert_eq!(Command::parse("hello"), Command::Say("hello".into()));
        assert_eq!(Command::parse("/listen"), Command::Listen);
        assert_eq!(Command::parse("/exit"), Command::Quit);
        assert_eq!(Command::parse("/tones "), Command::Tones);
        assert_eq!(Command::parse("/dance"), Command::Unknown("/dance".into()));
        assert_eq!(
            Command::parse("/draft  I am calm now "),
            Command::Draft("I am calm now".into())
        );
        assert_eq!(Command::parse("/draft"), Command::Unknown("/draft".into()));
    }

    #[test]
    fn test_bubble_shows_fraction() {
        colored::control::set_override(false);
        let palette = Palette::default();
        let rendered = RenderedMessage {
            message: Message::user(TurnId::new(), "I am furious"),
            style: BubbleStyle {
                text: Rgba::RED,
                bubble: palette.user_bubble,
                fraction: Some(0.9),
            },
        };
        assert_eq!(bubble(&rendered), "   Me:  I am furious  [0.90]");

        let agent = RenderedMessage {
            message: Message::agent(None, "Hello"),
            style: BubbleStyle {
                text: palette.agent_text,
                bubble: palette.agent_bubble,
                fraction: None,
            },
        };
        assert_eq!(bubble(&agent), "Watson:  Hello ");
    }

    #[test]
    fn test_tone_summary() {
        let turn = TurnId::new();
        let messages = vec![Message::user(turn, "I am furious")];
        let record = ToneScoreRecord {
            turn_id: turn,
            emotion: vec![
                ToneScore::new("anger", "Anger", 0.5),
                ToneScore::new("joy", "Joy", 0.1),
            ],
            language: vec![ToneScore::new("confident", "Confident", 0.7)],
            social: vec![],
        };
        let mut series = AngerSeries::new();
        series.record(0, turn, 0.5);

        let lines = tone_summary(&messages, &[record], &series);
        assert_eq!(lines[0], "  1 scored turns, mean anger 0.50");
        assert_eq!(
            lines[1],
            "  [##########----------] 0.50  I am furious  (Anger, Confident)"
        );
    }

    #[test]
    fn test_tone_summary_empty() {
        let lines = tone_summary(&[], &[], &AngerSeries::new());
        assert_eq!(lines, vec!["  no tone scores yet"]);
    }

    #[tokio::test]
    async fn test_printer_shows_greeting_sent_right_after_start() {
        colored::control::set_override(false);
        let orch = offline_orchestrator();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let printer = spawn_printer(&orch, move |line| {
            let _ = tx.send(line);
        });
        orch.open_conversation().await.unwrap();

        let line = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("greeting printed")
            .unwrap();
        assert_eq!(line, "Watson:  Hello, I'm Watson. How can I help? ");
        printer.abort();
    }
}
