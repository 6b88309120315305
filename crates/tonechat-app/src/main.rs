//! tonechat application binary - composition root.
//!
//! 1. Parse the command line and load configuration from TOML
//! 2. Initialize tracing (stderr, so the chat screen stays readable)
//! 3. Build the remote service clients, or scripted ones with `--offline`
//! 4. Build the turn orchestrator and run the terminal chat screen

mod cli;
mod console;
mod microphone;
mod player;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use tonechat_chat::{OrchestratorConfig, Services, TurnOrchestrator};
use tonechat_core::config::ToneChatConfig;
use tonechat_core::error::Result;
use tonechat_services::mock::{ScriptedDialogue, ScriptedRecognizer, ScriptedSynthesizer, ScriptedTone};
use tonechat_services::{
    HttpDialogueService, HttpSpeechRecognizer, HttpSpeechSynthesizer, HttpToneService, Microphone,
};

use cli::CliArgs;
use microphone::{FileMicrophone, NoMicrophone};
use player::SpoolPlayer;

/// Delay between microphone chunks read from `--mic-file`.
const MIC_PACE: Duration = Duration::from_millis(250);

/// What the offline recognizer "hears" on `/listen`.
const OFFLINE_DICTATION: &str = "I have been waiting on hold for an hour";

/// Pause between offline interim transcripts.
const OFFLINE_DICTATION_PACE: Duration = Duration::from_millis(300);

/// Build the scripted services used with `--offline`.
fn offline_services(player: Arc<SpoolPlayer>) -> Services {
    Services {
        dialogue: Arc::new(ScriptedDialogue::new()),
        tone: Arc::new(ScriptedTone::new()),
        synthesizer: Arc::new(ScriptedSynthesizer::new()),
        recognizer: Arc::new(ScriptedRecognizer::dictating(
            OFFLINE_DICTATION,
            OFFLINE_DICTATION_PACE,
        )),
        player,
    }
}

/// Build the HTTP clients for the four remote services.
fn remote_services(
    config: &ToneChatConfig,
    args: &CliArgs,
    player: Arc<SpoolPlayer>,
) -> Result<Services> {
    let branch_timeout = config.turn.branch_timeout();
    let synthesis_timeout = config.turn.synthesis_timeout();

    let microphone: Arc<dyn Microphone> = match args.mic_file {
        Some(ref path) => {
            tracing::info!(path = %path.display(), "Streaming microphone input from file");
            Arc::new(FileMicrophone::new(
                path.clone(),
                config.recognition.chunk_bytes,
                MIC_PACE,
            ))
        }
        None => Arc::new(NoMicrophone),
    };

    Ok(Services {
        dialogue: Arc::new(HttpDialogueService::new(&config.dialogue, branch_timeout)?),
        tone: Arc::new(HttpToneService::new(&config.tone, branch_timeout)?),
        synthesizer: Arc::new(HttpSpeechSynthesizer::new(
            &config.synthesis,
            synthesis_timeout,
        )?),
        recognizer: Arc::new(HttpSpeechRecognizer::new(
            &config.recognition,
            microphone,
            branch_timeout,
        )?),
        player,
    })
}

/// Write the default configuration and report where it went.
fn init_config(path: &Path) -> Result<()> {
    ToneChatConfig::default().save(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config_file = args.resolve_config_path();

    if args.init_config {
        init_config(&config_file)?;
        return Ok(());
    }

    // Config is read before tracing so its log level can apply; a load
    // failure is reported once tracing is up.
    let loaded = ToneChatConfig::load(&config_file);
    let config_level = loaded.as_ref().ok().map(|c| c.general.log_level.clone());

    // Tracing.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(args.resolve_log_filter(config_level.as_deref()))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting tonechat v{}", env!("CARGO_PKG_VERSION"));

    // Config.
    let config = match loaded {
        Ok(config) => {
            tracing::info!(path = %config_file.display(), "Configuration loaded");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %config_file.display(),
                error = %e,
                "Failed to load config, using defaults"
            );
            ToneChatConfig::default()
        }
    };

    let mut orchestrator_config = OrchestratorConfig::from(&config);
    orchestrator_config.speak_replies = args.resolve_speak_replies(config.turn.speak_replies);

    // Playback.
    let spool_dir = player::resolve_dir(&config.playback.spool_dir);
    tracing::info!(path = %spool_dir.display(), "Reply audio spool");
    let player = Arc::new(SpoolPlayer::new(spool_dir));

    // Services.
    let services = if args.offline {
        tracing::info!("Offline mode: using scripted services");
        offline_services(player)
    } else {
        if config.dialogue.workspace_id.trim().is_empty() {
            tracing::warn!(
                "dialogue.workspace_id is empty; set it in the config or start with --offline"
            );
        }
        match remote_services(&config, &args, player) {
            Ok(services) => services,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build service clients");
                return Err(e.into());
            }
        }
    };

    let orchestrator = TurnOrchestrator::new(services, orchestrator_config);
    console::run(orchestrator).await?;

    tracing::info!("tonechat stopped");
    Ok(())
}
