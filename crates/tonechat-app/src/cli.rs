//! CLI argument definitions for the tonechat binary.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// tonechat - a voice-enabled chat screen that colors your messages by tone.
#[derive(Parser, Debug)]
#[command(name = "tonechat", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level or filter directive (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Use built-in scripted services instead of the remote ones.
    #[arg(long = "offline")]
    pub offline: bool,

    /// Audio file streamed as microphone input for /listen.
    #[arg(long = "mic-file")]
    pub mic_file: Option<PathBuf>,

    /// Do not synthesize or play replies.
    #[arg(long = "no-speech")]
    pub no_speech: bool,

    /// Write a default configuration file to the config path and exit.
    #[arg(long = "init-config")]
    pub init_config: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > TONECHAT_CONFIG env var > ~/.tonechat/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("TONECHAT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the tracing filter.
    ///
    /// Priority: --log-level flag > RUST_LOG env var > config file value > "info".
    pub fn resolve_log_filter(&self, config_level: Option<&str>) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        if let Ok(filter) = std::env::var("RUST_LOG") {
            if !filter.trim().is_empty() {
                return filter;
            }
        }
        match config_level {
            Some(level) if !level.trim().is_empty() => level.to_string(),
            _ => "info".to_string(),
        }
    }

    /// Whether replies are spoken: --no-speech wins over the config value.
    pub fn resolve_speak_replies(&self, config_value: bool) -> bool {
        !self.no_speech && config_value
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".tonechat").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".tonechat").join("config.toml");
    }
    PathBuf::from("config.toml")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::parse_from([
            "tonechat",
            "--offline",
            "--no-speech",
            "--mic-file",
            "hello.wav",
            "-l",
            "debug",
        ]);
        assert!(args.offline);
        assert!(args.no_speech);
        assert_eq!(args.mic_file, Some(PathBuf::from("hello.wav")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(!args.init_config);
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let args = CliArgs::parse_from(["tonechat", "--config", "/tmp/tc.toml"]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/tc.toml"));
    }

    #[test]
    fn test_log_flag_wins_over_config() {
        let args = CliArgs::parse_from(["tonechat", "--log-level", "trace"]);
        assert_eq!(args.resolve_log_filter(Some("warn")), "trace");
    }

    #[test]
    fn test_speak_replies_resolution() {
        let quiet = CliArgs::parse_from(["tonechat", "--no-speech"]);
        assert!(!quiet.resolve_speak_replies(true));

        let default = CliArgs::parse_from(["tonechat"]);
        assert!(default.resolve_speak_replies(true));
        assert!(!default.resolve_speak_replies(false));
    }
}
