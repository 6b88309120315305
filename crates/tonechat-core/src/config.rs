use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, ToneChatError};
use crate::types::{Rgba, ServiceKind};

/// Top-level configuration for the chat screen.
///
/// Loaded from `~/.tonechat/config.toml` by default. Each remote service has
/// its own section; `turn` and `display` tune the orchestration core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToneChatConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub dialogue: DialogueConfig,
    #[serde(default)]
    pub tone: ToneConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub turn: TurnConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

impl ToneChatConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ToneChatConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the orchestrator cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.turn.branch_timeout_secs == 0 {
            return Err(ToneChatError::Config(
                "turn.branch_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.turn.synthesis_timeout_secs == 0 {
            return Err(ToneChatError::Config(
                "turn.synthesis_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.turn.max_message_length == 0 {
            return Err(ToneChatError::Config(
                "turn.max_message_length must be greater than 0".to_string(),
            ));
        }
        if self.recognition.chunk_bytes == 0 {
            return Err(ToneChatError::Config(
                "recognition.chunk_bytes must be greater than 0".to_string(),
            ));
        }
        for (name, color) in self.display.named_colors() {
            let channels = [color.r, color.g, color.b, color.a];
            if channels.iter().any(|c| !(0.0..=1.0).contains(c)) {
                return Err(ToneChatError::Config(format!(
                    "display.{} channels must be within [0, 1]",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Credentials for one remote service.
///
/// Either an API key or a username/password pair. The environment variable
/// `TONECHAT_<SERVICE>_APIKEY` overrides whatever the file holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub api_key: String,
}

/// How a request authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    Basic { username: String, password: String },
    ApiKey(String),
}

impl Credentials {
    /// Resolve credentials for `service`, applying the environment override.
    pub fn resolve(&self, service: ServiceKind) -> Option<Auth> {
        let var = format!("TONECHAT_{}_APIKEY", service.to_string().to_uppercase());
        if let Ok(key) = std::env::var(&var) {
            if !key.is_empty() {
                return Some(Auth::ApiKey(key));
            }
        }
        self.from_file()
    }

    /// Credentials as written in the config file, ignoring the environment.
    pub fn from_file(&self) -> Option<Auth> {
        if !self.api_key.is_empty() {
            return Some(Auth::ApiKey(self.api_key.clone()));
        }
        if !self.username.is_empty() {
            return Some(Auth::Basic {
                username: self.username.clone(),
                password: self.password.clone(),
            });
        }
        None
    }
}

// =============================================================================
// Services
// =============================================================================

/// Dialogue (conversation) service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    /// Base URL of the conversation API.
    pub url: String,
    /// Workspace holding the dialogue tree.
    pub workspace_id: String,
    /// API version date.
    pub version: String,
    pub credentials: Credentials,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            url: "https://gateway.watsonplatform.net/conversation/api".to_string(),
            workspace_id: String::new(),
            version: "2017-05-26".to_string(),
            credentials: Credentials::default(),
        }
    }
}

/// Tone analysis service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    pub url: String,
    pub version: String,
    /// Request sentence-level analysis in addition to the document tone.
    pub sentences: bool,
    pub credentials: Credentials,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            url: "https://gateway.watsonplatform.net/tone-analyzer/api".to_string(),
            version: "2017-05-26".to_string(),
            sentences: false,
            credentials: Credentials::default(),
        }
    }
}

/// Speech synthesis service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub url: String,
    pub voice: String,
    /// Requested audio format.
    pub accept: String,
    pub credentials: Credentials,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            url: "https://stream.watsonplatform.net/text-to-speech/api".to_string(),
            voice: "en-US_MichaelVoice".to_string(),
            accept: "audio/wav".to_string(),
            credentials: Credentials::default(),
        }
    }
}

/// Speech recognition service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub url: String,
    pub model: String,
    /// Format of the audio captured from the microphone.
    pub content_type: String,
    /// Emit interim transcripts while audio is still arriving.
    pub interim_results: bool,
    /// Bytes of captured audio sent per recognition request.
    pub chunk_bytes: usize,
    pub credentials: Credentials,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            url: "https://stream.watsonplatform.net/speech-to-text/api".to_string(),
            model: "en-US_BroadbandModel".to_string(),
            content_type: "audio/ogg;codecs=opus".to_string(),
            interim_results: true,
            chunk_bytes: 32 * 1024,
            credentials: Credentials::default(),
        }
    }
}

// =============================================================================
// Orchestration
// =============================================================================

/// Turn orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Upper bound on a dialogue or tone call before it counts as a
    /// transport failure.
    pub branch_timeout_secs: u64,
    /// Upper bound on a speech synthesis call.
    pub synthesis_timeout_secs: u64,
    /// Maximum user message length in characters.
    pub max_message_length: usize,
    /// Speak agent replies aloud.
    pub speak_replies: bool,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            branch_timeout_secs: 15,
            synthesis_timeout_secs: 15,
            max_message_length: 2000,
            speak_replies: true,
        }
    }
}

impl TurnConfig {
    pub fn branch_timeout(&self) -> Duration {
        Duration::from_secs(self.branch_timeout_secs)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_secs)
    }
}

/// Which user messages keep their tone color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightMode {
    /// Only the most recent user message, once its own tone has arrived.
    #[default]
    Latest,
    /// Every user message whose tone has arrived.
    EveryScored,
}

/// Bubble and text colors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub highlight: HighlightMode,
    /// User text color at anger 0.
    pub neutral_text: Rgba,
    /// User text color at anger 1.
    pub alert_text: Rgba,
    pub agent_text: Rgba,
    pub user_bubble: Rgba,
    pub agent_bubble: Rgba,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            highlight: HighlightMode::Latest,
            neutral_text: Rgba::WHITE,
            alert_text: Rgba::RED,
            agent_text: Rgba::WHITE,
            user_bubble: Rgba::LIGHT_GRAY,
            agent_bubble: Rgba::SLATE,
        }
    }
}

impl DisplayConfig {
    fn named_colors(&self) -> [(&'static str, Rgba); 5] {
        [
            ("neutral_text", self.neutral_text),
            ("alert_text", self.alert_text),
            ("agent_text", self.agent_text),
            ("user_bubble", self.user_bubble),
            ("agent_bubble", self.agent_bubble),
        ]
    }
}

/// Local playback sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Directory the latest synthesized reply is written to.
    pub spool_dir: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            spool_dir: "~/.tonechat/audio".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = ToneChatConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.dialogue.version, "2017-05-26");
        assert_eq!(config.turn.branch_timeout_secs, 15);
        assert_eq!(config.turn.max_message_length, 2000);
        assert!(config.recognition.interim_results);
        assert_eq!(config.recognition.content_type, "audio/ogg;codecs=opus");
        assert_eq!(config.display.neutral_text, Rgba::WHITE);
        assert_eq!(config.display.alert_text, Rgba::RED);
        assert_eq!(config.display.highlight, HighlightMode::Latest);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"

[dialogue]
workspace_id = "ws-123"

[dialogue.credentials]
username = "user"
password = "secret"

[turn]
branch_timeout_secs = 5
speak_replies = false

[display]
highlight = "every_scored"
alert_text = { r = 1.0, g = 0.5, b = 0.0 }
"#;
        let file = create_temp_config(content);
        let config = ToneChatConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.dialogue.workspace_id, "ws-123");
        assert_eq!(
            config.dialogue.credentials.from_file(),
            Some(Auth::Basic {
                username: "user".into(),
                password: "secret".into()
            })
        );
        assert_eq!(config.turn.branch_timeout(), Duration::from_secs(5));
        assert!(!config.turn.speak_replies);
        assert_eq!(config.display.highlight, HighlightMode::EveryScored);
        assert_eq!(config.display.alert_text, Rgba::rgb(1.0, 0.5, 0.0));
        // Untouched sections keep their defaults.
        assert_eq!(config.tone.version, "2017-05-26");
    }

    #[test]
    fn test_load_missing_file_returns_error() {
        let result = ToneChatConfig::load(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ToneChatError::Io(_))));
    }

    #[test]
    fn test_load_invalid_toml_is_config_error() {
        let file = create_temp_config("[turn\nbranch_timeout_secs = ");
        let result = ToneChatConfig::load(file.path());
        assert!(matches!(result, Err(ToneChatError::Config(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let file = create_temp_config("[turn]\nbranch_timeout_secs = 0\n");
        let err = ToneChatConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("branch_timeout_secs"));
    }

    #[test]
    fn test_out_of_range_color_rejected() {
        let mut config = ToneChatConfig::default();
        config.display.alert_text = Rgba::rgb(2.0, 0.0, 0.0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("alert_text"));
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = ToneChatConfig::default();
        config.dialogue.workspace_id = "abc".into();
        config.display.highlight = HighlightMode::EveryScored;
        config.save(&path).unwrap();

        let loaded = ToneChatConfig::load(&path).unwrap();
        assert_eq!(loaded.dialogue.workspace_id, "abc");
        assert_eq!(loaded.display.highlight, HighlightMode::EveryScored);
    }

    #[test]
    fn test_credentials_precedence() {
        let creds = Credentials {
            username: "u".into(),
            password: "p".into(),
            api_key: "k".into(),
        };
        assert_eq!(creds.from_file(), Some(Auth::ApiKey("k".into())));
        assert_eq!(Credentials::default().from_file(), None);
    }

    #[test]
    fn test_credentials_env_override() {
        std::env::set_var("TONECHAT_RECOGNITION_APIKEY", "from-env");
        let creds = Credentials {
            username: "u".into(),
            password: "p".into(),
            api_key: String::new(),
        };
        assert_eq!(
            creds.resolve(ServiceKind::Recognition),
            Some(Auth::ApiKey("from-env".into()))
        );
        std::env::remove_var("TONECHAT_RECOGNITION_APIKEY");
    }
}
