use thiserror::Error;

use crate::types::{FailureKind, ServiceKind};

/// Top-level error type for the tonechat system.
///
/// Remote-call failures are split into transport failures (the request
/// never produced a usable answer) and service failures (the service
/// answered with an error payload). Subsystem crates map these into their
/// own error types so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToneChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error ({service}): {message}")]
    Transport {
        service: ServiceKind,
        message: String,
    },

    #[error("Service error ({service}{}): {message}", .status.map(|s| format!(", status {}", s)).unwrap_or_default())]
    Service {
        service: ServiceKind,
        status: Option<u16>,
        message: String,
    },

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Recognition error: {0}")]
    Recognition(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ToneChatError {
    /// Shorthand for a transport failure.
    pub fn transport(service: ServiceKind, message: impl Into<String>) -> Self {
        ToneChatError::Transport {
            service,
            message: message.into(),
        }
    }

    /// Shorthand for a service failure.
    pub fn service(service: ServiceKind, status: Option<u16>, message: impl Into<String>) -> Self {
        ToneChatError::Service {
            service,
            status,
            message: message.into(),
        }
    }

    /// Where this error falls in the user-facing failure taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            ToneChatError::Transport { .. } | ToneChatError::Io(_) => FailureKind::Transport,
            ToneChatError::Playback(_) => FailureKind::Playback,
            ToneChatError::Config(_)
            | ToneChatError::Service { .. }
            | ToneChatError::Recognition(_)
            | ToneChatError::Serialization(_) => FailureKind::Service,
        }
    }
}

impl From<toml::de::Error> for ToneChatError {
    fn from(err: toml::de::Error) -> Self {
        ToneChatError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ToneChatError {
    fn from(err: toml::ser::Error) -> Self {
        ToneChatError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ToneChatError {
    fn from(err: serde_json::Error) -> Self {
        ToneChatError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for tonechat operations.
pub type Result<T> = std::result::Result<T, ToneChatError>;
