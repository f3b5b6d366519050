use crate::session::SessionError;
use std::io;
use thiserror::Error;
use whapp_media::DecryptError;

/// Failures of the bridge, grouped by the kinds reported to the controller.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Media fetch failed.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed base64, hex or json.
    #[error("format error: {0}")]
    Format(String),

    /// Media did not decrypt.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Unknown command or wrong arguments.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Session driver failure.
    #[error("driver error: {0}")]
    Driver(SessionError),

    /// Controller connection failure, always fatal.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("bridge task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl BridgeError {
    /// Stable name used in the `kind` field of `error` events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) | Self::Transport(_) => "network",
            Self::Format(_) => "format",
            Self::Crypto(_) => "crypto",
            Self::Protocol(_) => "protocol",
            Self::Driver(_) | Self::Task(_) => "driver",
        }
    }

    /// Fatal errors end the bridge instead of being reported as events.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Task(_))
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub(crate) fn closed() -> Self {
        Self::Transport(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "controller connection closed",
        ))
    }
}

impl From<SessionError> for BridgeError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::Fetch(x) => Self::Network(x),
            x => Self::Driver(x),
        }
    }
}

impl From<DecryptError> for BridgeError {
    fn from(value: DecryptError) -> Self {
        if value.is_format_error() {
            Self::Format(value.to_string())
        } else {
            Self::Crypto(value.to_string())
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Format(value.to_string())
    }
}
