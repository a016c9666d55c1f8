use std::time::Duration;

use thiserror::Error;

use crate::contract::ResponseKind;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("malformed {kind} response: {reason}")]
    MalformedResponse { kind: ResponseKind, reason: String },

    #[error("provider error: {0}")]
    Provider(String),

    #[error("chat exchange failed: {reason}")]
    Exchange {
        reason: String,
        #[source]
        source: Option<Box<CoreError>>,
    },

    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("model call cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),

    #[error("prompt error: {0}")]
    Prompt(#[from] pitchbot_pm::PmError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl CoreError {
    pub(crate) fn malformed(kind: ResponseKind, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            kind,
            reason: reason.into(),
        }
    }

    /// Prefix the message with what was being attempted, keeping the variant.
    pub(crate) fn context(self, what: &str) -> Self {
        match self {
            Self::Provider(msg) => Self::Provider(format!("{what}: {msg}")),
            Self::MalformedResponse { kind, reason } => Self::MalformedResponse {
                kind,
                reason: format!("{what}: {reason}"),
            },
            other => other,
        }
    }

    /// Whether the call was cancelled by the caller, directly or inside a
    /// failed exchange.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Exchange {
                source: Some(source),
                ..
            } => source.is_cancelled(),
            _ => false,
        }
    }
}
