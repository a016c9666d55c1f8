//! Generative model backends.
//!
//! A [`ModelBackend`] is stateless: structured calls send one prompt with a
//! response contract, and conversational calls send the whole history each
//! time. Conversation state lives in [`crate::ConversationSession`], which
//! the caller owns.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::contract::ResponseContract;
use crate::error::CoreError;
use crate::transcript::Sender;

mod claude;
mod gemini;

pub use claude::ClaudeBackend;
pub use gemini::GeminiBackend;

/// Speaker of a turn in the session's internal history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl From<Sender> for Role {
    fn from(sender: Sender) -> Self {
        match sender {
            Sender::User => Self::User,
            Sender::Assistant => Self::Model,
        }
    }
}

/// One turn of conversation history as the backend sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// A generative model provider.
///
/// Implementations report transport, auth and quota failures as
/// [`CoreError::Provider`] and log them before returning.
#[async_trait]
pub trait ModelBackend: Send + Sync + fmt::Debug {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// One-shot structured call. Returns the raw reply text, expected to be
    /// JSON matching `contract`.
    async fn generate(&self, prompt: &str, contract: &ResponseContract)
    -> Result<String, CoreError>;

    /// Conversational call. `history` ends with the user turn to answer.
    async fn converse(
        &self,
        system_instruction: &str,
        history: &[Turn],
    ) -> Result<String, CoreError>;
}
