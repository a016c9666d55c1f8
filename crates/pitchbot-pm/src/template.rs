//! Template metadata and the names of the built-in templates.

use serde::{Deserialize, Serialize};

/// Names of the built-in templates, usable with [`PromptManager::render`].
///
/// [`PromptManager::render`]: crate::PromptManager::render
pub mod names {
    /// Structured pitch request. Context: `idea`, `location`.
    pub const PITCH_TASK: &str = "pitch/task";
    /// Structured rating request. Context: `idea`, `tagline`, `elevator_pitch`,
    /// `value_proposition`, `competitors`, `revenue_models`.
    pub const RATING_TASK: &str = "rating/task";
    /// Chat system instruction. Context: `assistant_name`.
    pub const CHAT_SYSTEM: &str = "chat/system";
    /// Conversation history flattened into one prompt. Context: `turns`.
    pub const CHAT_TRANSCRIPT: &str = "chat/transcript";
    /// Prompt with an embedded JSON response schema. Context: `prompt`, `schema`.
    pub const STRUCTURED_JSON: &str = "structured/json";
}

/// A named prompt template and its raw Jinja2 source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Template name used for lookup (e.g., `pitch/task`).
    pub name: String,

    /// Raw Jinja2 template source.
    pub source: String,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}
