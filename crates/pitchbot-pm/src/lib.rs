//! Prompt templates for PitchBot.
//!
//! Built-in Jinja2 templates cover pitch generation, rating, the chat system
//! instruction, and the wrappers the prompt-only backends need. Override
//! directories can replace any of them by name.

mod error;
mod manager;
mod template;

pub use error::PmError;
pub use manager::PromptManager;
pub use template::{PromptTemplate, names};
