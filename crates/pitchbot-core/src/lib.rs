//! Structured pitch generation, idea rating and conversational sessions on
//! top of a generative model backend.

pub mod backend;
mod config;
mod contract;
mod engine;
mod error;
mod guard;
mod request;
mod session;
#[cfg(test)]
mod testing;
mod transcript;
mod types;
mod validate;

pub use config::{
    ChatConfig, EngineConfig, ModelConfig, ProjectConfig, PromptsConfig, Provider, ResolvedModel,
    STATE_DIR,
};
pub use contract::{ResponseContract, ResponseKind, StructuredResponse};
pub use engine::Engine;
pub use error::CoreError;
pub use request::{RequestBuilder, StructuredRequest};
pub use session::{ConversationSession, SessionManager};
pub use tokio_util::sync::CancellationToken;
pub use transcript::{Message, Sender, Transcript};
pub use types::{LongTextSection, MAX_SUCCESS_SCORE, NamedEntry, PitchResult, RatingResult};
pub use validate::parse_and_validate;
