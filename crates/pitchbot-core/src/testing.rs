//! In-memory backend for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{ModelBackend, Turn};
use crate::contract::{ResponseContract, ResponseKind};
use crate::error::CoreError;
use crate::types::{LongTextSection, NamedEntry, PitchResult};

/// A request the scripted backend received.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Generate {
        prompt: String,
        kind: ResponseKind,
    },
    Converse {
        system_instruction: String,
        history: Vec<Turn>,
    },
}

/// Replays queued replies in order and records every call.
#[derive(Debug, Default)]
pub(crate) struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, CoreError>>>,
    calls: Mutex<Vec<Call>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub(crate) fn with_replies(
        replies: impl IntoIterator<Item = Result<String, CoreError>>,
    ) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Default::default()
        }
    }

    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    async fn next_reply(&self, call: Call) -> Result<String, CoreError> {
        self.calls.lock().expect("calls lock").push(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| Err(CoreError::Provider("no scripted reply left".to_owned())))
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        prompt: &str,
        contract: &ResponseContract,
    ) -> Result<String, CoreError> {
        self.next_reply(Call::Generate {
            prompt: prompt.to_owned(),
            kind: contract.kind,
        })
        .await
    }

    async fn converse(
        &self,
        system_instruction: &str,
        history: &[Turn],
    ) -> Result<String, CoreError> {
        self.next_reply(Call::Converse {
            system_instruction: system_instruction.to_owned(),
            history: history.to_vec(),
        })
        .await
    }
}

fn entry(name: &str, description: &str) -> NamedEntry {
    NamedEntry {
        name: name.to_owned(),
        description: description.to_owned(),
    }
}

/// A fully populated pitch for a drone coffee delivery idea.
pub(crate) fn sample_pitch() -> PitchResult {
    PitchResult {
        tagline: "Coffee, delivered by drone.".to_owned(),
        elevator_pitch: LongTextSection {
            summary_points: vec!["Fast".to_owned(), "Hot".to_owned()],
            full_text: "We fly fresh coffee to your desk.".to_owned(),
        },
        value_proposition: LongTextSection {
            summary_points: vec!["No queues".to_owned()],
            full_text: "Skip the line entirely.".to_owned(),
        },
        slide_bullets: vec!["Problem".to_owned(), "Solution".to_owned()],
        competitors: vec![
            entry("Starbucks", "Global chain"),
            entry("DoorDash", "Food delivery"),
        ],
        revenue_models: vec![
            entry("Subscription", "Monthly plan"),
            entry("Per delivery", "Flat fee"),
        ],
    }
}
