//! User-visible chat messages and transcripts.
//!
//! A [`Transcript`] is what the front end shows: it starts with a locally
//! generated greeting and may contain fallback replies that never reached the
//! model. The session keeps its own history; see [`crate::ConversationSession`].

use serde::{Deserialize, Serialize};

/// Author of a visible chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    #[serde(alias = "bot")]
    Assistant,
}

/// One visible chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    pub sender: Sender,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::User,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::Assistant,
        }
    }
}

/// Ordered messages of one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transcript holding only the local greeting.
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::assistant(greeting)],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether anything beyond the greeting was said.
    pub fn has_conversation(&self) -> bool {
        self.messages.len() > 1
    }

    /// Messages after the greeting, i.e. the part worth replaying.
    pub fn replayable(&self) -> &[Message] {
        self.messages.get(1..).unwrap_or_default()
    }

    /// First user message, used as a label when listing archived transcripts.
    pub fn title(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.sender == Sender::User)
            .map(|m| m.text.as_str())
    }
}

impl FromIterator<Message> for Transcript {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        Self {
            messages: iter.into_iter().collect(),
        }
    }
}
