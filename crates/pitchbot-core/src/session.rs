//! Conversational sessions.
//!
//! A [`SessionManager`] owns at most one live [`ConversationSession`]. The
//! session owns its turn history; callers read it but only change it through
//! [`ConversationSession::exchange`]. Replacing the session (reset or rebuild)
//! takes `&mut self`, so no caller can observe a half-replaced session, and
//! two exchanges can never run against the same session at once.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::backend::{ModelBackend, Turn};
use crate::error::CoreError;
use crate::guard::guarded;
use crate::transcript::Transcript;

/// A stateful multi-turn conversation with the model.
#[derive(Debug)]
pub struct ConversationSession {
    generation: u64,
    system_instruction: Arc<str>,
    history: Vec<Turn>,
    seed_len: usize,
    backend: Arc<dyn ModelBackend>,
    deadline: Duration,
}

impl ConversationSession {
    fn new(
        generation: u64,
        system_instruction: Arc<str>,
        seed: Vec<Turn>,
        backend: Arc<dyn ModelBackend>,
        deadline: Duration,
    ) -> Self {
        Self {
            generation,
            system_instruction,
            seed_len: seed.len(),
            history: seed,
            backend,
            deadline,
        }
    }

    /// Position of this session in its manager's creation order, starting at 1.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// Every turn so far, seed included.
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// The turns the session was created with.
    pub fn seed_history(&self) -> &[Turn] {
        &self.history[..self.seed_len]
    }

    /// Send one user message and return the model's reply.
    ///
    /// The user turn is recorded before the call and stays recorded if the
    /// call fails, so a retry continues from what was actually sent. A model
    /// turn is recorded only for a non-empty reply.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` for blank text (history untouched).
    /// Returns `CoreError::Exchange` if the backend fails, times out, is
    /// cancelled, or replies with blank text.
    #[instrument(skip_all, fields(generation = self.generation, turns = self.history.len()))]
    pub async fn exchange(
        &mut self,
        user_text: &str,
        cancel: &CancellationToken,
    ) -> Result<String, CoreError> {
        if user_text.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "chat message must not be empty".to_owned(),
            ));
        }

        self.history.push(Turn::user(user_text));

        let outcome = guarded(
            self.deadline,
            cancel,
            self.backend.converse(&self.system_instruction, &self.history),
        )
        .await;

        match outcome {
            Ok(reply) if !reply.trim().is_empty() => {
                self.history.push(Turn::model(reply.as_str()));
                debug!(reply_len = reply.len(), "exchange completed");
                Ok(reply)
            }
            Ok(_) => {
                warn!(backend = self.backend.name(), "model returned an empty reply");
                Err(CoreError::Exchange {
                    reason: "model returned an empty reply".to_owned(),
                    source: None,
                })
            }
            Err(e) => {
                error!(backend = self.backend.name(), error = %e, "chat exchange failed");
                Err(CoreError::Exchange {
                    reason: e.to_string(),
                    source: Some(Box::new(e)),
                })
            }
        }
    }
}

/// Owns the single live conversation and its lifecycle.
#[derive(Debug)]
pub struct SessionManager {
    backend: Arc<dyn ModelBackend>,
    system_instruction: Arc<str>,
    deadline: Duration,
    current: Option<ConversationSession>,
    created: u64,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        system_instruction: impl Into<String>,
        deadline: Duration,
    ) -> Self {
        Self {
            backend,
            system_instruction: Arc::from(system_instruction.into()),
            deadline,
            current: None,
            created: 0,
        }
    }

    /// The live session, created with empty history if there is none.
    pub fn get_or_create_session(&mut self) -> &mut ConversationSession {
        self.current.get_or_insert_with(|| {
            self.created += 1;
            debug!(generation = self.created, "created session");
            ConversationSession::new(
                self.created,
                Arc::clone(&self.system_instruction),
                Vec::new(),
                Arc::clone(&self.backend),
                self.deadline,
            )
        })
    }

    /// The live session, if any, without creating one.
    pub fn current_session(&self) -> Option<&ConversationSession> {
        self.current.as_ref()
    }

    /// Drop the live session. The next access starts from empty history.
    pub fn reset_session(&mut self) {
        if let Some(old) = self.current.take() {
            debug!(generation = old.generation, turns = old.history.len(), "reset session");
        }
    }

    /// Replace the live session with one seeded from a transcript.
    ///
    /// The first message is the locally generated greeting and is skipped;
    /// the rest map `user` to user turns and `assistant` to model turns.
    pub fn rebuild_session_from_transcript(&mut self, transcript: &Transcript) {
        let seed: Vec<Turn> = transcript
            .replayable()
            .iter()
            .map(|message| Turn {
                role: message.sender.into(),
                text: message.text.clone(),
            })
            .collect();

        self.created += 1;
        debug!(
            generation = self.created,
            seed_turns = seed.len(),
            "rebuilt session from transcript"
        );
        self.current = Some(ConversationSession::new(
            self.created,
            Arc::clone(&self.system_instruction),
            seed,
            Arc::clone(&self.backend),
            self.deadline,
        ));
    }

    /// Exchange a message through the live session, creating it if needed.
    ///
    /// # Errors
    ///
    /// See [`ConversationSession::exchange`].
    pub async fn exchange(
        &mut self,
        user_text: &str,
        cancel: &CancellationToken,
    ) -> Result<String, CoreError> {
        self.get_or_create_session().exchange(user_text, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Role;
    use crate::testing::{Call, ScriptedBackend};
    use crate::transcript::Message;

    const SYSTEM: &str = "You are a pitch coach.";

    fn manager(backend: ScriptedBackend) -> (SessionManager, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        let manager = SessionManager::new(
            Arc::clone(&backend) as Arc<dyn ModelBackend>,
            SYSTEM,
            Duration::from_secs(5),
        );
        (manager, backend)
    }

    fn greeting_transcript() -> Transcript {
        Transcript::with_greeting("Hi! How can I help?")
    }

    #[test]
    fn test_should_create_session_lazily_and_reuse_it() {
        let (mut manager, _) = manager(ScriptedBackend::default());
        assert!(manager.current_session().is_none());

        let first = manager.get_or_create_session();
        assert_eq!(first.generation(), 1);
        assert!(first.history().is_empty());
        assert_eq!(first.system_instruction(), SYSTEM);

        assert_eq!(manager.get_or_create_session().generation(), 1);
    }

    #[test]
    fn test_should_drop_greeting_when_rebuilding() {
        let (mut manager, _) = manager(ScriptedBackend::default());
        let mut transcript = greeting_transcript();
        transcript.push(Message::user("A"));
        transcript.push(Message::assistant("B"));

        manager.rebuild_session_from_transcript(&transcript);

        let session = manager.get_or_create_session();
        assert_eq!(session.seed_history(), &[Turn::user("A"), Turn::model("B")]);
        assert_eq!(session.history(), session.seed_history());
    }

    #[test]
    fn test_should_rebuild_empty_seed_from_greeting_only_or_empty_transcript() {
        let (mut manager, _) = manager(ScriptedBackend::default());

        manager.rebuild_session_from_transcript(&greeting_transcript());
        assert!(manager.get_or_create_session().seed_history().is_empty());
        assert_eq!(manager.get_or_create_session().generation(), 1);

        manager.rebuild_session_from_transcript(&Transcript::new());
        assert!(manager.get_or_create_session().seed_history().is_empty());
        assert_eq!(manager.get_or_create_session().generation(), 2);
    }

    #[tokio::test]
    async fn test_should_start_empty_after_reset() {
        let (mut manager, _) =
            manager(ScriptedBackend::with_replies([Ok("Tell me more.".to_owned())]));
        let mut transcript = greeting_transcript();
        transcript.push(Message::user("A"));
        transcript.push(Message::assistant("B"));
        manager.rebuild_session_from_transcript(&transcript);
        manager
            .exchange("C", &CancellationToken::new())
            .await
            .expect("should exchange");

        manager.reset_session();
        assert!(manager.current_session().is_none());

        let session = manager.get_or_create_session();
        assert!(session.seed_history().is_empty());
        assert!(session.history().is_empty());
        assert_eq!(session.generation(), 2);
    }

    #[tokio::test]
    async fn test_should_record_both_turns_on_success() {
        let (mut manager, backend) =
            manager(ScriptedBackend::with_replies([Ok("Charge per cup.".to_owned())]));

        let reply = manager
            .exchange("How should I price it?", &CancellationToken::new())
            .await
            .expect("should exchange");

        assert_eq!(reply, "Charge per cup.");
        assert_eq!(
            manager.get_or_create_session().history(),
            &[
                Turn::user("How should I price it?"),
                Turn::model("Charge per cup.")
            ]
        );
        assert_eq!(
            backend.calls(),
            vec![Call::Converse {
                system_instruction: SYSTEM.to_owned(),
                history: vec![Turn::user("How should I price it?")],
            }]
        );
    }

    #[tokio::test]
    async fn test_should_keep_user_turn_without_model_turn_on_provider_failure() {
        let (mut manager, _) = manager(ScriptedBackend::with_replies([Err(
            CoreError::Provider("quota exceeded".to_owned()),
        )]));

        let err = manager
            .exchange("Hello?", &CancellationToken::new())
            .await
            .expect_err("should fail");

        match err {
            CoreError::Exchange { reason, source } => {
                assert!(reason.contains("quota exceeded"));
                assert!(matches!(source.as_deref(), Some(CoreError::Provider(_))));
            }
            other => panic!("expected exchange error, got {other:?}"),
        }
        assert_eq!(
            manager.get_or_create_session().history(),
            &[Turn::user("Hello?")]
        );
    }

    #[tokio::test]
    async fn test_should_resume_after_failure_with_attempted_turn_in_history() {
        let (mut manager, backend) = manager(ScriptedBackend::with_replies([
            Err(CoreError::Provider("network down".to_owned())),
            Ok("Back online.".to_owned()),
        ]));
        let cancel = CancellationToken::new();

        assert!(manager.exchange("Ping", &cancel).await.is_err());
        manager
            .exchange("Ping", &cancel)
            .await
            .expect("retry should succeed");

        let roles: Vec<Role> = manager
            .get_or_create_session()
            .history()
            .iter()
            .map(|t| t.role)
            .collect();
        assert_eq!(roles, vec![Role::User, Role::User, Role::Model]);

        let calls = backend.calls();
        assert!(matches!(&calls[1], Call::Converse { history, .. } if history.len() == 2));
    }

    #[tokio::test]
    async fn test_should_treat_blank_reply_as_failed_exchange() {
        let (mut manager, _) = manager(ScriptedBackend::with_replies([Ok("  \n".to_owned())]));

        let err = manager
            .exchange("Anything?", &CancellationToken::new())
            .await
            .expect_err("should fail");

        assert!(matches!(err, CoreError::Exchange { source: None, .. }));
        assert_eq!(
            manager.get_or_create_session().history(),
            &[Turn::user("Anything?")]
        );
    }

    #[tokio::test]
    async fn test_should_reject_blank_user_text_without_touching_history() {
        let (mut manager, backend) = manager(ScriptedBackend::default());

        let err = manager
            .exchange("   ", &CancellationToken::new())
            .await
            .expect_err("should fail");

        assert!(matches!(err, CoreError::InvalidInput(_)));
        assert!(manager.get_or_create_session().history().is_empty());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_should_wrap_timeout_as_exchange_error() {
        let backend = Arc::new(
            ScriptedBackend::with_replies([Ok("late".to_owned())])
                .delayed(Duration::from_secs(5)),
        );
        let mut manager = SessionManager::new(
            backend as Arc<dyn ModelBackend>,
            SYSTEM,
            Duration::from_millis(10),
        );

        let err = manager
            .exchange("Hurry", &CancellationToken::new())
            .await
            .expect_err("should time out");

        assert!(matches!(
            err,
            CoreError::Exchange { source: Some(ref inner), .. } if matches!(**inner, CoreError::Timeout(_))
        ));
        assert_eq!(
            manager.get_or_create_session().history(),
            &[Turn::user("Hurry")]
        );
    }

    #[tokio::test]
    async fn test_should_send_seed_history_after_rebuild() {
        let (mut manager, backend) =
            manager(ScriptedBackend::with_replies([Ok("Sure.".to_owned())]));
        let mut transcript = greeting_transcript();
        transcript.push(Message::user("A"));
        transcript.push(Message::assistant("B"));
        manager.rebuild_session_from_transcript(&transcript);

        manager
            .exchange("C", &CancellationToken::new())
            .await
            .expect("should exchange");

        assert_eq!(
            backend.calls(),
            vec![Call::Converse {
                system_instruction: SYSTEM.to_owned(),
                history: vec![Turn::user("A"), Turn::model("B"), Turn::user("C")],
            }]
        );
        let session = manager.get_or_create_session();
        assert_eq!(session.seed_history().len(), 2);
        assert_eq!(session.history().len(), 4);
    }
}
