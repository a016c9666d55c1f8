//! Core engine.
//!
//! The [`Engine`] is the main entry point for all pitchbot-core operations.
//! It owns the configuration, the prompt templates and the model backend, and
//! exposes the two structured calls plus a factory for chat sessions.

use std::sync::Arc;

use pitchbot_pm::{PromptManager, names};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::backend::{ClaudeBackend, GeminiBackend, ModelBackend};
use crate::config::{
    ChatConfig, EngineConfig, ProjectConfig, Provider, ResolvedModel, load_project_config,
};
use crate::contract::StructuredResponse;
use crate::error::CoreError;
use crate::guard::guarded;
use crate::request::{RequestBuilder, StructuredRequest};
use crate::session::SessionManager;
use crate::types::{PitchResult, RatingResult};
use crate::validate::parse_and_validate;

/// Checked after the configured `apiKeyEnv`.
const FALLBACK_API_KEY_ENV: &str = "API_KEY";

/// Core engine that drives pitch generation, rating and chat.
///
/// Created via [`Engine::new()`], which loads configuration, initializes the
/// prompt manager and builds the configured backend. Structured calls take
/// `&self` and may run concurrently; chat goes through a [`SessionManager`]
/// obtained from [`session_manager()`](Engine::session_manager).
///
/// # Examples
///
/// ```no_run
/// use std::path::PathBuf;
/// use pitchbot_core::{CancellationToken, Engine, EngineConfig};
///
/// # async fn example() -> Result<(), pitchbot_core::CoreError> {
/// let config = EngineConfig::builder()
///     .workdir(PathBuf::from("."))
///     .build();
///
/// let engine = Engine::new(config)?;
/// let pitch = engine
///     .generate_pitch("Drone coffee delivery", Some("Austin, TX"), &CancellationToken::new())
///     .await?;
/// println!("{}", pitch.tagline);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Engine {
    /// CLI-level configuration.
    config: EngineConfig,
    /// Project-level configuration from `.pitchbot/config.yaml`.
    project_config: ProjectConfig,
    /// Provider, model and deadline after applying overrides.
    model: ResolvedModel,
    requests: RequestBuilder,
    /// Shared with every session the engine hands out.
    backend: Arc<dyn ModelBackend>,
    system_instruction: String,
}

impl Engine {
    /// Create a new engine with the given configuration.
    ///
    /// Loads `.pitchbot/config.yaml` (defaults if it doesn't exist), loads
    /// built-in and override templates, and builds the backend for the
    /// resolved provider.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Yaml` if the config file is invalid.
    /// Returns `CoreError::Prompt` if prompt templates cannot be loaded.
    /// Returns `CoreError::Config` if the Gemini API key is missing.
    #[instrument(skip_all)]
    pub fn new(config: EngineConfig) -> Result<Self, CoreError> {
        info!(workdir = %config.workdir().display(), "initializing engine");

        let project_config = load_project_config(&config.config_path())?;
        let model = ResolvedModel::resolve(&config, &project_config);
        let prompts = Arc::new(load_prompts(&config, &project_config)?);
        let backend = build_backend(&model, &project_config, &prompts, |name| {
            std::env::var(name).ok()
        })?;

        Self::assemble(config, project_config, model, prompts, backend)
    }

    /// Create an engine around an existing backend.
    ///
    /// Configuration and templates load as in [`Engine::new`]; the provider
    /// settings only contribute the deadline.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Yaml` if the config file is invalid.
    /// Returns `CoreError::Prompt` if prompt templates cannot be loaded.
    pub fn with_backend(
        config: EngineConfig,
        backend: Arc<dyn ModelBackend>,
    ) -> Result<Self, CoreError> {
        let project_config = load_project_config(&config.config_path())?;
        let model = ResolvedModel::resolve(&config, &project_config);
        let prompts = Arc::new(load_prompts(&config, &project_config)?);

        Self::assemble(config, project_config, model, prompts, backend)
    }

    fn assemble(
        config: EngineConfig,
        project_config: ProjectConfig,
        model: ResolvedModel,
        prompts: Arc<PromptManager>,
        backend: Arc<dyn ModelBackend>,
    ) -> Result<Self, CoreError> {
        let system_instruction = match &project_config.chat.system_instruction {
            Some(text) => text.clone(),
            None => prompts.render(
                names::CHAT_SYSTEM,
                &json!({ "assistant_name": project_config.chat.assistant_name }),
            )?,
        };

        info!(
            backend = backend.name(),
            model = model.model.as_deref().unwrap_or("default"),
            timeout_secs = model.timeout.as_secs(),
            "engine ready"
        );

        Ok(Self {
            config,
            project_config,
            model,
            requests: RequestBuilder::new(prompts),
            backend,
            system_instruction,
        })
    }

    /// Generate a business pitch for an idea.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` if `idea` is blank.
    /// Returns `CoreError::Provider` if the backend call fails.
    /// Returns `CoreError::MalformedResponse` if the reply does not match the
    /// pitch contract.
    /// Returns `CoreError::Timeout` or `CoreError::Cancelled` if the call is
    /// cut short.
    #[instrument(skip(self, cancel))]
    pub async fn generate_pitch(
        &self,
        idea: &str,
        location: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<PitchResult, CoreError> {
        let request = self.requests.pitch_request(idea, location)?;
        self.structured(request, cancel)
            .await
            .map_err(|e| e.context("failed to generate pitch"))
    }

    /// Rate the viability of an idea given the pitch generated for it.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::generate_pitch`], against the rating contract.
    #[instrument(skip(self, pitch, cancel))]
    pub async fn rate_idea(
        &self,
        idea: &str,
        pitch: &PitchResult,
        cancel: &CancellationToken,
    ) -> Result<RatingResult, CoreError> {
        let request = self.requests.rating_request(idea, pitch)?;
        self.structured(request, cancel)
            .await
            .map_err(|e| e.context("failed to rate idea"))
    }

    async fn structured<T: StructuredResponse>(
        &self,
        request: StructuredRequest,
        cancel: &CancellationToken,
    ) -> Result<T, CoreError> {
        let StructuredRequest { prompt, contract } = request;
        debug!(kind = %contract.kind, prompt_len = prompt.len(), "sending structured request");

        let raw = guarded(
            self.model.timeout,
            cancel,
            self.backend.generate(&prompt, &contract),
        )
        .await
        .inspect_err(|e| {
            error!(backend = self.backend.name(), kind = %contract.kind, error = %e, "structured call failed");
        })?;

        parse_and_validate::<T>(&raw).inspect_err(|e| {
            error!(kind = %contract.kind, error = %e, "model reply failed validation");
        })
    }

    /// A new, independent session manager sharing this engine's backend.
    pub fn session_manager(&self) -> SessionManager {
        SessionManager::new(
            Arc::clone(&self.backend),
            self.system_instruction.clone(),
            self.model.timeout,
        )
    }

    /// Returns a reference to the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the chat presentation settings.
    pub fn chat_config(&self) -> &ChatConfig {
        &self.project_config.chat
    }

    /// Returns the resolved provider, model and deadline.
    pub fn model(&self) -> &ResolvedModel {
        &self.model
    }

    /// Returns the system instruction every chat session starts with.
    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }
}

/// Built-in templates, then each `prompts.include` directory in order.
/// Relative include paths resolve against the working directory.
fn load_prompts(
    config: &EngineConfig,
    project_config: &ProjectConfig,
) -> Result<PromptManager, CoreError> {
    let mut prompts = PromptManager::new()?;
    for dir in &project_config.prompts.include {
        let dir = config.workdir().join(dir);
        let loaded = prompts.load_dir(&dir)?;
        debug!(dir = %dir.display(), loaded, "applied prompt overrides");
    }
    Ok(prompts)
}

fn build_backend(
    model: &ResolvedModel,
    project_config: &ProjectConfig,
    prompts: &Arc<PromptManager>,
    lookup_env: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn ModelBackend>, CoreError> {
    match model.provider {
        Provider::Gemini => {
            let api_key = resolve_api_key(&project_config.model.api_key_env, lookup_env)?;
            let name = model
                .model
                .clone()
                .or_else(|| Provider::Gemini.default_model().map(String::from))
                .ok_or_else(|| CoreError::Config("no gemini model configured".to_owned()))?;
            Ok(Arc::new(GeminiBackend::new(
                api_key,
                name,
                project_config.model.base_url.clone(),
            )))
        }
        Provider::Claude => Ok(Arc::new(ClaudeBackend::new(
            Arc::clone(prompts),
            model.model.clone(),
        ))),
    }
}

fn resolve_api_key(
    primary: &str,
    lookup_env: impl Fn(&str) -> Option<String>,
) -> Result<String, CoreError> {
    [primary, FALLBACK_API_KEY_ENV]
        .into_iter()
        .filter_map(&lookup_env)
        .find(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            CoreError::Config(format!(
                "no Gemini API key found; set {primary} or {FALLBACK_API_KEY_ENV}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use super::*;
    use crate::contract::ResponseKind;
    use crate::testing::{Call, ScriptedBackend, sample_pitch};

    fn write_config(dir: &Path, yaml: &str) {
        let state_dir = dir.join(".pitchbot");
        std::fs::create_dir_all(&state_dir).expect("should create .pitchbot dir");
        std::fs::write(state_dir.join("config.yaml"), yaml).expect("should write config");
    }

    fn scripted_engine(
        dir: &Path,
        replies: impl IntoIterator<Item = Result<String, CoreError>>,
    ) -> (Engine, Arc<ScriptedBackend>) {
        let backend = Arc::new(ScriptedBackend::with_replies(replies));
        let config = EngineConfig::builder().workdir(dir.to_path_buf()).build();
        let engine = Engine::with_backend(config, Arc::clone(&backend) as Arc<dyn ModelBackend>)
            .expect("should create engine");
        (engine, backend)
    }

    fn pitch_reply() -> String {
        serde_json::to_string(&sample_pitch()).expect("should serialize pitch")
    }

    #[test]
    fn test_should_create_claude_engine_from_project_config() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        write_config(
            dir.path(),
            "model:\n  provider: claude\n  timeoutSecs: 15\nchat:\n  assistantName: Coach\n",
        );
        let config = EngineConfig::builder()
            .workdir(dir.path().to_path_buf())
            .build();

        let engine = Engine::new(config).expect("should create engine");

        assert_eq!(engine.model().provider, Provider::Claude);
        assert_eq!(engine.model().timeout, Duration::from_secs(15));
        assert!(engine.system_instruction().starts_with("You are Coach,"));
        assert_eq!(engine.config().workdir(), &dir.path().to_path_buf());
    }

    #[test]
    fn test_should_fail_on_invalid_config_yaml() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        write_config(dir.path(), "model: [unclosed");
        let config = EngineConfig::builder()
            .workdir(dir.path().to_path_buf())
            .provider(Provider::Claude)
            .build();

        assert!(matches!(Engine::new(config), Err(CoreError::Yaml(_))));
    }

    #[test]
    fn test_should_apply_prompt_overrides_from_include_dirs() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        write_config(dir.path(), "prompts:\n  include:\n    - prompts\n");
        let chat_dir = dir.path().join("prompts").join("chat");
        std::fs::create_dir_all(&chat_dir).expect("should create prompts dir");
        std::fs::write(chat_dir.join("system.j2"), "Custom coach called {{ assistant_name }}.")
            .expect("should write template");

        let (engine, _) = scripted_engine(dir.path(), []);
        assert_eq!(engine.system_instruction(), "Custom coach called PitchBot.");
    }

    #[test]
    fn test_should_prefer_configured_system_instruction() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        write_config(dir.path(), "chat:\n  systemInstruction: Be terse.\n");

        let (engine, _) = scripted_engine(dir.path(), []);
        assert_eq!(engine.system_instruction(), "Be terse.");
        assert_eq!(
            engine.session_manager().get_or_create_session().system_instruction(),
            "Be terse."
        );
    }

    #[test]
    fn test_should_resolve_api_key_with_fallback() {
        let primary = resolve_api_key("GEMINI_API_KEY", |name| {
            (name == "GEMINI_API_KEY").then(|| "gm-key".to_owned())
        })
        .expect("should find primary key");
        assert_eq!(primary, "gm-key");

        let fallback = resolve_api_key("GEMINI_API_KEY", |name| match name {
            "GEMINI_API_KEY" => Some(" ".to_owned()),
            "API_KEY" => Some("fallback-key".to_owned()),
            _ => None,
        })
        .expect("should find fallback key");
        assert_eq!(fallback, "fallback-key");

        let missing = resolve_api_key("GEMINI_API_KEY", |_| None);
        assert!(matches!(missing, Err(CoreError::Config(msg)) if msg.contains("GEMINI_API_KEY")));
    }

    #[test]
    fn test_should_build_gemini_backend_with_default_model() {
        let config = EngineConfig::builder().workdir(PathBuf::from("/tmp")).build();
        let project = ProjectConfig::default();
        let model = ResolvedModel::resolve(&config, &project);
        let prompts = Arc::new(PromptManager::new().expect("should create prompt manager"));

        let backend = build_backend(&model, &project, &prompts, |_| Some("k".to_owned()))
            .expect("should build backend");
        assert_eq!(backend.name(), "gemini");

        let err = build_backend(&model, &project, &prompts, |_| None).expect_err("should fail");
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[tokio::test]
    async fn test_should_generate_pitch_through_backend() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let (engine, backend) = scripted_engine(dir.path(), [Ok(pitch_reply())]);

        let pitch = engine
            .generate_pitch("Drone coffee", Some("Austin, TX"), &CancellationToken::new())
            .await
            .expect("should generate pitch");

        assert_eq!(pitch, sample_pitch());
        match backend.calls().as_slice() {
            [Call::Generate { prompt, kind }] => {
                assert_eq!(*kind, ResponseKind::Pitch);
                assert!(prompt.contains("Drone coffee"));
                assert!(prompt.contains("Austin, TX"));
            }
            other => panic!("unexpected calls: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_should_reject_blank_idea_without_calling_backend() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let (engine, backend) = scripted_engine(dir.path(), []);

        let err = engine
            .generate_pitch("  ", None, &CancellationToken::new())
            .await
            .expect_err("should fail");

        assert!(matches!(err, CoreError::InvalidInput(_)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_should_report_malformed_pitch_with_context() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let (engine, _) = scripted_engine(
            dir.path(),
            [Ok(r#"{"elevatorPitch": {"summaryPoints": [], "fullText": "x"}}"#.to_owned())],
        );

        let err = engine
            .generate_pitch("Drone coffee", None, &CancellationToken::new())
            .await
            .expect_err("should fail");

        match err {
            CoreError::MalformedResponse { kind, reason } => {
                assert_eq!(kind, ResponseKind::Pitch);
                assert!(reason.starts_with("failed to generate pitch: "));
                assert!(reason.contains("`tagline` is missing"));
            }
            other => panic!("expected malformed response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_should_wrap_provider_error_with_context() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let (engine, _) = scripted_engine(
            dir.path(),
            [Err(CoreError::Provider("quota exceeded".to_owned()))],
        );

        let err = engine
            .rate_idea("Drone coffee", &sample_pitch(), &CancellationToken::new())
            .await
            .expect_err("should fail");

        assert!(matches!(
            err,
            CoreError::Provider(ref msg) if msg == "failed to rate idea: quota exceeded"
        ));
    }

    #[tokio::test]
    async fn test_should_rate_idea_and_clamp_score() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let reply = r#"{"successScore": 140, "keyStrengths": ["Timing"],
            "potentialWeaknesses": ["Regulation"], "actionableAdvice": ["Pilot on one campus"]}"#;
        let (engine, backend) = scripted_engine(dir.path(), [Ok(reply.to_owned())]);

        let rating = engine
            .rate_idea("Drone coffee", &sample_pitch(), &CancellationToken::new())
            .await
            .expect("should rate idea");

        assert_eq!(rating.success_score, 100);
        assert_eq!(rating.key_strengths, vec!["Timing".to_owned()]);
        assert!(matches!(
            backend.calls().as_slice(),
            [Call::Generate { kind: ResponseKind::Rating, prompt }] if prompt.contains("Tagline: Coffee, delivered by drone.")
        ));
    }

    #[tokio::test]
    async fn test_should_return_cancelled_when_token_fires() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let (engine, _) = scripted_engine(dir.path(), [Ok(pitch_reply())]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine
            .generate_pitch("Drone coffee", None, &cancel)
            .await
            .expect_err("should be cancelled");
        assert!(matches!(err, CoreError::Cancelled));
    }

    #[tokio::test]
    async fn test_should_share_backend_with_independent_session_managers() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let (engine, backend) = scripted_engine(dir.path(), [Ok("Hello!".to_owned())]);

        let mut first = engine.session_manager();
        let mut second = engine.session_manager();
        let reply = first
            .exchange("Hi", &CancellationToken::new())
            .await
            .expect("should exchange");

        assert_eq!(reply, "Hello!");
        assert_eq!(first.get_or_create_session().history().len(), 2);
        assert!(second.get_or_create_session().history().is_empty());
        assert!(matches!(
            backend.calls().as_slice(),
            [Call::Converse { system_instruction, .. }] if system_instruction == engine.system_instruction()
        ));
    }
}
