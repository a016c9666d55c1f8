//! Configuration types for pitchbot-core.
//!
//! This module defines [`EngineConfig`] (CLI-level overrides) and
//! [`ProjectConfig`] (from `.pitchbot/config.yaml`). During engine
//! initialization, CLI flags in `EngineConfig` take precedence over values read
//! from `ProjectConfig`, which in turn fall back to built-in defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::CoreError;

/// Name of the per-directory state folder holding config and logs.
pub const STATE_DIR: &str = ".pitchbot";

// ── Engine Configuration (CLI-level) ─────────────────────────

/// Engine configuration provided by the CLI layer.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use pitchbot_core::{EngineConfig, Provider};
///
/// let config = EngineConfig::builder()
///     .workdir(PathBuf::from("/tmp/pitch"))
///     .provider(Provider::Claude)
///     .timeout_secs(30_u64)
///     .build();
/// assert_eq!(config.provider(), Some(Provider::Claude));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct EngineConfig {
    /// Directory holding `.pitchbot/` (config, prompt overrides, logs).
    workdir: PathBuf,

    /// Override the model provider.
    #[builder(default, setter(into))]
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<Provider>,

    /// Override the model name.
    #[builder(default, setter(into))]
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,

    /// Override the per-call deadline, in seconds.
    #[builder(default, setter(into))]
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_secs: Option<u64>,
}

impl EngineConfig {
    /// Returns the working directory.
    pub fn workdir(&self) -> &PathBuf {
        &self.workdir
    }

    /// Returns the provider override, if set.
    pub fn provider(&self) -> Option<Provider> {
        self.provider
    }

    /// Returns the model override, if set.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Returns the timeout override, if set.
    pub fn timeout_secs(&self) -> Option<u64> {
        self.timeout_secs
    }

    /// Returns the `.pitchbot` directory path.
    pub fn state_dir(&self) -> PathBuf {
        self.workdir.join(STATE_DIR)
    }

    /// Returns the path to `config.yaml` inside the `.pitchbot` directory.
    pub fn config_path(&self) -> PathBuf {
        self.state_dir().join("config.yaml")
    }
}

// ── Project Configuration (.pitchbot/config.yaml) ───────────

/// Project-level configuration, deserialized from `.pitchbot/config.yaml`.
///
/// All fields have serde defaults so a partial file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Model provider settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Prompt template search paths.
    #[serde(default)]
    pub prompts: PromptsConfig,

    /// Chat presentation settings.
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Generative model backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Gemini over the `generateContent` REST API.
    #[default]
    Gemini,
    /// Claude through the agent SDK, prompt-only.
    Claude,
}

impl Provider {
    /// Model used when neither the CLI nor the config names one.
    pub fn default_model(self) -> Option<&'static str> {
        match self {
            Self::Gemini => Some("gemini-2.5-flash"),
            Self::Claude => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gemini => f.write_str("gemini"),
            Self::Claude => f.write_str("claude"),
        }
    }
}

impl FromStr for Provider {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "claude" => Ok(Self::Claude),
            other => Err(CoreError::Config(format!(
                "unknown provider '{other}', expected 'gemini' or 'claude'"
            ))),
        }
    }
}

/// Model settings from the project config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Backend to call.
    #[serde(default)]
    pub provider: Provider,

    /// Model name; the provider default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Environment variable holding the API key (Gemini only).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the Gemini REST API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Deadline applied to every model call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            name: None,
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Prompt template configuration.
///
/// Templates found in these directories replace built-in templates with the
/// same name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsConfig {
    /// Additional template directories to search (in order).
    #[serde(default)]
    pub include: Vec<PathBuf>,
}

/// Chat settings shared by the session layer and the front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    /// Assistant name used in the system instruction.
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,

    /// Locally generated first message of every transcript. Never sent to
    /// the model.
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Shown to the user when an exchange fails. Never sent to the model.
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,

    /// Replaces the rendered `chat/system` template entirely when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            assistant_name: default_assistant_name(),
            greeting: default_greeting(),
            fallback_reply: default_fallback_reply(),
            system_instruction: None,
        }
    }
}

// ── Default value functions for serde ────────────────────────

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_owned()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_owned()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_assistant_name() -> String {
    "PitchBot".to_owned()
}

fn default_greeting() -> String {
    "Hi! I'm PitchBot. How can I help you refine your startup idea today?".to_owned()
}

fn default_fallback_reply() -> String {
    "Sorry, I'm having trouble connecting. Please try again later.".to_owned()
}

// ── Resolution ───────────────────────────────────────────────

/// Model settings after applying CLI overrides to the project config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub provider: Provider,
    pub model: Option<String>,
    pub timeout: Duration,
}

impl ResolvedModel {
    /// Merge CLI overrides over the project config.
    ///
    /// A model name from the config file only applies when the provider was
    /// not overridden on the command line, since names are provider specific.
    pub fn resolve(config: &EngineConfig, project: &ProjectConfig) -> Self {
        let provider = config.provider().unwrap_or(project.model.provider);
        let configured_name = if provider == project.model.provider {
            project.model.name.clone()
        } else {
            None
        };
        let model = config
            .model()
            .map(String::from)
            .or(configured_name)
            .or_else(|| provider.default_model().map(String::from));
        let timeout_secs = config
            .timeout_secs()
            .unwrap_or(project.model.timeout_secs)
            .max(1);

        Self {
            provider,
            model,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

// ── Config loading ───────────────────────────────────────────

/// Load [`ProjectConfig`] from a `config.yaml` file.
///
/// If the file does not exist, returns the default configuration.
///
/// # Errors
///
/// Returns `CoreError::Io` if the file exists but cannot be read.
/// Returns `CoreError::Yaml` if the file contains invalid YAML.
pub fn load_project_config(config_path: &Path) -> Result<ProjectConfig, CoreError> {
    if !config_path.exists() {
        return Ok(ProjectConfig::default());
    }
    let content = std::fs::read_to_string(config_path)?;
    let config: ProjectConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}
