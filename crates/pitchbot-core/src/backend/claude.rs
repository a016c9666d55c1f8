//! Claude backend through `claude-agent-sdk-rs`.
//!
//! The agent runs prompt-only (plan permission mode). The SDK has no native
//! response schema or seed history, so the contract is embedded in the prompt
//! and the conversation is flattened through the `chat/transcript` template.

use std::sync::Arc;

use async_trait::async_trait;
use claude_agent_sdk_rs::{
    ClaudeAgentOptions, ContentBlock, Message, PermissionMode as SdkPermissionMode, SystemPrompt,
};
use pitchbot_pm::{PromptManager, names};
use serde_json::json;
use tracing::{debug, error, instrument};

use super::{ModelBackend, Turn};
use crate::contract::ResponseContract;
use crate::error::CoreError;

const STRUCTURED_SYSTEM_PROMPT: &str =
    "You are a startup analyst. You answer with a single JSON object and never use tools.";

/// Runs one-shot Claude agent queries for structured and chat calls.
#[derive(Debug)]
pub struct ClaudeBackend {
    prompts: Arc<PromptManager>,
    model: Option<String>,
}

impl ClaudeBackend {
    /// `model` of `None` leaves the choice to the SDK.
    pub fn new(prompts: Arc<PromptManager>, model: Option<String>) -> Self {
        Self { prompts, model }
    }

    fn options(&self, system_prompt: &str) -> ClaudeAgentOptions {
        ClaudeAgentOptions {
            system_prompt: Some(SystemPrompt::Text(system_prompt.to_owned())),
            permission_mode: Some(SdkPermissionMode::Plan),
            model: self.model.clone(),
            ..Default::default()
        }
    }

    fn structured_prompt(
        &self,
        prompt: &str,
        contract: &ResponseContract,
    ) -> Result<String, CoreError> {
        let context = json!({
            "prompt": prompt,
            "schema": contract.schema_text(),
        });
        Ok(self.prompts.render(names::STRUCTURED_JSON, &context)?)
    }

    fn transcript_prompt(&self, history: &[Turn]) -> Result<String, CoreError> {
        Ok(self
            .prompts
            .render(names::CHAT_TRANSCRIPT, &json!({ "turns": history }))?)
    }

    async fn run(&self, prompt: &str, options: ClaudeAgentOptions) -> Result<String, CoreError> {
        let messages = claude_agent_sdk_rs::query(prompt, Some(options))
            .await
            .map_err(|e| {
                error!(error = %e, "claude query failed");
                CoreError::Provider(format!(
                    "claude query failed: {e}. Check your network connection and API credentials."
                ))
            })?;

        collect_reply(&messages).inspect_err(|e| {
            error!(error = %e, "claude returned an error result");
        })
    }
}

/// Join the text blocks of all assistant messages, failing on an error result.
fn collect_reply(messages: &[Message]) -> Result<String, CoreError> {
    let mut text = String::new();
    for msg in messages {
        match msg {
            Message::Assistant(assistant) => {
                for block in &assistant.message.content {
                    if let ContentBlock::Text(text_block) = block {
                        text.push_str(&text_block.text);
                    }
                }
            }
            Message::Result(result) if result.is_error => {
                return Err(CoreError::Provider(format!(
                    "claude returned an error result: {}",
                    result.result.as_deref().unwrap_or("unknown error")
                )));
            }
            _ => {}
        }
    }
    Ok(text)
}

#[async_trait]
impl ModelBackend for ClaudeBackend {
    fn name(&self) -> &str {
        "claude"
    }

    #[instrument(skip_all, fields(kind = %contract.kind))]
    async fn generate(
        &self,
        prompt: &str,
        contract: &ResponseContract,
    ) -> Result<String, CoreError> {
        let full_prompt = self.structured_prompt(prompt, contract)?;
        debug!(prompt_len = full_prompt.len(), "sending structured query");
        self.run(&full_prompt, self.options(STRUCTURED_SYSTEM_PROMPT))
            .await
    }

    #[instrument(skip_all, fields(turns = history.len()))]
    async fn converse(
        &self,
        system_instruction: &str,
        history: &[Turn],
    ) -> Result<String, CoreError> {
        let prompt = self.transcript_prompt(history)?;
        debug!(prompt_len = prompt.len(), "sending chat query");
        self.run(&prompt, self.options(system_instruction)).await
    }
}
