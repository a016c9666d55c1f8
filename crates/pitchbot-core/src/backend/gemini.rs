//! Gemini backend over the `generateContent` REST API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, instrument};

use super::{ModelBackend, Role, Turn};
use crate::contract::ResponseContract;
use crate::error::CoreError;

const API_VERSION_PATH: &str = "/v1beta/models";
const JSON_MIME_TYPE: &str = "application/json";

// ── Wire types ───────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    status: Option<String>,
}

impl<'a> Content<'a> {
    fn text(role: Option<&'static str>, text: &'a str) -> Self {
        Self {
            role,
            parts: vec![Part { text }],
        }
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

fn structured_request<'a>(
    prompt: &'a str,
    contract: &'a ResponseContract,
) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        contents: vec![Content::text(Some("user"), prompt)],
        system_instruction: None,
        generation_config: Some(GenerationConfig {
            response_mime_type: JSON_MIME_TYPE,
            response_schema: &contract.schema,
        }),
    }
}

fn chat_request<'a>(system_instruction: &'a str, history: &'a [Turn]) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        contents: history
            .iter()
            .map(|turn| Content::text(Some(role_name(turn.role)), &turn.text))
            .collect(),
        system_instruction: Some(Content::text(None, system_instruction)),
        generation_config: None,
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response: GenerateContentResponse) -> Result<String, CoreError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(CoreError::Provider(format!(
            "gemini blocked the prompt: {reason}"
        )));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| CoreError::Provider("gemini returned no candidates".to_owned()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty()
        && let Some(reason) = candidate.finish_reason
    {
        return Err(CoreError::Provider(format!(
            "gemini returned no text (finish reason: {reason})"
        )));
    }
    Ok(text)
}

fn describe_api_error(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(ApiErrorBody { error }) => match error.status {
            Some(status) => format!("{status}: {}", error.message),
            None => error.message,
        },
        Err(_) => body.chars().take(200).collect(),
    }
}

// ── Backend ──────────────────────────────────────────────────

/// HTTP client for the Gemini `generateContent` endpoint.
///
/// Structured calls use Gemini's native `responseSchema`; conversational
/// calls send the full history plus a `systemInstruction` each time.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("model", &self.model)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl GeminiBackend {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let model: String = model.into();
        let base: String = base_url.into();
        let url = format!(
            "{}{API_VERSION_PATH}/{model}:generateContent",
            base.trim_end_matches('/')
        );
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model,
            url,
        }
    }

    /// Full endpoint URL, e.g. `https://…/v1beta/models/gemini-2.5-flash:generateContent`.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send(&self, request: &GenerateContentRequest<'_>) -> Result<String, CoreError> {
        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!(model = %self.model, error = %e, "gemini request failed");
                CoreError::Provider(format!(
                    "request to gemini failed: {e}. Check your network connection."
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = describe_api_error(&body);
            error!(model = %self.model, %status, %detail, "gemini returned an error");
            return Err(CoreError::Provider(format!(
                "gemini returned {status}: {detail}"
            )));
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            error!(model = %self.model, error = %e, "failed to decode gemini response");
            CoreError::Provider(format!("failed to decode gemini response: {e}"))
        })?;

        extract_text(parsed).inspect_err(|e| {
            error!(model = %self.model, error = %e, "gemini response had no usable text");
        })
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    #[instrument(skip_all, fields(model = %self.model, kind = %contract.kind))]
    async fn generate(
        &self,
        prompt: &str,
        contract: &ResponseContract,
    ) -> Result<String, CoreError> {
        debug!(prompt_len = prompt.len(), "sending structured request");
        self.send(&structured_request(prompt, contract)).await
    }

    #[instrument(skip_all, fields(model = %self.model, turns = history.len()))]
    async fn converse(
        &self,
        system_instruction: &str,
        history: &[Turn],
    ) -> Result<String, CoreError> {
        debug!("sending chat request");
        self.send(&chat_request(system_instruction, history)).await
    }
}
