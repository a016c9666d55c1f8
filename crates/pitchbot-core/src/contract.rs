//! Response contracts for structured generation.
//!
//! Each structured call is paired with a schema in the OpenAPI subset that
//! Gemini accepts as `responseSchema` (`OBJECT`, `ARRAY`, `STRING`,
//! `INTEGER`). The same schema drives the shape check in
//! [`crate::validate`], so the contract sent to the model and the contract
//! enforced on its reply cannot drift apart. Cardinalities live in the
//! descriptions and are advisory.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::types::{PitchResult, RatingResult};

/// Which structured call a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Pitch,
    Rating,
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pitch => f.write_str("pitch"),
            Self::Rating => f.write_str("rating"),
        }
    }
}

/// A response schema for one kind of structured call.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseContract {
    pub kind: ResponseKind,
    pub schema: Value,
}

impl ResponseContract {
    /// Contract for [`PitchResult`].
    pub fn pitch() -> Self {
        Self {
            kind: ResponseKind::Pitch,
            schema: pitch_schema(),
        }
    }

    /// Contract for [`RatingResult`].
    pub fn rating() -> Self {
        Self {
            kind: ResponseKind::Rating,
            schema: rating_schema(),
        }
    }

    /// Pretty-printed schema, for backends that take it as prompt text.
    pub fn schema_text(&self) -> String {
        serde_json::to_string_pretty(&self.schema).unwrap_or_else(|_| self.schema.to_string())
    }
}

/// A typed value that a structured call produces.
pub trait StructuredResponse: DeserializeOwned {
    const KIND: ResponseKind;

    fn contract() -> ResponseContract;
}

impl StructuredResponse for PitchResult {
    const KIND: ResponseKind = ResponseKind::Pitch;

    fn contract() -> ResponseContract {
        ResponseContract::pitch()
    }
}

impl StructuredResponse for RatingResult {
    const KIND: ResponseKind = ResponseKind::Rating;

    fn contract() -> ResponseContract {
        ResponseContract::rating()
    }
}

fn long_text_schema(description: &str) -> Value {
    json!({
        "type": "OBJECT",
        "description": description,
        "properties": {
            "summaryPoints": {
                "type": "ARRAY",
                "description": "A list of 2-3 key bullet points summarizing the content.",
                "items": { "type": "STRING" }
            },
            "fullText": {
                "type": "STRING",
                "description": "The full, detailed text of the content."
            }
        },
        "required": ["summaryPoints", "fullText"]
    })
}

fn named_entries_schema(description: &str) -> Value {
    json!({
        "type": "ARRAY",
        "description": description,
        "items": {
            "type": "OBJECT",
            "properties": {
                "name": { "type": "STRING" },
                "description": { "type": "STRING" }
            },
            "required": ["name", "description"]
        }
    })
}

fn string_list_schema(description: &str) -> Value {
    json!({
        "type": "ARRAY",
        "description": description,
        "items": { "type": "STRING" }
    })
}

fn pitch_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "elevatorPitch": long_text_schema(
                "A concise and compelling 30-60 second summary of the business idea, \
                 as summary points and full text."
            ),
            "tagline": {
                "type": "STRING",
                "description": "A short, memorable slogan for the business."
            },
            "valueProposition": long_text_schema(
                "A clear statement of the unique value and benefits the product or \
                 service offers, as summary points and full text."
            ),
            "slideBullets": string_list_schema(
                "A list of 5-7 key bullet points for a pitch deck presentation."
            ),
            "competitors": named_entries_schema(
                "A list of 2-3 key competitors with a brief description of their \
                 offerings. Include local competitors when a location is given."
            ),
            "revenueModels": named_entries_schema(
                "A list of 2-3 potential revenue models with a brief explanation of each."
            )
        },
        "required": [
            "elevatorPitch",
            "tagline",
            "valueProposition",
            "slideBullets",
            "competitors",
            "revenueModels"
        ]
    })
}

fn rating_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "successScore": {
                "type": "INTEGER",
                "description": "A score from 0 to 100 for the potential success of the \
                                startup idea. 0 is very low, 100 is extremely high."
            },
            "keyStrengths": string_list_schema(
                "A list of 3-4 key strengths of the business idea."
            ),
            "potentialWeaknesses": string_list_schema(
                "A list of 3-4 potential weaknesses or challenges the business might face."
            ),
            "actionableAdvice": string_list_schema(
                "A list of 2-3 concrete, actionable pieces of advice to improve the idea."
            )
        },
        "required": [
            "successScore",
            "keyStrengths",
            "potentialWeaknesses",
            "actionableAdvice"
        ]
    })
}
