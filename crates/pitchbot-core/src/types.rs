//! Typed results of the structured generation calls.
//!
//! Field names serialize in camelCase to match the response contracts in
//! [`crate::contract`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Number;
use tracing::warn;

/// A section rendered both as bullet points and as prose.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongTextSection {
    /// Key points, usually 2-3 (advisory, not enforced).
    pub summary_points: Vec<String>,

    /// The full, detailed text.
    pub full_text: String,
}

/// A named item with a short description (competitor, revenue model).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntry {
    pub name: String,
    pub description: String,
}

/// A generated multi-section business pitch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchResult {
    /// Short, memorable slogan.
    pub tagline: String,

    /// 30-60 second summary of the idea.
    pub elevator_pitch: LongTextSection,

    /// Unique value and benefits of the product.
    pub value_proposition: LongTextSection,

    /// Bullet points for a pitch deck.
    pub slide_bullets: Vec<String>,

    /// Key competitors, biased toward the user's region when one was given.
    pub competitors: Vec<NamedEntry>,

    /// Candidate revenue models.
    pub revenue_models: Vec<NamedEntry>,
}

impl PitchResult {
    /// Competitor names in order.
    pub fn competitor_names(&self) -> Vec<&str> {
        self.competitors.iter().map(|c| c.name.as_str()).collect()
    }

    /// Revenue model names in order.
    pub fn revenue_model_names(&self) -> Vec<&str> {
        self.revenue_models.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Viability assessment of a pitched idea.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingResult {
    /// Estimated chance of success, clamped into `0..=100`.
    #[serde(deserialize_with = "deserialize_score")]
    pub success_score: u8,

    pub key_strengths: Vec<String>,

    pub potential_weaknesses: Vec<String>,

    pub actionable_advice: Vec<String>,
}

/// Maximum value of [`RatingResult::success_score`].
pub const MAX_SUCCESS_SCORE: u8 = 100;

fn deserialize_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Number::deserialize(deserializer)?;
    let clamped = if let Some(n) = raw.as_u64() {
        n.min(u64::from(MAX_SUCCESS_SCORE))
    } else if raw.is_i64() {
        0
    } else {
        return Err(serde::de::Error::custom(format!(
            "success score must be an integer, found {raw}"
        )));
    };
    let clamped = u8::try_from(clamped).map_err(serde::de::Error::custom)?;
    if raw.as_u64() != Some(u64::from(clamped)) {
        warn!(%raw, clamped, "success score out of range, clamping");
    }
    Ok(clamped)
}
