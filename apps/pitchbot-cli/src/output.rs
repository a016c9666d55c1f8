//! Plain-text and JSON rendering of pitches and ratings.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pitchbot_core::{
    LongTextSection, MAX_SUCCESS_SCORE, NamedEntry, PitchResult, RatingResult, parse_and_validate,
};
use serde::Serialize;
use serde_json::Value;

/// What `pitch --json` prints. `rate --pitch` accepts this as well as a bare
/// pitch object.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchReport<'a> {
    pub idea: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<&'a str>,
    pub pitch: &'a PitchResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<&'a RatingResult>,
}

/// Read a pitch saved by `pitch --json`, or a bare pitch object.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not JSON, or does not
/// hold a complete pitch.
pub fn read_pitch_file(path: &Path) -> Result<PitchResult> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read pitch file: {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("pitch file is not valid JSON: {}", path.display()))?;

    let pitch = match value {
        Value::Object(mut fields) if fields.contains_key("pitch") => {
            fields.remove("pitch").unwrap_or_default()
        }
        other => other,
    };

    parse_and_validate::<PitchResult>(&pitch.to_string())
        .with_context(|| format!("pitch file does not hold a complete pitch: {}", path.display()))
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize output")
}

/// Human-readable lines for a pitch.
pub fn pitch_lines(pitch: &PitchResult) -> Vec<String> {
    let mut lines = vec!["Tagline".to_owned(), format!("  {}", pitch.tagline), String::new()];

    section(&mut lines, "Elevator Pitch", &pitch.elevator_pitch);
    section(&mut lines, "Value Proposition", &pitch.value_proposition);

    lines.push("Slide Bullets".to_owned());
    lines.extend(pitch.slide_bullets.iter().map(|b| format!("  • {b}")));
    lines.push(String::new());

    entries(&mut lines, "Competitors", &pitch.competitors);
    entries(&mut lines, "Revenue Models", &pitch.revenue_models);
    lines.pop();
    lines
}

/// Human-readable lines for a rating.
pub fn rating_lines(rating: &RatingResult) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Success Score: {}/{MAX_SUCCESS_SCORE}",
            rating.success_score
        ),
        String::new(),
    ];
    for (title, items) in [
        ("Key Strengths", &rating.key_strengths),
        ("Potential Weaknesses", &rating.potential_weaknesses),
        ("Actionable Advice", &rating.actionable_advice),
    ] {
        lines.push(title.to_owned());
        lines.extend(items.iter().map(|item| format!("  • {item}")));
        lines.push(String::new());
    }
    lines.pop();
    lines
}

fn section(lines: &mut Vec<String>, title: &str, text: &LongTextSection) {
    lines.push(title.to_owned());
    lines.extend(text.summary_points.iter().map(|p| format!("  • {p}")));
    lines.push(format!("  {}", text.full_text));
    lines.push(String::new());
}

fn entries(lines: &mut Vec<String>, title: &str, items: &[NamedEntry]) {
    lines.push(title.to_owned());
    lines.extend(
        items
            .iter()
            .map(|entry| format!("  • {}: {}", entry.name, entry.description)),
    );
    lines.push(String::new());
}
