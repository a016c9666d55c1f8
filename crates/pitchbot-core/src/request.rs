//! Prompt construction for the structured calls.

use std::sync::Arc;

use pitchbot_pm::{PromptManager, names};
use serde_json::json;

use crate::contract::ResponseContract;
use crate::error::CoreError;
use crate::types::PitchResult;

/// A rendered prompt paired with the contract its reply must satisfy.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub prompt: String,
    pub contract: ResponseContract,
}

/// Renders pitch and rating prompts from the loaded templates.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    prompts: Arc<PromptManager>,
}

impl RequestBuilder {
    pub fn new(prompts: Arc<PromptManager>) -> Self {
        Self { prompts }
    }

    /// Render the pitch prompt.
    ///
    /// A blank `location` is treated as absent and leaves out the sentence
    /// that biases competitor analysis toward the user's region.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` if `idea` is blank.
    /// Returns `CoreError::Prompt` if the template fails to render.
    pub fn build_pitch_prompt(
        &self,
        idea: &str,
        location: Option<&str>,
    ) -> Result<String, CoreError> {
        let idea = require_idea(idea)?;
        let location = location.map(str::trim).unwrap_or_default();
        let context = json!({
            "idea": idea,
            "location": location,
        });
        Ok(self.prompts.render(names::PITCH_TASK, &context)?)
    }

    /// Render the rating prompt for an idea and the pitch generated for it.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` if `idea` is blank.
    /// Returns `CoreError::Prompt` if the template fails to render.
    pub fn build_rating_prompt(
        &self,
        idea: &str,
        pitch: &PitchResult,
    ) -> Result<String, CoreError> {
        let idea = require_idea(idea)?;
        let context = json!({
            "idea": idea,
            "tagline": pitch.tagline,
            "elevator_pitch": pitch.elevator_pitch.full_text,
            "value_proposition": pitch.value_proposition.full_text,
            "competitors": pitch.competitor_names(),
            "revenue_models": pitch.revenue_model_names(),
        });
        Ok(self.prompts.render(names::RATING_TASK, &context)?)
    }

    pub fn pitch_request(
        &self,
        idea: &str,
        location: Option<&str>,
    ) -> Result<StructuredRequest, CoreError> {
        Ok(StructuredRequest {
            prompt: self.build_pitch_prompt(idea, location)?,
            contract: ResponseContract::pitch(),
        })
    }

    pub fn rating_request(
        &self,
        idea: &str,
        pitch: &PitchResult,
    ) -> Result<StructuredRequest, CoreError> {
        Ok(StructuredRequest {
            prompt: self.build_rating_prompt(idea, pitch)?,
            contract: ResponseContract::rating(),
        })
    }
}

fn require_idea(idea: &str) -> Result<&str, CoreError> {
    if idea.trim().is_empty() {
        return Err(CoreError::InvalidInput(
            "startup idea must not be empty".to_owned(),
        ));
    }
    Ok(idea)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ResponseKind;
    use crate::testing::sample_pitch;

    const LOCATION_SENTENCE: &str = " The user is based in Austin, TX. Cover competitors globally and, where possible, specifically within this local area.";

    fn builder() -> RequestBuilder {
        RequestBuilder::new(Arc::new(
            PromptManager::new().expect("should create prompt manager"),
        ))
    }

    #[test]
    fn test_should_differ_only_by_location_sentence() {
        let builder = builder();
        let idea = "Drone coffee delivery for office parks";

        let plain = builder
            .build_pitch_prompt(idea, None)
            .expect("should render without location");
        let local = builder
            .build_pitch_prompt(idea, Some("Austin, TX"))
            .expect("should render with location");

        assert!(plain.contains(idea));
        assert!(local.contains(idea));
        assert_eq!(local.replacen(LOCATION_SENTENCE, "", 1), plain);
    }

    #[test]
    fn test_should_treat_blank_location_as_absent() {
        let builder = builder();
        let plain = builder
            .build_pitch_prompt("Chai subscription", None)
            .expect("should render");
        let blank = builder
            .build_pitch_prompt("Chai subscription", Some("   "))
            .expect("should render");
        assert_eq!(plain, blank);
        assert!(!blank.contains("based in"));
    }

    #[test]
    fn test_should_mention_hinglish_and_summary_variants() {
        let prompt = builder()
            .build_pitch_prompt("Ghar ka khana delivery app", None)
            .expect("should render");
        assert!(prompt.contains("Hinglish"));
        assert!(prompt.contains("'elevatorPitch'"));
        assert!(prompt.contains("'valueProposition'"));
    }

    #[test]
    fn test_should_embed_idea_verbatim() {
        let builder = builder();
        let idea = "  Drone coffee\n  for office parks ";

        let pitch = builder
            .build_pitch_prompt(idea, None)
            .expect("should render pitch prompt");
        let rating = builder
            .build_rating_prompt(idea, &sample_pitch())
            .expect("should render rating prompt");

        assert!(pitch.contains(idea));
        assert!(rating.contains(idea));
    }

    #[test]
    fn test_should_reject_blank_idea() {
        let err = builder()
            .build_pitch_prompt(" \n\t", Some("Austin, TX"))
            .expect_err("should fail");
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn test_should_restate_pitch_in_rating_prompt() {
        let prompt = builder()
            .build_rating_prompt("Drone coffee", &sample_pitch())
            .expect("should render");

        assert!(prompt.contains("Startup Idea: \"Drone coffee\""));
        assert!(prompt.contains("Tagline: Coffee, delivered by drone."));
        assert!(prompt.contains("Elevator Pitch: We fly fresh coffee to your desk."));
        assert!(prompt.contains("Value Proposition: Skip the line entirely."));
        assert!(prompt.contains("Competitors: Starbucks, DoorDash"));
        assert!(prompt.contains("Revenue Models: Subscription, Per delivery"));
    }

    #[test]
    fn test_should_pair_prompts_with_contracts() {
        let builder = builder();
        let pitch = builder
            .pitch_request("Drone coffee", None)
            .expect("should build pitch request");
        assert_eq!(pitch.contract.kind, ResponseKind::Pitch);

        let rating = builder
            .rating_request("Drone coffee", &sample_pitch())
            .expect("should build rating request");
        assert_eq!(rating.contract.kind, ResponseKind::Rating);
        assert!(rating.prompt.contains("Drone coffee"));
    }
}
