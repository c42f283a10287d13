use retell_contracts::feedback::{CommunicationBehavior, ExampleRewrite, Feedback};
use retell_contracts::modes::CoachMode;

use crate::capture::InlinePayload;
use crate::error::CoachError;
use crate::gemini::GeminiCoach;

/// Seam between the pipeline and the hosted model. Each method maps to one
/// billed remote call on the real implementation.
pub trait CoachModel {
    fn name(&self) -> &str;

    /// Neutral ground-truth description of the image. Strictly descriptive;
    /// persona and scoring language never reach this call.
    fn generate_caption(&self, payload: &InlinePayload) -> Result<String, CoachError>;

    /// Single-sentence structural suggestion for how to approach the
    /// explanation. Requested separately from a grading run.
    fn generate_strategy(&self, payload: &InlinePayload) -> Result<String, CoachError>;

    /// Grades the user's explanation against the ground-truth caption.
    fn generate_feedback(
        &self,
        caption: &str,
        explanation: &str,
        mode: CoachMode,
        strategy_hint: Option<&str>,
    ) -> Result<Feedback, CoachError>;
}

/// Picks the hosted client when an API credential is configured, otherwise
/// degrades to the non-network placeholder.
pub fn default_model() -> Box<dyn CoachModel> {
    match GeminiCoach::from_env() {
        Some(client) => Box::new(client),
        None => Box::new(OfflineCoach),
    }
}

pub const OFFLINE_MODEL_NAME: &str = "offline";
pub const OFFLINE_PROFILE: &str = "Offline Preview";
pub const OFFLINE_SCORE: u8 = 85;
pub const OFFLINE_MARKER: &str = "[offline preview]";

/// Non-network stand-in used when no API credential is configured. Every
/// text field carries `OFFLINE_MARKER` so a placeholder can never be
/// mistaken for a graded result.
pub struct OfflineCoach;

impl CoachModel for OfflineCoach {
    fn name(&self) -> &str {
        OFFLINE_MODEL_NAME
    }

    fn generate_caption(&self, _payload: &InlinePayload) -> Result<String, CoachError> {
        Ok(format!(
            "Offline preview: no hosted model is configured, so this caption is a local placeholder. {OFFLINE_MARKER}"
        ))
    }

    fn generate_strategy(&self, _payload: &InlinePayload) -> Result<String, CoachError> {
        Ok(format!(
            "Try describing the main subject first, then its relationship to the surroundings. {OFFLINE_MARKER}"
        ))
    }

    fn generate_feedback(
        &self,
        _caption: &str,
        explanation: &str,
        mode: CoachMode,
        strategy_hint: Option<&str>,
    ) -> Result<Feedback, CoachError> {
        let tip = match strategy_hint {
            Some(hint) => format!(
                "{OFFLINE_MARKER} You were following the strategy \"{hint}\"; a hosted model would grade adherence to it."
            ),
            None => format!(
                "{OFFLINE_MARKER} Configure GEMINI_API_KEY to receive a real, personalized tip."
            ),
        };

        Ok(Feedback {
            score: OFFLINE_SCORE,
            what_you_did_well: format!(
                "{OFFLINE_MARKER} A {mode} coach would note the explanation's overall structure here."
            ),
            areas_for_improvement: format!(
                "{OFFLINE_MARKER} Connect a hosted model for a real assessment."
            ),
            personalized_tip: tip,
            spoken_response: format!(
                "{OFFLINE_MARKER} This is a locally synthesized placeholder, not a graded result."
            ),
            communication_behavior: CommunicationBehavior {
                profile: OFFLINE_PROFILE.to_string(),
                strength: format!("{OFFLINE_MARKER} Not evaluated."),
                growth_area: format!("{OFFLINE_MARKER} Not evaluated."),
            },
            example_rewrite: ExampleRewrite {
                original: first_sentence(explanation),
                improved: format!("{OFFLINE_MARKER} No rewrite without a hosted model."),
                reasoning: format!("{OFFLINE_MARKER} Rewrites require the grading call."),
            },
        })
    }
}

fn first_sentence(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.find('.') {
        Some(idx) => trimmed[..=idx].to_string(),
        None => trimmed.to_string(),
    }
}
