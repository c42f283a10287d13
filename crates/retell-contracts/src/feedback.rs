use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

/// The direct, un-sugarcoated communication-profile section. Its tone is
/// never softened by the selected coach mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationBehavior {
    pub profile: String,
    pub strength: String,
    pub growth_area: String,
}

/// Before/after rewording of one sentence from the user's explanation,
/// with a tactical rationale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleRewrite {
    pub original: String,
    pub improved: String,
    pub reasoning: String,
}

/// Canonical structured grading result. Produced once per submission,
/// replaces any prior result, never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub score: u8,
    pub what_you_did_well: String,
    pub areas_for_improvement: String,
    pub personalized_tip: String,
    pub spoken_response: String,
    pub communication_behavior: CommunicationBehavior,
    pub example_rewrite: ExampleRewrite,
}

/// Wire shape as the model returns it. The score arrives unvalidated and an
/// older flat shape carried it under `overall_score`; both are migrated here
/// so only the canonical `Feedback` ever leaves this module.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFeedback {
    score: Option<i64>,
    #[serde(rename = "overall_score")]
    overall_score: Option<i64>,
    what_you_did_well: String,
    areas_for_improvement: String,
    personalized_tip: String,
    spoken_response: String,
    communication_behavior: CommunicationBehavior,
    example_rewrite: ExampleRewrite,
}

/// The model is not trusted to keep scores in range; out-of-range and
/// negative values are clamped rather than rejected.
pub fn clamp_score(score: i64) -> u8 {
    score.clamp(0, 100) as u8
}

/// Parses a raw model response into the canonical `Feedback` shape.
///
/// Accepts the bare JSON object the schema demands, tolerating a markdown
/// code fence around it. Anything else fails; parse failures are never
/// retried.
pub fn parse_feedback(raw: &str) -> anyhow::Result<Feedback> {
    let text = strip_code_fence(raw);
    let parsed: RawFeedback =
        serde_json::from_str(text).context("feedback payload does not match the grading schema")?;
    let score = match parsed.score.or(parsed.overall_score) {
        Some(score) => score,
        None => bail!("feedback payload is missing a score"),
    };

    let feedback = Feedback {
        score: clamp_score(score),
        what_you_did_well: parsed.what_you_did_well,
        areas_for_improvement: parsed.areas_for_improvement,
        personalized_tip: parsed.personalized_tip,
        spoken_response: parsed.spoken_response,
        communication_behavior: parsed.communication_behavior,
        example_rewrite: parsed.example_rewrite,
    };

    ensure_non_empty("whatYouDidWell", &feedback.what_you_did_well)?;
    ensure_non_empty("areasForImprovement", &feedback.areas_for_improvement)?;
    ensure_non_empty("personalizedTip", &feedback.personalized_tip)?;
    ensure_non_empty("spokenResponse", &feedback.spoken_response)?;
    ensure_non_empty(
        "communicationBehavior.profile",
        &feedback.communication_behavior.profile,
    )?;
    ensure_non_empty(
        "communicationBehavior.strength",
        &feedback.communication_behavior.strength,
    )?;
    ensure_non_empty(
        "communicationBehavior.growthArea",
        &feedback.communication_behavior.growth_area,
    )?;
    ensure_non_empty("exampleRewrite.original", &feedback.example_rewrite.original)?;
    ensure_non_empty("exampleRewrite.improved", &feedback.example_rewrite.improved)?;
    ensure_non_empty(
        "exampleRewrite.reasoning",
        &feedback.example_rewrite.reasoning,
    )?;

    Ok(feedback)
}

fn ensure_non_empty(field: &str, value: &str) -> anyhow::Result<()> {
    if value.trim().is_empty() {
        bail!("feedback field '{field}' is empty");
    }
    Ok(())
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    match inner.trim().strip_suffix("```") {
        Some(body) => body.trim(),
        None => inner.trim(),
    }
}
