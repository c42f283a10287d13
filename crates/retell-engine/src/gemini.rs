use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};

use retell_contracts::feedback::{parse_feedback, Feedback};
use retell_contracts::modes::CoachMode;

use crate::capture::InlinePayload;
use crate::error::{error_chain_text, truncate_text, CoachError};
use crate::model::CoachModel;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_TIMEOUT_SECS: u64 = 90;

/// Strictly descriptive. Persona or scoring language here would contaminate
/// the ground truth the grading call compares against.
const CAPTION_INSTRUCTION: &str = "Describe this image in detail. What are the main subjects, \
what are they doing, what is in the background, and what is the overall mood?";

const STRATEGY_INSTRUCTION: &str = r#"You are a master communicator and rhetoric coach. Your task is to analyze an image and provide a single, powerful, and concise strategy for explaining it effectively.

**RULES:**
1.  **DO NOT describe the image.**
2.  Focus on a **structural or narrative approach**.
3.  The strategy should be a single sentence.
4.  Frame it as a direct suggestion, starting with "Try..." or "Focus on...".

Your output must be only the strategy text, with no extra formatting or explanation."#;

/// Hosted-model client. One `generateContent` POST per operation, an
/// explicit deadline on every call, and no automatic retries: a failed call
/// surfaces to the user for resubmission.
pub struct GeminiCoach {
    api_base: String,
    model: String,
    api_key: String,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiCoach {
    /// Returns `None` when no credential is configured; callers fall back
    /// to the offline placeholder instead of failing.
    pub fn from_env() -> Option<Self> {
        Self::api_key_from_env().map(Self::new)
    }

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: env::var("GEMINI_API_BASE")
                .ok()
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            http: HttpClient::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn api_key_from_env() -> Option<String> {
        non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"))
    }

    fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn post_generate(&self, payload: &Value) -> Result<Value> {
        let endpoint = self.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.timeout)
            .json(payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        response_json_or_error(response)
    }

    fn image_part(payload: &InlinePayload) -> Value {
        json!({
            "inlineData": {
                "mimeType": payload.mime_type,
                "data": payload.data,
            }
        })
    }

    fn single_turn(parts: Vec<Value>, generation_config: Option<Map<String, Value>>) -> Value {
        let mut payload = Map::new();
        payload.insert(
            "contents".to_string(),
            Value::Array(vec![json!({
                "role": "user",
                "parts": parts,
            })]),
        );
        if let Some(config) = generation_config {
            payload.insert("generationConfig".to_string(), Value::Object(config));
        }
        Value::Object(payload)
    }

    fn extract_text(response_payload: &Value) -> Result<String> {
        let parts = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut out = String::new();
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
        }
        let text = out.trim().to_string();
        if text.is_empty() {
            bail!("Gemini response contained no text parts");
        }
        Ok(text)
    }
}

impl CoachModel for GeminiCoach {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_caption(&self, payload: &InlinePayload) -> Result<String, CoachError> {
        let request = Self::single_turn(
            vec![Self::image_part(payload), json!({ "text": CAPTION_INSTRUCTION })],
            None,
        );
        let response = self.post_generate(&request).map_err(generation_error)?;
        Self::extract_text(&response).map_err(generation_error)
    }

    fn generate_strategy(&self, payload: &InlinePayload) -> Result<String, CoachError> {
        let mut config = Map::new();
        config.insert("temperature".to_string(), json!(0.2));
        let request = Self::single_turn(
            vec![
                Self::image_part(payload),
                json!({ "text": STRATEGY_INSTRUCTION }),
            ],
            Some(config),
        );
        let response = self.post_generate(&request).map_err(generation_error)?;
        Self::extract_text(&response).map_err(generation_error)
    }

    fn generate_feedback(
        &self,
        caption: &str,
        explanation: &str,
        mode: CoachMode,
        strategy_hint: Option<&str>,
    ) -> Result<Feedback, CoachError> {
        let mut config = Map::new();
        config.insert("responseMimeType".to_string(), json!("application/json"));
        config.insert("responseSchema".to_string(), feedback_response_schema());

        let instruction = feedback_instruction(caption, explanation, mode, strategy_hint);
        let request = Self::single_turn(vec![json!({ "text": instruction })], Some(config));
        let response = self.post_generate(&request).map_err(generation_error)?;
        let text = Self::extract_text(&response).map_err(generation_error)?;
        parse_feedback(&text)
            .map_err(|err| CoachError::InvalidResponse(error_chain_text(&err, 512)))
    }
}

/// Grading instruction: tone follows `mode`, the behavior profile and the
/// rewrite stay direct, and a present strategy hint is graded for adherence.
pub(crate) fn feedback_instruction(
    caption: &str,
    explanation: &str,
    mode: CoachMode,
    strategy_hint: Option<&str>,
) -> String {
    let strategy_section = match strategy_hint {
        Some(hint) => format!(
            "\n**User's Strategic Goal:**\nThe user was given the following strategy to guide \
their explanation: \"{hint}\".\nIn your evaluation, pay special attention to how well they \
executed this specific strategy. Was their attempt successful, clumsy, or did they ignore it \
completely? Weave this observation directly into your analysis and scoring.\n"
        ),
        None => String::new(),
    };

    format!(
        r#"You are an elite communication coach with a Ph.D. in rhetoric and psychology. Your analysis is brutally accurate, insightful, and always focused on making the user a more impactful and persuasive speaker.

**Your Task:**
You will receive an AI-generated, fact-based description of an image ("The Ground Truth") and the user's explanation. Your job is to dissect the user's communication style, not just their accuracy.
{strategy_section}
**Advanced Communication Analysis Metrics:**
1.  **Tone & Style Diagnosis:** Is the user's tone confident, hesitant, humorous, clinical, poetic? Is their style narrative or analytical? How does this choice impact the listener?
2.  **Linguistic Impact:** Analyze strong verbs vs. weak/passive verbs, and sensory language vs. purely visual wording. Identify word choices that strengthen or weaken the message.
3.  **Structural Cohesion:** How do they build the mental picture for the listener? Logical flow, or a chaotic list of observations?
4.  **Coaching Mindset:** The overall score should be encouraging but fair; the Communication Profile must be direct and unflinching.

**Communication Profile (The Hard Truth):**
Direct, objective, un-sugarcoated. Use direct quotes from the user's text to support your claims: a 1-3 word profile title, their single most effective technique with a quoted example, and their single biggest weakness with a quoted example.

**The Impact Rewrite:**
Identify one key sentence from the user's explanation that could be significantly more impactful. Provide the original sentence, a rewritten version, and a brief, tactical explanation of why the rewrite is more effective.

**Personality Mode: {mode}**
Adapt your tone (except for the Communication Profile and Impact Rewrite, which are always direct and analytical): {tone}

**Input:**
- **The Ground Truth (AI Caption):** {caption}
- **The User's Explanation:** {explanation}

**Output Instructions:**
Your entire output MUST be a single, valid JSON object without any markdown or extra text.
"#,
        tone = mode.tone_directive(),
    )
}

/// Fixed response schema the grading call demands; free-form prose is
/// rejected upstream by the model and downstream by `parse_feedback`.
pub(crate) fn feedback_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "score": {
                "type": "INTEGER",
                "description": "A score out of 100. Be encouraging but fair."
            },
            "whatYouDidWell": {
                "type": "STRING",
                "description": "A specific, genuine compliment about their communication technique."
            },
            "areasForImprovement": {
                "type": "STRING",
                "description": "Constructive feedback on 1-2 key communication areas."
            },
            "personalizedTip": {
                "type": "STRING",
                "description": "A single, powerful, and actionable tip for their next attempt."
            },
            "spokenResponse": {
                "type": "STRING",
                "description": "A natural, conversational, spoken-style summary of the feedback."
            },
            "communicationBehavior": {
                "type": "OBJECT",
                "description": "The direct Communication Profile analysis.",
                "properties": {
                    "profile": {
                        "type": "STRING",
                        "description": "A 1-3 word title for their communication style."
                    },
                    "strength": {
                        "type": "STRING",
                        "description": "Their single most effective technique, with an example."
                    },
                    "growthArea": {
                        "type": "STRING",
                        "description": "Their single most important area for improvement, with a direct quote."
                    }
                },
                "required": ["profile", "strength", "growthArea"]
            },
            "exampleRewrite": {
                "type": "OBJECT",
                "description": "A before-and-after of one of the user's sentences.",
                "properties": {
                    "original": {
                        "type": "STRING",
                        "description": "The user's original sentence."
                    },
                    "improved": {
                        "type": "STRING",
                        "description": "A more impactful, rewritten version of the sentence."
                    },
                    "reasoning": {
                        "type": "STRING",
                        "description": "Why the rewritten version is more effective."
                    }
                },
                "required": ["original", "improved", "reasoning"]
            }
        },
        "required": [
            "score",
            "whatYouDidWell",
            "areasForImprovement",
            "personalizedTip",
            "spokenResponse",
            "communicationBehavior",
            "exampleRewrite"
        ]
    })
}

fn generation_error(err: anyhow::Error) -> CoachError {
    CoachError::Generation(error_chain_text(&err, 512))
}

fn response_json_or_error(response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .context("Gemini response body read failed")?;
    if !status.is_success() {
        bail!(
            "Gemini request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value =
        serde_json::from_str(&body).context("Gemini returned an invalid JSON payload")?;
    Ok(parsed)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
