use thiserror::Error;

/// Pipeline error taxonomy. Every kind except `Validation` moves the state
/// machine to `RunState::Error`; none is retried automatically, and none is
/// fatal to the process.
#[derive(Debug, Error)]
pub enum CoachError {
    /// Recovered locally: no state transition, no network call.
    #[error("{0}")]
    Validation(String),

    /// The bitmap reference was unset or the image had not finished loading.
    #[error("image capture failed: {0}")]
    Capture(String),

    /// Transport or remote failure on a generation call.
    #[error("generation request failed: {0}")]
    Generation(String),

    /// The service returned a result that does not match the grading schema.
    #[error("the service returned an unusable result: {0}")]
    InvalidResponse(String),
}

impl CoachError {
    pub fn is_validation(&self) -> bool {
        matches!(self, CoachError::Validation(_))
    }
}

/// Flattens an `anyhow` context chain into one line for the typed variants
/// and the user-facing error message.
pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::{error_chain_text, truncate_text, CoachError};

    #[test]
    fn chain_text_joins_distinct_causes() {
        let err = anyhow::anyhow!("socket closed")
            .context("Gemini request failed (https://example)")
            .context("caption call failed");
        let text = error_chain_text(&err, 512);
        assert!(text.starts_with("caption call failed"));
        assert!(text.contains("caused by: socket closed"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_text("héllo", 3), "hél…");
        assert_eq!(truncate_text("ok", 10), "ok");
    }

    #[test]
    fn invalid_response_message_names_the_unusable_result() {
        let err = CoachError::InvalidResponse("missing score".to_string());
        assert_eq!(
            err.to_string(),
            "the service returned an unusable result: missing score"
        );
        assert!(!err.is_validation());
    }
}
