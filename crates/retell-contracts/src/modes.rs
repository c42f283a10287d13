use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Named tone preset applied to feedback phrasing only, never to scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoachMode {
    Teacher,
    Debater,
    Storyteller,
}

impl CoachMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoachMode::Teacher => "Teacher",
            CoachMode::Debater => "Debater",
            CoachMode::Storyteller => "Storyteller",
        }
    }

    /// Tone directive woven into the grading instruction. The behavior
    /// profile and rewrite sections stay direct regardless of mode.
    pub fn tone_directive(&self) -> &'static str {
        match self {
            CoachMode::Teacher => "Patient, encouraging, structured.",
            CoachMode::Debater => "Sharp, logical, and questioning.",
            CoachMode::Storyteller => "Imaginative and creative.",
        }
    }
}

impl fmt::Display for CoachMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoachMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "teacher" => Ok(CoachMode::Teacher),
            "debater" => Ok(CoachMode::Debater),
            "storyteller" => Ok(CoachMode::Storyteller),
            other => Err(format!(
                "unknown coach mode '{other}' (expected teacher, debater, or storyteller)"
            )),
        }
    }
}
