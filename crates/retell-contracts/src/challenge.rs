use anyhow::Context;
use url::Url;

use crate::feedback::clamp_score;

/// "Beat this score" share link: an image reference plus a target score,
/// carried as query parameters. Decoding reconstructs the session seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeLink {
    pub image_url: String,
    pub score_to_beat: u8,
}

impl ChallengeLink {
    pub fn new(image_url: impl Into<String>, score_to_beat: u8) -> Self {
        Self {
            image_url: image_url.into(),
            score_to_beat,
        }
    }

    pub fn encode(&self, base_url: &str) -> anyhow::Result<String> {
        let mut url =
            Url::parse(base_url).with_context(|| format!("invalid share base URL ({base_url})"))?;
        url.query_pairs_mut()
            .append_pair("image", &self.image_url)
            .append_pair("score", &self.score_to_beat.to_string());
        Ok(url.to_string())
    }

    /// Returns `None` for anything that is not a well-formed challenge
    /// link; plain app URLs are expected here, not an error.
    pub fn parse(link: &str) -> Option<Self> {
        let url = Url::parse(link).ok()?;
        let mut image = None;
        let mut score = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "image" => image = Some(value.into_owned()),
                "score" => score = value.trim().parse::<i64>().ok(),
                _ => {}
            }
        }
        let image_url = image.filter(|value| !value.trim().is_empty())?;
        Some(Self {
            image_url,
            score_to_beat: clamp_score(score?),
        })
    }
}
