//! Contextual evidence scoring from an image's surrounding page.
//!
//! Images published by generation services rarely arrive alone: their URLs
//! and embedding pages mention the generator. This module scores that
//! context with an explicit, enumerable rule table — each indicator is a
//! (pattern, weight) pair, every triggered indicator adds its fixed weight,
//! and the sum is clamped to 1.0. The scorer is pure, side-effect-free, and
//! order-insensitive; absent inputs contribute zero.

use crate::image_io::DATA_IMAGE_PREFIX;
use authentrace_core::{AuthentraceError, Result};
use regex::Regex;
use serde::Serialize;

/// Weight added per generator keyword found in the URL.
pub const URL_KEYWORD_WEIGHT: f64 = 0.15;

/// Weight added when the URL is an inline base64-encoded image.
pub const INLINE_IMAGE_WEIGHT: f64 = 0.20;

/// Weight added per generator keyword found in the URL's filename segment.
pub const FILENAME_KEYWORD_WEIGHT: f64 = 0.15;

/// Weight added per generation phrase found in the page text.
pub const PHRASE_WEIGHT: f64 = 0.20;

/// Weight added when the page text contains a prompt marker (`prompt:`).
pub const PROMPT_PATTERN_WEIGHT: f64 = 0.20;

/// Generator keywords matched as substrings of the lowercased URL and of its
/// filename segment.
pub const GENERATOR_KEYWORDS: [&str; 8] = [
    "midjourney",
    "stable",
    "diffusion",
    "dalle",
    "openai",
    "ai",
    "generated",
    "huggingface",
];

/// Generation phrases matched as substrings of the lowercased page text.
pub const GENERATION_PHRASES: [&str; 6] = [
    "ai generated",
    "stable diffusion",
    "midjourney prompt",
    "created using ai",
    "generated artwork",
    "diffusion model",
];

/// One triggered indicator: which rule fired and the weight it contributed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorHit {
    /// Rule identifier, e.g. `url_keyword:midjourney`.
    pub name: String,
    /// Weight the rule added to the score.
    pub weight: f64,
}

/// The full evidence record for one evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct ContextEvidence {
    /// Every indicator that fired, in rule-table order.
    pub hits: Vec<IndicatorHit>,
    /// Sum of triggered weights, clamped to `[0, 1]`.
    pub score: f64,
}

/// Contextual evidence scorer with its rule table compiled once.
pub struct ContextScorer {
    prompt_pattern: Regex,
}

impl ContextScorer {
    /// Create a scorer, compiling the prompt-marker pattern.
    ///
    /// # Errors
    ///
    /// Returns [`AuthentraceError::Config`] if the pattern fails to compile.
    pub fn new() -> Result<Self> {
        let prompt_pattern = Regex::new(r"(?i)prompt\s*:").map_err(|e| {
            AuthentraceError::Config(format!("failed to compile prompt pattern: {e}"))
        })?;
        Ok(Self { prompt_pattern })
    }

    /// Evaluate URL and page-text context, returning the triggered
    /// indicators and the clamped score.
    #[must_use]
    pub fn evaluate(&self, image_url: Option<&str>, page_text: Option<&str>) -> ContextEvidence {
        let mut hits = Vec::new();

        if let Some(url) = image_url {
            let url = url.to_lowercase();

            for keyword in GENERATOR_KEYWORDS {
                if url.contains(keyword) {
                    hits.push(IndicatorHit {
                        name: format!("url_keyword:{keyword}"),
                        weight: URL_KEYWORD_WEIGHT,
                    });
                }
            }

            if url.starts_with(DATA_IMAGE_PREFIX) {
                hits.push(IndicatorHit {
                    name: "inline_data_url".to_string(),
                    weight: INLINE_IMAGE_WEIGHT,
                });
            }

            let filename = url.rsplit('/').next().unwrap_or(&url);
            for keyword in GENERATOR_KEYWORDS {
                if filename.contains(keyword) {
                    hits.push(IndicatorHit {
                        name: format!("filename_keyword:{keyword}"),
                        weight: FILENAME_KEYWORD_WEIGHT,
                    });
                }
            }
        }

        if let Some(text) = page_text {
            let text_lower = text.to_lowercase();

            for phrase in GENERATION_PHRASES {
                if text_lower.contains(phrase) {
                    hits.push(IndicatorHit {
                        name: format!("context_phrase:{phrase}"),
                        weight: PHRASE_WEIGHT,
                    });
                }
            }

            if self.prompt_pattern.is_match(text) {
                hits.push(IndicatorHit {
                    name: "prompt_pattern".to_string(),
                    weight: PROMPT_PATTERN_WEIGHT,
                });
            }
        }

        let score = hits.iter().map(|h| h.weight).sum::<f64>().min(1.0);
        ContextEvidence { hits, score }
    }

    /// Scalar convenience wrapper around [`evaluate`].
    ///
    /// [`evaluate`]: ContextScorer::evaluate
    #[must_use]
    pub fn score(&self, image_url: Option<&str>, page_text: Option<&str>) -> f64 {
        self.evaluate(image_url, page_text).score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> ContextScorer {
        ContextScorer::new().unwrap()
    }

    #[test]
    fn test_absent_inputs_score_zero() {
        let evidence = scorer().evaluate(None, None);
        assert!(evidence.hits.is_empty());
        assert_eq!(evidence.score, 0.0);
    }

    #[test]
    fn test_clean_inputs_score_zero() {
        let score = scorer().score(
            Some("https://example.com/photos/IMG_2041.jpg"),
            Some("Holiday pictures from last summer."),
        );
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_midjourney_filename_scores_both_url_and_filename_rules() {
        let evidence = scorer().evaluate(Some("https://cdn.example.com/midjourney.png"), None);
        // The keyword matches the full URL and the filename segment.
        assert!(evidence.score >= 0.15);
        assert!((evidence.score - 0.30).abs() < 1e-12);
        assert!(evidence
            .hits
            .iter()
            .any(|h| h.name == "url_keyword:midjourney"));
        assert!(evidence
            .hits
            .iter()
            .any(|h| h.name == "filename_keyword:midjourney"));
    }

    #[test]
    fn test_keyword_only_in_host_skips_filename_rule() {
        let evidence = scorer().evaluate(Some("https://midjourney.example.com/photo.png"), None);
        let filename_hits = evidence
            .hits
            .iter()
            .filter(|h| h.name.starts_with("filename_keyword:"))
            .count();
        assert_eq!(filename_hits, 0);
        assert!((evidence.score - URL_KEYWORD_WEIGHT).abs() < 1e-12);
    }

    #[test]
    fn test_inline_data_url_marker() {
        let evidence = scorer().evaluate(Some("data:image/png;base64,iVBORw0KGgo="), None);
        assert!(evidence.hits.iter().any(|h| h.name == "inline_data_url"));
        assert!(evidence.score >= INLINE_IMAGE_WEIGHT);
    }

    #[test]
    fn test_prompt_marker_in_page_text() {
        let score = scorer().score(None, Some("Prompt: a castle in the clouds"));
        assert!(score >= 0.20);
    }

    #[test]
    fn test_prompt_marker_allows_whitespace_before_colon() {
        let score = scorer().score(None, Some("prompt  : moody forest"));
        assert!(score >= PROMPT_PATTERN_WEIGHT);
    }

    #[test]
    fn test_phrases_accumulate() {
        let text = "This AI generated artwork was made with a diffusion model.";
        let evidence = scorer().evaluate(None, Some(text));
        // "ai generated" + "generated artwork" + "diffusion model"
        assert_eq!(evidence.hits.len(), 3);
        assert!((evidence.score - 0.60).abs() < 1e-12);
    }

    #[test]
    fn test_maximal_matches_clamp_to_one() {
        let url = "data:image/png;base64,midjourney-stable-diffusion-dalle-openai-ai-generated-huggingface";
        let text = "AI generated. Stable Diffusion. Midjourney prompt. Created using AI. \
                    Generated artwork. Diffusion model. Prompt: everything";
        let evidence = scorer().evaluate(Some(url), Some(text));
        assert_eq!(evidence.score, 1.0);
        assert!(evidence.hits.len() > 8);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let score = scorer().score(Some("https://x.com/MidJourney/Art.PNG"), None);
        assert!(score > 0.0);
    }

    #[test]
    fn test_evaluation_is_order_insensitive_across_inputs() {
        let s = scorer();
        let url_only = s.score(Some("https://x.com/dalle.png"), None);
        let text_only = s.score(None, Some("created using ai"));
        let both = s.score(Some("https://x.com/dalle.png"), Some("created using ai"));
        assert!((both - (url_only + text_only)).abs() < 1e-12);
    }
}
