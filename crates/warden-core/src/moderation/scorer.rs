use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::{metrics::Metrics, ports::AiBackend, Result};

/// First numeric token anywhere in the response.
static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(\.\d+)?").expect("number regex"));

/// Obtains raw score text from the AI backend and parses it into a bounded
/// spam score.
///
/// LLM output is untrusted free text: the parser is permissive about
/// surrounding prose but strict about the `[0.0, 1.0]` range contract, so a
/// malformed or adversarial response is never silently treated as an extreme
/// score.
#[derive(Clone)]
pub struct AiScorer {
    backend: Option<Arc<dyn AiBackend>>,
    temperature: f64,
    metrics: Arc<Metrics>,
}

impl AiScorer {
    pub fn new(
        backend: Option<Arc<dyn AiBackend>>,
        temperature: f64,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            backend,
            temperature,
            metrics,
        }
    }

    /// Raw score text for one prompt.
    ///
    /// With no backend configured every check passes with a literal "0.0"
    /// (fail-open); transport/format errors from a real backend propagate to
    /// the caller's fail policy.
    pub async fn get_score(&self, prompt: &str) -> Result<String> {
        let Some(backend) = &self.backend else {
            warn!("( ! ) AI backend not configured - AI check will always pass with score 0.0 ( ! )");
            return Ok("0.0".to_string());
        };

        let response = backend.one_shot(prompt, self.temperature).await?;
        self.metrics.incr_ai_requests();
        Ok(response)
    }

    /// Extract a numeric score from AI output. Accepts only values already
    /// in `[0.0, 1.0]`; out-of-range values are rejected, not clamped.
    pub fn extract_score(response: &str) -> Option<f64> {
        let s = response.trim();

        // Fast path: the whole string is the number.
        if let Ok(v) = s.parse::<f64>() {
            if (0.0..=1.0).contains(&v) {
                return Some(v);
            }
        }

        // Fallback: first numeric token, range-validated.
        let m = NUMBER_RE.find(s)?;
        let v = m.as_str().parse::<f64>().ok()?;
        if (0.0..=1.0).contains(&v) {
            Some(v)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_string_scores_parse() {
        assert_eq!(AiScorer::extract_score("0.75"), Some(0.75));
        assert_eq!(AiScorer::extract_score(" 0.0 "), Some(0.0));
        assert_eq!(AiScorer::extract_score("1.0"), Some(1.0));
        assert_eq!(AiScorer::extract_score("1"), Some(1.0));
    }

    #[test]
    fn out_of_range_is_rejected_not_clamped() {
        assert_eq!(AiScorer::extract_score("1.5"), None);
        assert_eq!(AiScorer::extract_score("-0.1"), None);
        assert_eq!(AiScorer::extract_score("100"), None);
    }

    #[test]
    fn number_is_found_inside_prose() {
        assert_eq!(
            AiScorer::extract_score("The score is 0.6, which indicates spam"),
            Some(0.6)
        );
        assert_eq!(AiScorer::extract_score("score: 0.9."), Some(0.9));
    }

    #[test]
    fn garbage_yields_none() {
        assert_eq!(AiScorer::extract_score(""), None);
        assert_eq!(AiScorer::extract_score("no numbers here"), None);
        assert_eq!(AiScorer::extract_score("NaN"), None);
    }

    #[test]
    fn first_token_wins_even_if_out_of_range() {
        // The first numeric token is -3; it fails the range check and the
        // parser does not keep scanning.
        assert_eq!(AiScorer::extract_score("-3 but maybe 0.4"), None);
    }

    #[tokio::test]
    async fn missing_backend_fails_open_with_zero() {
        let scorer = AiScorer::new(None, 0.2, Arc::new(Metrics::default()));
        assert_eq!(scorer.get_score("prompt").await.unwrap(), "0.0");
    }
}
