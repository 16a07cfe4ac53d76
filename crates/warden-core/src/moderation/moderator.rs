use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    detectors::normalize_text,
    domain::{MessageTask, ModerationHit},
    moderation::{prompts::PromptSet, scorer::AiScorer},
    Result,
};

/// Sequential multi-prompt spam moderation.
///
/// Prompts run in their configured order and evaluation short-circuits on
/// the first score at or above the threshold, keeping latency and cost per
/// message down while behaving like an OR across detectors.
#[derive(Clone)]
pub struct AiModerator {
    scorer: AiScorer,
    prompts: Arc<PromptSet>,
    spam_threshold: f64,
}

impl AiModerator {
    pub fn new(scorer: AiScorer, prompts: Arc<PromptSet>, spam_threshold: f64) -> Self {
        Self {
            scorer,
            prompts,
            spam_threshold,
        }
    }

    fn normalize_task_text(task: &MessageTask) -> Option<String> {
        let raw = task.text.as_deref().unwrap_or_default();
        let msg = normalize_text(raw).trim().to_string();
        if msg.is_empty() {
            debug!(
                chat_id = task.chat_id.0,
                msg_id = task.message_id.0,
                "message contains no text - skipping AI moderation"
            );
            return None;
        }
        Some(msg)
    }

    /// Run prompts sequentially; return a hit for the first score at or over
    /// the threshold. No-text messages are never flagged. An unparseable
    /// score moves on to the next prompt; backend transport/format errors
    /// propagate so the processor's fail policy can decide.
    pub async fn first_score_over_threshold(
        &self,
        task: &MessageTask,
    ) -> Result<Option<ModerationHit>> {
        let Some(msg) = Self::normalize_task_text(task) else {
            return Ok(None);
        };

        for i in 0..self.prompts.len() {
            let Some(prompt) = self.prompts.build(i, &msg) else {
                continue;
            };

            let response = self.scorer.get_score(&prompt).await?;
            let Some(score) = AiScorer::extract_score(&response) else {
                let raw: String = response.chars().take(200).collect();
                warn!(
                    chat_id = task.chat_id.0,
                    msg_id = task.message_id.0,
                    prompt = i,
                    raw = %raw,
                    "AI output not parseable; continue next prompt"
                );
                continue;
            };

            debug!(
                chat_id = task.chat_id.0,
                msg_id = task.message_id.0,
                prompt = i,
                score,
                threshold = self.spam_threshold,
                "AI score"
            );

            if score >= self.spam_threshold {
                return Ok(Some(ModerationHit {
                    prompt_index: i,
                    score,
                }));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ChatId, MessageId, UserId},
        metrics::Metrics,
        testkit::ScriptedBackend,
    };

    fn task(text: Option<&str>) -> MessageTask {
        MessageTask {
            chat_id: ChatId(1),
            message_id: MessageId(1),
            user_id: UserId(1),
            text: text.map(|s| s.to_string()),
            entities: vec![],
            chat_title: None,
        }
    }

    fn moderator(backend: Arc<ScriptedBackend>, threshold: f64) -> AiModerator {
        let metrics = Arc::new(Metrics::default());
        let scorer = AiScorer::new(Some(backend), 0.2, metrics);
        AiModerator::new(
            scorer,
            Arc::new(PromptSet::new(vec!["p0".into(), "p1".into(), "p2".into()])),
            threshold,
        )
    }

    #[tokio::test]
    async fn empty_text_is_never_flagged() {
        let backend = Arc::new(ScriptedBackend::with_responses(vec!["0.9".into()]));
        let m = moderator(backend.clone(), 0.3);

        assert_eq!(m.first_score_over_threshold(&task(None)).await.unwrap(), None);
        assert_eq!(
            m.first_score_over_threshold(&task(Some("   "))).await.unwrap(),
            None
        );
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn short_circuits_on_first_hit() {
        let backend = Arc::new(ScriptedBackend::with_responses(vec![
            "0.1".into(),
            "0.8".into(),
            "0.9".into(),
        ]));
        let m = moderator(backend.clone(), 0.3);

        let hit = m
            .first_score_over_threshold(&task(Some("buy now")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.prompt_index, 1);
        assert!((hit.score - 0.8).abs() < f64::EPSILON);
        // Third prompt never evaluated.
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn unparseable_scores_continue_to_next_prompt() {
        let backend = Arc::new(ScriptedBackend::with_responses(vec![
            "I cannot comply".into(),
            "5.0".into(),
            "0.55".into(),
        ]));
        let m = moderator(backend.clone(), 0.5);

        let hit = m
            .first_score_over_threshold(&task(Some("suspicious")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.prompt_index, 2);
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn no_hit_when_all_scores_below_threshold() {
        let backend = Arc::new(ScriptedBackend::with_responses(vec![
            "0.0".into(),
            "0.1".into(),
            "0.2".into(),
        ]));
        let m = moderator(backend, 0.3);

        assert_eq!(
            m.first_score_over_threshold(&task(Some("hello"))).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn backend_errors_propagate() {
        let backend = Arc::new(ScriptedBackend::failing("connection refused"));
        let m = moderator(backend, 0.3);

        let err = m
            .first_score_over_threshold(&task(Some("hello")))
            .await
            .unwrap_err();
        assert!(err.is_ai_failure());
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let backend = Arc::new(ScriptedBackend::with_responses(vec!["0.3".into()]));
        let m = moderator(backend, 0.3);

        let hit = m
            .first_score_over_threshold(&task(Some("edge")))
            .await
            .unwrap();
        assert!(hit.is_some());
    }
}
