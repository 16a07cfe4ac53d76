use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::{domain::ChatId, ports::ModerationTransport};

/// Rate-limited admin alerts about AI backend failures.
///
/// At most one alert per cooldown window regardless of call frequency; the
/// "last sent" timestamp advances only after a successful send, so a failed
/// send does not eat the window. Send failures are logged, never propagated.
pub struct RateLimitedNotifier {
    transport: Arc<dyn ModerationTransport>,
    admin_chat: ChatId,
    cooldown: Duration,
    last_sent: Mutex<Option<Instant>>,
}

impl RateLimitedNotifier {
    pub fn new(
        transport: Arc<dyn ModerationTransport>,
        admin_chat: ChatId,
        cooldown: Duration,
    ) -> Self {
        Self {
            transport,
            admin_chat,
            cooldown,
            last_sent: Mutex::new(None),
        }
    }

    pub async fn notify(&self, error_msg: &str) {
        self.notify_at(error_msg, Instant::now()).await;
    }

    /// Deterministic variant for tests.
    pub async fn notify_at(&self, error_msg: &str, now: Instant) {
        let mut last = self.last_sent.lock().await;
        if let Some(prev) = *last {
            if now.duration_since(prev) < self.cooldown {
                return;
            }
        }

        let text = format!(
            "🚨 AI Service Error Alert!\n\nError: {error_msg}\n\nAI moderation is temporarily affected."
        );

        match self.transport.send_text(self.admin_chat, &text).await {
            Ok(()) => {
                *last = Some(now);
                info!("AI error notification sent to admin");
            }
            Err(e) => {
                error!("failed to send AI error notification to admin: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::RecordingTransport;

    #[tokio::test]
    async fn sends_at_most_once_per_window() {
        let transport = Arc::new(RecordingTransport::default());
        let n = RateLimitedNotifier::new(transport.clone(), ChatId(99), Duration::from_secs(60));
        let t0 = Instant::now();

        n.notify_at("boom", t0).await;
        n.notify_at("boom again", t0 + Duration::from_secs(10)).await;
        n.notify_at("still down", t0 + Duration::from_secs(59)).await;
        assert_eq!(transport.sent_texts().len(), 1);

        n.notify_at("new window", t0 + Duration::from_secs(60)).await;
        assert_eq!(transport.sent_texts().len(), 2);
    }

    #[tokio::test]
    async fn failed_send_does_not_consume_the_window() {
        let transport = Arc::new(RecordingTransport::default());
        transport.fail_sends(true);
        let n = RateLimitedNotifier::new(transport.clone(), ChatId(99), Duration::from_secs(60));
        let t0 = Instant::now();

        n.notify_at("boom", t0).await;
        assert_eq!(transport.sent_texts().len(), 0);

        // Transport recovers inside the same window: the alert still goes out.
        transport.fail_sends(false);
        n.notify_at("boom", t0 + Duration::from_secs(1)).await;
        assert_eq!(transport.sent_texts().len(), 1);
    }

    #[tokio::test]
    async fn alert_carries_the_error_text() {
        let transport = Arc::new(RecordingTransport::default());
        let n = RateLimitedNotifier::new(transport.clone(), ChatId(7), Duration::from_secs(60));

        n.notify("HTTP 503: upstream overloaded").await;
        let sent = transport.sent_texts();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ChatId(7));
        assert!(sent[0].1.contains("HTTP 503: upstream overloaded"));
    }
}
