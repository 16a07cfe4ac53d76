use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide moderation counters.
///
/// Shared by injection (`Arc<Metrics>`) rather than as ambient global state;
/// the service lifecycle owns the instance and hands it to the components
/// that report events.
#[derive(Debug, Default)]
pub struct Metrics {
    messages_processed: AtomicU64,
    spam_blocked: AtomicU64,
    ai_requests: AtomicU64,
    processing_errors: AtomicU64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_processed: u64,
    pub spam_blocked: u64,
    pub ai_requests: u64,
    pub processing_errors: u64,
}

impl Metrics {
    pub fn incr_messages_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_spam_blocked(&self) {
        self.spam_blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_ai_requests(&self) {
        self.ai_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_processing_errors(&self) {
        self.processing_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            spam_blocked: self.spam_blocked.load(Ordering::Relaxed),
            ai_requests: self.ai_requests.load(Ordering::Relaxed),
            processing_errors: self.processing_errors.load(Ordering::Relaxed),
        }
    }
}
