use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// Kind of a rich-text entity attached to a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Mention,
    Url,
    TextLink,
    CustomEmoji,
    Other,
}

/// One concrete entity shape at the ingestion boundary.
///
/// Offsets and lengths are UTF-16 code units, as delivered by Telegram.
/// `url` is set for `TextLink` entities only.
#[derive(Clone, Debug)]
pub struct MessageEntity {
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
    pub url: Option<String>,
}

impl MessageEntity {
    pub fn new(kind: EntityKind, offset: usize, length: usize) -> Self {
        Self {
            kind,
            offset,
            length,
            url: None,
        }
    }

    pub fn text_link(offset: usize, length: usize, url: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::TextLink,
            offset,
            length,
            url: Some(url.into()),
        }
    }
}

/// Transient value object for one inbound message, immutable once built.
///
/// Flows end-to-end through the queue and the message processor.
#[derive(Clone, Debug)]
pub struct MessageTask {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub text: Option<String>,
    pub entities: Vec<MessageEntity>,
    pub chat_title: Option<String>,
}

impl MessageTask {
    pub fn dedupe_key(&self) -> (i64, i32) {
        (self.chat_id.0, self.message_id.0)
    }
}

/// Per-chat moderation configuration, owned by durable storage.
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// Surrogate id (storage primary key).
    pub id: i64,
    pub chat_id: ChatId,
    pub title: Option<String>,
    pub is_active: bool,
    pub ai_check_enabled: bool,
    pub cleanup_mentions: bool,
    pub cleanup_links: bool,
    pub cleanup_emojis: bool,
    /// Normalized domains allowed to appear in links.
    pub allowed_domains: BTreeSet<String>,
    pub invite_link: Option<String>,
}

/// Defaults for a chat created lazily on first observed message.
///
/// New chats start inactive; AI follows the global flag at creation time.
#[derive(Clone, Debug)]
pub struct NewChat {
    pub chat_id: ChatId,
    pub title: Option<String>,
    pub ai_check_enabled: bool,
}

/// Per-(chat, user) trust record.
#[derive(Clone, Debug)]
pub struct UserTrustState {
    pub id: i64,
    /// Surrogate id of the owning chat.
    pub chat_ref: i64,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    pub valid_messages: i64,
}

impl UserTrustState {
    /// Both thresholds are inclusive: a user exactly at the membership-time
    /// and valid-message minimums is trusted.
    pub fn is_trusted(
        &self,
        now: DateTime<Utc>,
        min_seconds_in_chat: u64,
        min_valid_messages: i64,
    ) -> bool {
        let elapsed = (now - self.joined_at).num_seconds();
        elapsed >= min_seconds_in_chat as i64 && self.valid_messages >= min_valid_messages
    }
}

/// A spam detection produced by the AI moderator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModerationHit {
    /// Index of the prompt that triggered.
    pub prompt_index: usize,
    /// Score in `[0.0, 1.0]` that crossed the threshold.
    pub score: f64,
}

/// Keep/delete decision for one processed message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Kept,
    Deleted,
}
