use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::{ChatConfig, ChatId, MessageId, NewChat, UserId, UserTrustState},
    Result,
};

/// The bot's standing in a chat, as reported by the messenger.
#[derive(Clone, Copy, Debug, Default)]
pub struct BotMembership {
    pub is_owner: bool,
    pub is_admin: bool,
    pub can_delete_messages: bool,
}

impl BotMembership {
    /// Owner may always delete; an admin needs the explicit right.
    pub fn may_delete(&self) -> bool {
        self.is_owner || (self.is_admin && self.can_delete_messages)
    }
}

/// Hexagonal port for the Telegram side of moderation.
///
/// The pipeline only ever deletes messages, inspects its own membership and
/// sends plain-text admin alerts; everything else Telegram-specific stays in
/// the adapter crate.
#[async_trait]
pub trait ModerationTransport: Send + Sync {
    async fn bot_membership(&self, chat_id: ChatId) -> Result<BotMembership>;

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()>;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()>;
}

/// Hexagonal port for the AI backend.
///
/// One prompt in, free-form text out. Implementations raise
/// `Error::AiHttp` for transport problems (unreachable, non-2xx, timeout)
/// and `Error::AiResponseFormat` for unusable response bodies.
#[async_trait]
pub trait AiBackend: Send + Sync {
    async fn one_shot(&self, prompt: &str, temperature: f64) -> Result<String>;
}

/// One transactional storage session.
///
/// Every worker opens its own session per task; all mutations made through a
/// session become durable only on `commit`. `rollback` discards pending
/// changes and leaves the session usable again (the create-race recovery
/// path relies on this). Creates surface unique-constraint violations as
/// `Error::Conflict`.
#[async_trait]
pub trait StorageSession: Send {
    async fn chat_by_telegram_id(&mut self, chat_id: ChatId) -> Result<Option<ChatConfig>>;

    async fn create_chat(&mut self, new: NewChat) -> Result<ChatConfig>;

    async fn update_chat_title(&mut self, chat_ref: i64, title: &str) -> Result<()>;

    async fn user_state(&mut self, chat_ref: i64, user_id: UserId)
        -> Result<Option<UserTrustState>>;

    async fn create_user_state(
        &mut self,
        chat_ref: i64,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> Result<UserTrustState>;

    async fn increment_valid_messages(&mut self, state_id: i64) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

/// Factory handed to the anti-spam service at start; each worker iteration
/// asks it for a fresh session.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn session(&self) -> Result<Box<dyn StorageSession>>;
}
