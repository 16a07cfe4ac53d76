//! Telegram adapter (teloxide).
//!
//! Implements the `warden-core` moderation transport port over the Telegram
//! Bot API and ingests group messages into the anti-spam queue.

use async_trait::async_trait;

use teloxide::{prelude::*, types::ChatMemberKind};
use tokio::time::sleep;

pub mod ingest;
pub mod router;

use warden_core::{
    domain::{ChatId, MessageId},
    errors::Error,
    ports::{BotMembership, ModerationTransport},
    Result,
};

#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
    bot_user_id: teloxide::types::UserId,
}

impl TelegramTransport {
    /// Resolves the bot's own user id once up front; membership checks need
    /// it on every call.
    pub async fn new(bot: Bot) -> Result<Self> {
        let me = bot.get_me().await.map_err(Self::map_err)?;
        Ok(Self {
            bot,
            bot_user_id: me.id,
        })
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Telegram(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl ModerationTransport for TelegramTransport {
    async fn bot_membership(&self, chat_id: ChatId) -> Result<BotMembership> {
        let member = self
            .with_retry(|| {
                self.bot
                    .get_chat_member(Self::tg_chat(chat_id), self.bot_user_id)
            })
            .await?;

        Ok(match member.kind {
            ChatMemberKind::Owner(_) => BotMembership {
                is_owner: true,
                is_admin: true,
                can_delete_messages: true,
            },
            ChatMemberKind::Administrator(admin) => BotMembership {
                is_owner: false,
                is_admin: true,
                can_delete_messages: admin.can_delete_messages,
            },
            _ => BotMembership::default(),
        })
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        self.with_retry(|| {
            self.bot.delete_message(
                Self::tg_chat(chat_id),
                teloxide::types::MessageId(message_id.0),
            )
        })
        .await?;
        Ok(())
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), text.to_string()))
            .await?;
        Ok(())
    }
}
