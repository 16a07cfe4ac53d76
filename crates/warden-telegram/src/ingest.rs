//! Conversion of teloxide updates into the core's `MessageTask` shape.
//!
//! Entities collapse into one tagged struct at this boundary, so the core
//! never deals with Telegram's own entity representation.

use teloxide::types::{Message, MessageEntity as TgEntity, MessageEntityKind};

use warden_core::domain::{ChatId, EntityKind, MessageEntity, MessageId, MessageTask, UserId};

fn map_entity(e: &TgEntity) -> MessageEntity {
    let (kind, url) = match &e.kind {
        MessageEntityKind::Mention => (EntityKind::Mention, None),
        MessageEntityKind::Url => (EntityKind::Url, None),
        MessageEntityKind::TextLink { url } => (EntityKind::TextLink, Some(url.to_string())),
        MessageEntityKind::CustomEmoji { .. } => (EntityKind::CustomEmoji, None),
        _ => (EntityKind::Other, None),
    };

    MessageEntity {
        kind,
        offset: e.offset,
        length: e.length,
        url,
    }
}

/// Build a task from a group message. `None` when there is nothing to
/// moderate: not a group chat, or no identifiable sender (service messages,
/// channel posts).
pub fn message_task_from(msg: &Message) -> Option<MessageTask> {
    if !(msg.chat.is_group() || msg.chat.is_supergroup()) {
        return None;
    }
    let from = msg.from()?;

    let text = msg
        .text()
        .or_else(|| msg.caption())
        .map(|s| s.to_string());
    let entities = msg
        .entities()
        .or_else(|| msg.caption_entities())
        .map(|es| es.iter().map(map_entity).collect())
        .unwrap_or_default();

    Some(MessageTask {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
        user_id: UserId(from.id.0 as i64),
        text,
        entities,
        chat_title: msg.chat.title().map(|s| s.to_string()),
    })
}
