use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    detectors::normalize::normalize_text,
    domain::{EntityKind, MessageTask},
};

/// Telegram usernames: letters/digits/underscore, 5..32 chars. Word
/// boundaries are checked manually since the regex crate has no lookaround.
static HANDLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@[A-Za-z0-9_]{5,32}").expect("handle regex"));

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// True if the message contains a user mention, either as a typed entity or
/// as an `@handle` in the normalized text.
pub fn has_mentions(task: &MessageTask) -> bool {
    // Entity-based detection (best when present).
    if task
        .entities
        .iter()
        .any(|e| e.kind == EntityKind::Mention)
    {
        return true;
    }

    // Text fallback (works even if entities are missing).
    let raw = task.text.as_deref().unwrap_or_default();
    let text = normalize_text(raw);

    for m in HANDLE_RE.find_iter(&text) {
        // Not embedded in a longer word on either side: "a@bcdef" and
        // "@toolong…x" (where the 32-char cap split a longer run) both fail.
        let before_ok = !text[..m.start()].chars().next_back().map_or(false, is_word_char);
        let after_ok = !text[m.end()..].chars().next().map_or(false, is_word_char);
        if before_ok && after_ok {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, MessageEntity, MessageId, UserId};

    fn task(text: &str, entities: Vec<MessageEntity>) -> MessageTask {
        MessageTask {
            chat_id: ChatId(1),
            message_id: MessageId(1),
            user_id: UserId(1),
            text: Some(text.to_string()),
            entities,
            chat_title: None,
        }
    }

    #[test]
    fn detects_mention_entity() {
        let t = task("hi there", vec![MessageEntity::new(EntityKind::Mention, 0, 2)]);
        assert!(has_mentions(&t));
    }

    #[test]
    fn detects_handle_in_text() {
        assert!(has_mentions(&task("ping @someuser now", vec![])));
        assert!(has_mentions(&task("@some_user", vec![])));
    }

    #[test]
    fn ignores_short_and_embedded_handles() {
        assert!(!has_mentions(&task("a@bcdef is an email-ish thing", vec![])));
        assert!(!has_mentions(&task("@abc is too short", vec![])));
        assert!(!has_mentions(&task("no handles here", vec![])));
    }

    #[test]
    fn sees_through_zero_width_obfuscation() {
        assert!(has_mentions(&task("@so\u{200B}meuser", vec![])));
    }
}
