use crate::{
    detectors::normalize::normalize_text,
    domain::{EntityKind, MessageTask},
};

fn is_regional_indicator(c: char) -> bool {
    ('\u{1F1E6}'..='\u{1F1FF}').contains(&c)
}

fn is_skin_tone(c: char) -> bool {
    ('\u{1F3FB}'..='\u{1F3FF}').contains(&c)
}

fn is_vs16(c: char) -> bool {
    c == '\u{FE0F}'
}

fn is_zwj(c: char) -> bool {
    c == '\u{200D}'
}

/// Codepoint-range heuristic over the standard pictographic blocks.
fn is_base_emoji(c: char) -> bool {
    matches!(
        c,
        '\u{1F300}'..='\u{1F5FF}'
            | '\u{1F600}'..='\u{1F64F}'
            | '\u{1F680}'..='\u{1F6FF}'
            | '\u{1F700}'..='\u{1F77F}'
            | '\u{1F780}'..='\u{1F7FF}'
            | '\u{1F800}'..='\u{1F8FF}'
            | '\u{1F900}'..='\u{1F9FF}'
            | '\u{1FA70}'..='\u{1FAFF}'
            | '\u{2600}'..='\u{27BF}'
    )
}

/// Count emojis in a message, including Telegram custom-emoji entities.
///
/// Sequences collapse: base + VS16/skin-tone modifiers is one emoji, a ZWJ
/// chain is one emoji, and a pair of regional indicators is one flag.
pub fn count_emojis(task: &MessageTask) -> usize {
    // Telegram Premium/custom emojis (entity-based).
    let custom = task
        .entities
        .iter()
        .filter(|e| e.kind == EntityKind::CustomEmoji)
        .count();

    let text = normalize_text(task.text.as_deref().unwrap_or_default());
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();

    let mut unicode_count = 0usize;
    let mut i = 0usize;

    while i < n {
        let c = chars[i];

        // Flags: two regional indicators count as one emoji.
        if is_regional_indicator(c) {
            unicode_count += 1;
            if i + 1 < n && is_regional_indicator(chars[i + 1]) {
                i += 2;
            } else {
                // Lone RI is still emoji-ish.
                i += 1;
            }
            continue;
        }

        // Sequences start on a base emoji only.
        if !is_base_emoji(c) {
            i += 1;
            continue;
        }

        unicode_count += 1;
        i += 1;

        // Optional VS16 + skin tone.
        if i < n && is_vs16(chars[i]) {
            i += 1;
        }
        if i < n && is_skin_tone(chars[i]) {
            i += 1;
        }

        // ZWJ continuations: (ZWJ + base + [VS16] + [skin]) repeated.
        while i < n && is_zwj(chars[i]) {
            i += 1;
            if i >= n || !is_base_emoji(chars[i]) {
                break;
            }
            i += 1;
            if i < n && is_vs16(chars[i]) {
                i += 1;
            }
            if i < n && is_skin_tone(chars[i]) {
                i += 1;
            }
        }
    }

    custom + unicode_count
}

/// True if the message carries more emojis than the configured maximum.
pub fn has_excessive_emojis(task: &MessageTask, max_emojis: usize) -> bool {
    count_emojis(task) > max_emojis
}
