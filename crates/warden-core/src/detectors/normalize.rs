/// Invisible/zero-width code points commonly used to obfuscate spam
/// (ZWSP, ZWNJ, LRM/RLM, word joiner, BOM).
///
/// U+200D (ZWJ) is deliberately not stripped: it is load-bearing inside
/// emoji sequences, which the emoji detector walks explicitly.
fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}' | '\u{200C}' | '\u{200E}' | '\u{200F}' | '\u{2060}' | '\u{FEFF}'
    )
}

/// Remove invisible unicode before any pattern matching.
pub fn normalize_text(s: &str) -> String {
    if s.chars().any(is_invisible) {
        s.chars().filter(|c| !is_invisible(*c)).collect()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_zero_width_characters() {
        assert_eq!(normalize_text("sp\u{200B}am"), "spam");
        assert_eq!(normalize_text("\u{FEFF}hello"), "hello");
        assert_eq!(normalize_text("t\u{2060}.me"), "t.me");
    }

    #[test]
    fn keeps_zero_width_joiner_for_emoji_sequences() {
        let family = "\u{1F468}\u{200D}\u{1F469}\u{200D}\u{1F466}";
        assert_eq!(normalize_text(family), family);
    }

    #[test]
    fn leaves_plain_text_untouched() {
        assert_eq!(normalize_text("just text"), "just text");
    }
}
