//! Rule-based spam detectors.
//!
//! Each detector is a pure function over a task (plus optional chat config);
//! the cascade runs before any AI call and any hit short-circuits straight
//! to deletion.

pub mod domains;
pub mod emoji;
pub mod links;
pub mod mentions;
pub mod normalize;

pub use emoji::{count_emojis, has_excessive_emojis};
pub use links::has_links;
pub use mentions::has_mentions;
pub use normalize::normalize_text;

/// Slice `text` by a Telegram entity span (UTF-16 code-unit offsets).
pub(crate) fn entity_text(text: &str, offset: usize, length: usize) -> Option<String> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let end = offset.checked_add(length)?;
    if end > units.len() {
        return None;
    }
    Some(String::from_utf16_lossy(&units[offset..end]))
}
