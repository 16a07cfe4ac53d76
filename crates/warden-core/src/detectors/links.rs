use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    detectors::{
        domains::extract_domains_from_text, entity_text, normalize::normalize_text,
    },
    domain::{ChatConfig, EntityKind, MessageTask},
};

/// Cheap URL-ish probe for the conservative fallback.
static URLISH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[a-z][a-z0-9+.\-]*://|www\.|t\.me/").expect("urlish regex"));

/// True if the message links anywhere outside the chat's domain whitelist.
///
/// Domains are gathered from `Url`/`TextLink` entities and from a scan of
/// the normalized text; the union must be a subset of the whitelist for the
/// message to pass. A URL-ish substring that yields no extractable domain is
/// treated conservatively as a link. No chat context means an empty
/// whitelist, so any detected domain triggers.
pub fn has_links(task: &MessageTask, chat: Option<&ChatConfig>) -> bool {
    static EMPTY: Lazy<BTreeSet<String>> = Lazy::new(BTreeSet::new);
    let whitelist = chat.map(|c| &c.allowed_domains).unwrap_or(&EMPTY);

    let raw = task.text.as_deref().unwrap_or_default();
    let text = normalize_text(raw).to_lowercase();

    let mut domains: BTreeSet<String> = BTreeSet::new();
    let mut urlish_seen = false;

    for e in &task.entities {
        match e.kind {
            EntityKind::Url => {
                urlish_seen = true;
                if let Some(span) = entity_text(&text, e.offset, e.length) {
                    domains.extend(extract_domains_from_text(&span));
                }
            }
            EntityKind::TextLink => {
                urlish_seen = true;
                if let Some(url) = &e.url {
                    domains.extend(extract_domains_from_text(url));
                }
            }
            _ => {}
        }
    }

    if URLISH_RE.is_match(&text) {
        urlish_seen = true;
    }
    domains.extend(extract_domains_from_text(&text));

    if !domains.is_empty() {
        return !domains.is_subset(whitelist);
    }

    // URL-like but nothing extractable: treat as a link rather than let an
    // obfuscated URL through.
    urlish_seen
}
