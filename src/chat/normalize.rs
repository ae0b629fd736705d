// src/chat/normalize.rs
// Text normalization shared by ingestion and search filter resolution.

use regex::Regex;
use std::sync::LazyLock;

static USER_MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<@([UW][A-Z0-9]+)>").unwrap());
static CHANNEL_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<#([CG][A-Z0-9]+)\|([^>]+)>").unwrap());
static WRAPPED_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(https?://[^|>]+)\|([^>]+)>").unwrap());
static BARE_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<(https?://[^>]+)>").unwrap());
static CONTROL_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F]").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());

/// Cleans platform markup out of a raw message body. Mentions are resolved
/// to a readable form even without a user/channel lookup (the raw id is
/// kept if no friendlier form is encoded in the markup itself); URLs with a
/// link-text pair are unwrapped to the text; bare URLs are kept verbatim.
pub fn normalize_text(raw: &str) -> String {
    let mut text = raw.to_string();

    text = USER_MENTION.replace_all(&text, "@$1").to_string();
    text = CHANNEL_MENTION.replace_all(&text, "#$2").to_string();
    text = WRAPPED_LINK.replace_all(&text, "$2").to_string();
    text = BARE_LINK.replace_all(&text, "$1").to_string();
    text = CONTROL_CHARS.replace_all(&text, "").to_string();
    text = WHITESPACE.replace_all(&text, " ").to_string();

    text.trim().to_string()
}
