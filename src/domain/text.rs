//! Text helpers shared by formatting and delivery

use std::sync::OnceLock;

use regex::Regex;

fn think_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("hardcoded pattern"))
}

/// Whitespace-separated word count
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Remove `<think>...</think>` reasoning blocks, including multi-line ones,
/// and trim the result
pub fn strip_think_blocks(text: &str) -> String {
    think_block_re().replace_all(text, "").trim().to_string()
}

/// Drop a wrapping `<code>`/`</code>` pair when the model emitted one even
/// though code tags were not requested
pub fn strip_code_tags(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(inner) = trimmed
        .strip_prefix("<code>")
        .and_then(|t| t.strip_suffix("</code>"))
    {
        inner.trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Replace ё with е for users who prefer it folded
pub fn fold_yo(text: &str) -> String {
    text.replace('ё', "е").replace('Ё', "Е")
}

/// First sentence of a text, used as the caption when the transcript is sent
/// as a document
pub fn first_sentence(text: &str) -> &str {
    let trimmed = text.trim();
    for (idx, ch) in trimmed.char_indices() {
        if matches!(ch, '.' | '!' | '?') {
            return &trimmed[..idx + ch.len_utf8()];
        }
    }
    trimmed
}
