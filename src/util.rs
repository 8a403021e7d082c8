use regex::Regex;
use std::sync::OnceLock;

/// Truncate to at most `max_bytes` without splitting a UTF-8 character.
pub fn truncate_string(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut truncated = String::new();
    for ch in text.chars() {
        if truncated.len() + ch.len_utf8() > max_bytes {
            break;
        }
        truncated.push(ch);
    }
    truncated
}

/// Reduce an uploaded file name to a safe path segment. Anything outside
/// `[A-Za-z0-9._-]` collapses to `_`; an empty or dot-only result falls back
/// to "upload".
pub fn sanitize_file_name(name: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid pattern"));
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = pattern.replace_all(base, "_").to_string();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}
