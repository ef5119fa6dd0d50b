//! Shared text cleanup helpers used by every parser.

/// Normalizes parser output while keeping line structure intact.
///
/// Line endings are unified to `\n`, whitespace runs inside each line
/// collapse to a single space, and blank lines are dropped. Chunk text
/// stays line-oriented so downstream consumers can still split on `\n`.
pub fn clean_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapses every whitespace run, including newlines, to a single space.
///
/// This is the flat form the processor hashes and indexes, so two chunks
/// that differ only in layout produce the same text.
pub fn normalize_flat(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates to at most `max_chars` characters, appending `...` when the
/// input was longer. Cuts on char boundaries, never mid code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
