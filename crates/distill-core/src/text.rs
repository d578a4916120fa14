//! Small text helpers shared by extraction, phrasing and validation.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();

    /// Sentence terminators. Runs of punctuation count as one boundary.
    static ref SENTENCE_BOUNDARY: Regex = Regex::new(r"[.!?]+").unwrap();
}

/// Characters stripped from the end of a clause before it is embedded in a sentence.
const TRAILING_CHARS: &[char] = &[' ', '.', ';', ':', ',', '!', '?', '"', '\''];

/// Count whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split text into trimmed, non-empty sentences.
pub fn sentences(text: &str) -> Vec<&str> {
    SENTENCE_BOUNDARY
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Normalize a clause for embedding: collapsed whitespace, no trailing punctuation.
pub fn normalize_clause(text: &str) -> String {
    normalize_whitespace(text)
        .trim_end_matches(TRAILING_CHARS)
        .to_string()
}

/// Keep at most `max_words` words.
pub fn limit_words(text: &str, max_words: usize) -> String {
    if word_count(text) <= max_words {
        return text.trim().to_string();
    }
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keep at most `max_chars` characters, cutting back to the last whole word.
pub fn limit_chars(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => cut[..idx].trim_end().to_string(),
        _ => cut,
    }
}
