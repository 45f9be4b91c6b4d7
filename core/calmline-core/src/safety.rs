//! Reply post-filter and user input sanitizer.

use crate::patterns::{RE_CLINICAL_TERMS, RE_REPLY_REWRITES, RE_WHITESPACE};

const EMPTY_REPLY: &str = "Take a slow breath.";
const CLINICAL_FALLBACK: &str = "Let's focus on your breath right now.";

/// Longest user message kept after sanitizing, in characters.
pub const MAX_INPUT_CHARS: usize = 500;

/// Keeps generated replies short, non-clinical and calmly phrased.
#[derive(Debug, Clone)]
pub struct SafetyFilter {
    max_words: usize,
}

impl Default for SafetyFilter {
    fn default() -> Self {
        Self::new(18)
    }
}

impl SafetyFilter {
    pub fn new(max_words: usize) -> Self {
        Self {
            max_words: max_words.max(1),
        }
    }

    pub fn max_words(&self) -> usize {
        self.max_words
    }

    /// Returns the filtered text and whether the original was safe to use.
    ///
    /// Clinical language is never patched up; the whole reply is replaced.
    pub fn filter(&self, text: &str) -> (String, bool) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return (EMPTY_REPLY.to_string(), true);
        }
        if RE_CLINICAL_TERMS.is_match(trimmed) {
            return (CLINICAL_FALLBACK.to_string(), false);
        }

        let mut filtered = trimmed.to_string();
        for (pattern, replacement) in RE_REPLY_REWRITES.iter() {
            filtered = pattern.replace_all(&filtered, *replacement).into_owned();
        }

        let filtered = capitalize_first(&self.truncate(&filtered));
        (ensure_terminal_punctuation(filtered), true)
    }

    pub fn is_safe_length(&self, text: &str) -> bool {
        text.split_whitespace().count() <= self.max_words
    }

    pub fn truncate(&self, text: &str) -> String {
        if self.is_safe_length(text) {
            return text.to_string();
        }
        let truncated = text
            .split_whitespace()
            .take(self.max_words)
            .collect::<Vec<_>>()
            .join(" ");
        ensure_terminal_punctuation(truncated)
    }
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn ensure_terminal_punctuation(mut text: String) -> String {
    if !text.ends_with(&['.', '?', '!'][..]) {
        text.push('.');
    }
    text
}

/// Collapses whitespace and straightens curly quotes. Keeps the full length,
/// so detection sees every word the user sent.
pub fn normalize_user_input(text: &str) -> String {
    RE_WHITESPACE
        .replace_all(text, " ")
        .trim()
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect()
}

/// [`normalize_user_input`] capped at [`MAX_INPUT_CHARS`], for text handed to a generator.
pub fn sanitize_user_input(text: &str) -> String {
    normalize_user_input(text)
        .chars()
        .take(MAX_INPUT_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reply_gets_default() {
        let filter = SafetyFilter::default();
        assert_eq!(filter.filter("   "), (EMPTY_REPLY.to_string(), true));
    }

    #[test]
    fn clinical_language_is_replaced_and_flagged() {
        let filter = SafetyFilter::default();
        let (text, safe) = filter.filter("You should ask your doctor about medication.");
        assert_eq!(text, CLINICAL_FALLBACK);
        assert!(!safe);
    }

    #[test]
    fn rewrites_risky_phrases() {
        let filter = SafetyFilter::default();
        let (text, safe) = filter.filter("close your eyes and don't worry");
        assert!(safe);
        assert_eq!(text, "Soften your gaze and you're safe right now.");
    }

    #[test]
    fn truncates_to_word_limit() {
        let filter = SafetyFilter::new(4);
        let (text, _) = filter.filter("breathe in slowly now and hold it there");
        assert_eq!(text, "Breathe in slowly now.");
        assert!(filter.is_safe_length(&text));
    }

    #[test]
    fn keeps_existing_punctuation() {
        let filter = SafetyFilter::default();
        assert_eq!(filter.filter("how are you?").0, "How are you?");
    }

    #[test]
    fn sanitize_collapses_and_normalizes() {
        assert_eq!(
            sanitize_user_input("  I\u{2019}m   so\n\n\u{201C}tired\u{201D}  "),
            "I'm so \"tired\""
        );
    }

    #[test]
    fn sanitize_caps_length_on_char_boundary() {
        let long = "é".repeat(MAX_INPUT_CHARS + 20);
        let sanitized = sanitize_user_input(&long);
        assert_eq!(sanitized.chars().count(), MAX_INPUT_CHARS);
    }

    #[test]
    fn normalize_keeps_full_length() {
        let long = format!("{} I want to die", "today was long ".repeat(34));
        let normalized = normalize_user_input(&long);
        assert!(normalized.chars().count() > MAX_INPUT_CHARS);
        assert!(normalized.ends_with("I want to die"));
    }
}
