//! Utterance normalization.
//!
//! Every utterance (user input or redirect target) goes through the same
//! pipeline before matching: NFKC normalization, punctuation stripping,
//! whitespace tokenization, uppercasing. The punctuation-stripped tokens in
//! their original casing are kept alongside so captures can echo the user.

use unicode_normalization::UnicodeNormalization;

/// A normalized utterance ready for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// Uppercased tokens used for matching.
    tokens: Vec<String>,
    /// The same tokens in the caller's casing.
    raw: Vec<String>,
}

impl Utterance {
    /// Normalize free text into an utterance.
    pub fn normalize(text: &str) -> Self {
        let cleaned: String = text
            .nfkc()
            .map(|c| if keep_char(c) { c } else { ' ' })
            .collect();

        let raw: Vec<String> = cleaned.split_whitespace().map(str::to_string).collect();
        let tokens = raw.iter().map(|t| t.to_uppercase()).collect();
        Self { tokens, raw }
    }

    /// Normalized (uppercase) tokens.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Original-case tokens.
    pub fn raw_tokens(&self) -> &[String] {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The normalized text: tokens joined by single spaces.
    pub fn text(&self) -> String {
        self.tokens.join(" ")
    }

    /// Original-case text of the token span `start..end`.
    pub fn raw_span(&self, start: usize, end: usize) -> String {
        self.raw[start..end].join(" ")
    }
}

impl std::fmt::Display for Utterance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text())
    }
}

/// Normalize a single word the way utterance tokens are normalized.
///
/// Returns `None` when nothing survives punctuation stripping.
pub fn normalize_word(word: &str) -> Option<String> {
    let cleaned: String = word.nfkc().filter(|c| keep_char(*c)).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_uppercase())
    }
}

fn keep_char(c: char) -> bool {
    c.is_alphanumeric() || c.is_whitespace() || matches!(c, '\'' | '-' | '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_uppercases() {
        let u = Utterance::normalize("  What is AIML?! ");
        assert_eq!(u.tokens(), &["WHAT", "IS", "AIML"]);
        assert_eq!(u.raw_tokens(), &["What", "is", "AIML"]);
        assert_eq!(u.text(), "WHAT IS AIML");
    }

    #[test]
    fn keeps_apostrophes_hyphens_underscores() {
        let u = Utterance::normalize("don't markup_language meta-cognition");
        assert_eq!(u.tokens(), &["DON'T", "MARKUP_LANGUAGE", "META-COGNITION"]);
    }

    #[test]
    fn nfkc_folds_compatibility_forms() {
        // Fullwidth letters fold to ASCII.
        let u = Utterance::normalize("ＡＩＭＬ");
        assert_eq!(u.tokens(), &["AIML"]);
    }

    #[test]
    fn raw_span_preserves_case() {
        let u = Utterance::normalize("My name is Alice Smith.");
        assert_eq!(u.raw_span(3, 5), "Alice Smith");
    }

    #[test]
    fn empty_input() {
        assert!(Utterance::normalize("?!.").is_empty());
        assert_eq!(normalize_word("..."), None);
        assert_eq!(normalize_word("Hello,"), Some("HELLO".into()));
    }
}
