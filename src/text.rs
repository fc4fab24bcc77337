//! Sentence-level text heuristics shared by extraction and summarization.
//!
//! The [`ContentFilter`] separates article prose from UI noise (share
//! prompts, bylines, "related articles" blocks). A sentence passes when it
//! is at least 30 characters long, contains no noise phrase, is at most 30%
//! punctuation/symbols, and contains at least one functional word.

use crate::config::Vocabulary;
use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum length, in characters, of a content sentence.
pub const MIN_SENTENCE_CHARS: usize = 30;
/// Maximum share of non-word, non-space characters in a content sentence.
pub const MAX_SYMBOL_RATIO: f64 = 0.3;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static SYMBOL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
static SENTENCE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]\s+").unwrap());

/// Trim and collapse internal whitespace to single spaces.
pub fn clean_sentence(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Split text on sentence-ending punctuation followed by whitespace.
///
/// The terminating punctuation is consumed; each piece is cleaned. Empty
/// pieces are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    SENTENCE_BREAK
        .split(text)
        .map(clean_sentence)
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// Share of characters that are neither word characters nor whitespace.
pub fn symbol_ratio(s: &str) -> f64 {
    let total = s.chars().count();
    if total == 0 {
        return 0.0;
    }
    SYMBOL.find_iter(s).count() as f64 / total as f64
}

/// Case-insensitive check for any of `needles` inside `haystack`.
///
/// `needles` are expected to be lowercase already.
pub fn contains_any(haystack_lower: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| haystack_lower.contains(n.as_str()))
}

pub fn lowercase_all(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

/// The content-sentence filter.
#[derive(Debug, Clone)]
pub struct ContentFilter {
    noise: Vec<String>,
    functional: Vec<String>,
}

impl ContentFilter {
    pub fn new(vocabulary: &Vocabulary) -> Self {
        Self {
            noise: lowercase_all(&vocabulary.noise),
            functional: lowercase_all(&vocabulary.functional),
        }
    }

    /// Whether `sentence` reads like article prose.
    pub fn is_content(&self, sentence: &str) -> bool {
        if sentence.chars().count() < MIN_SENTENCE_CHARS {
            return false;
        }
        let lower = sentence.to_lowercase();
        if contains_any(&lower, &self.noise) {
            return false;
        }
        if symbol_ratio(sentence) > MAX_SYMBOL_RATIO {
            return false;
        }
        contains_any(&lower, &self.functional)
    }
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new(&Vocabulary::default())
    }
}
