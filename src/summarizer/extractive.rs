//! Deterministic sentence-scoring summarizer.
//!
//! Sentences that pass the content filter are scored, the best ones are
//! picked greedily up to the word budget, and the picks are put back in
//! their original order. No randomness is involved: identical input and
//! keyword tables always give byte-identical output.

use super::SummaryStrategy;
use crate::config::Vocabulary;
use crate::text::{ContentFilter, contains_any, lowercase_all, split_sentences, word_count};
use std::convert::Infallible;

/// Extra words the last greedy pick may push the summary over budget.
pub const OVERFLOW_WORDS: usize = 20;
/// Summaries longer than this are cut to the word budget.
pub const MAX_SUMMARY_WORDS: usize = 120;
/// Summaries shorter than this fall back to the leading sentences.
pub const MIN_SUMMARY_CHARS: usize = 100;
/// Leading sentences considered by the short-summary fallback.
const LEAD_WINDOW: usize = 8;
const LEAD_SENTENCES: usize = 3;

#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    filter: ContentFilter,
    locality: Vec<String>,
    indicators: Vec<String>,
}

impl ExtractiveSummarizer {
    pub fn new(vocabulary: &Vocabulary) -> Self {
        Self {
            filter: ContentFilter::new(vocabulary),
            locality: lowercase_all(&vocabulary.locality),
            indicators: lowercase_all(&vocabulary.indicators),
        }
    }

    /// Relevance score of one sentence.
    ///
    /// +2 per locality keyword present, +1 per incident indicator present,
    /// -2 when shorter than 50 characters, -1 when it contains a question mark.
    pub fn score(&self, sentence: &str) -> f64 {
        let lower = sentence.to_lowercase();
        let mut score = 0.0;
        for kw in &self.locality {
            if lower.contains(kw.as_str()) {
                score += 2.0;
            }
        }
        for indicator in &self.indicators {
            if lower.contains(indicator.as_str()) {
                score += 1.0;
            }
        }
        if sentence.chars().count() < 50 {
            score -= 2.0;
        }
        if sentence.contains('?') {
            score -= 1.0;
        }
        score
    }

    /// Whether `text` mentions any locality keyword.
    pub fn mentions_locality(&self, text: &str) -> bool {
        contains_any(&text.to_lowercase(), &self.locality)
    }

    /// Build a synopsis of roughly `max_words` words from `body`.
    pub fn summarize_text(&self, body: &str, max_words: usize) -> String {
        let sentences = split_sentences(body);

        let mut scored: Vec<(usize, f64, &str)> = sentences
            .iter()
            .enumerate()
            .filter(|(_, s)| self.filter.is_content(s))
            .map(|(i, s)| (i, self.score(s), s.as_str()))
            .collect();
        // Stable sort: equal scores keep their original order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut picked: Vec<(usize, &str)> = Vec::new();
        let mut words = 0;
        for (idx, _, sentence) in scored {
            if words >= max_words {
                break;
            }
            let n = word_count(sentence);
            if words + n <= max_words + OVERFLOW_WORDS {
                picked.push((idx, sentence));
                words += n;
            }
        }
        picked.sort_by_key(|(idx, _)| *idx);

        let mut summary = join_sentences(picked.into_iter().map(|(_, s)| s));

        if summary.chars().count() < MIN_SUMMARY_CHARS {
            let lead = sentences
                .iter()
                .take(LEAD_WINDOW)
                .filter(|s| self.filter.is_content(s))
                .take(LEAD_SENTENCES)
                .map(String::as_str);
            summary = join_sentences(lead);
        }

        let all_words: Vec<&str> = summary.split_whitespace().collect();
        if all_words.len() > MAX_SUMMARY_WORDS {
            summary = format!("{}...", all_words[..max_words].join(" "));
        }

        summary
    }
}

/// Join sentences with ". " and make sure the result ends with punctuation.
fn join_sentences<'a>(sentences: impl Iterator<Item = &'a str>) -> String {
    let mut out = sentences
        .map(|s| s.trim_end_matches(['.', '!', '?']))
        .collect::<Vec<_>>()
        .join(". ");
    if !out.is_empty() && !out.ends_with(['.', '!', '?']) {
        out.push('.');
    }
    out
}

impl SummaryStrategy for ExtractiveSummarizer {
    type Error = Infallible;

    fn name(&self) -> &'static str {
        "extractive"
    }

    async fn summarize(&self, _title: &str, body: &str, max_words: usize) -> Result<String, Infallible> {
        Ok(self.summarize_text(body, max_words))
    }
}
