//! Article summarization strategies.
//!
//! Two interchangeable strategies implement [`SummaryStrategy`]:
//!
//! - [`model::ModelSummarizer`]: asks an OpenAI-compatible model for a
//!   fixed-length synopsis and a relevance flag
//! - [`extractive::ExtractiveSummarizer`]: deterministic sentence scoring
//!
//! [`Summarizer`] is chosen once at startup. The model strategy is only
//! present when an API key is configured; any failure it reports is logged
//! and the extractive strategy produces the summary instead.

pub mod extractive;
pub mod model;

use crate::config::Config;
use extractive::ExtractiveSummarizer;
use model::ModelSummarizer;
use std::fmt::Display;
use tracing::{debug, warn};

/// A way of turning an article into a short synopsis.
pub trait SummaryStrategy {
    type Error: Display;

    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    async fn summarize(&self, title: &str, body: &str, max_words: usize) -> Result<String, Self::Error>;
}

/// The summarizer used by the article pipeline.
#[derive(Debug)]
pub struct Summarizer {
    model: Option<ModelSummarizer>,
    fallback: ExtractiveSummarizer,
}

impl Summarizer {
    pub fn new(model: Option<ModelSummarizer>, fallback: ExtractiveSummarizer) -> Self {
        Self { model, fallback }
    }

    pub fn from_config(config: &Config) -> Self {
        let model = ModelSummarizer::from_config(&config.summarizer);
        if model.is_none() {
            debug!("No summarization API key configured; using extractive summaries only");
        }
        Self::new(model, ExtractiveSummarizer::new(&config.vocabulary))
    }

    /// Name of the preferred strategy.
    pub fn primary(&self) -> &'static str {
        match &self.model {
            Some(m) => m.name(),
            None => self.fallback.name(),
        }
    }

    pub fn fallback(&self) -> &ExtractiveSummarizer {
        &self.fallback
    }

    /// Summarize an article. Never fails: model errors fall through to the
    /// extractive strategy.
    pub async fn summarize(&self, title: &str, body: &str, max_words: usize) -> String {
        if let Some(model) = &self.model {
            match model.summarize(title, body, max_words).await {
                Ok(summary) => return summary,
                Err(e) => {
                    warn!(strategy = model.name(), error = %e, "Summarization failed; using extractive fallback");
                }
            }
        }
        match self.fallback.summarize(title, body, max_words).await {
            Ok(summary) => summary,
            Err(never) => match never {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SummarizerConfig, Vocabulary};

    const BODY: &str = "Một vụ cháy lớn xảy ra tại kho hàng ở Hà Nội khiến nhiều tài sản bị thiệt hại nặng nề. \
        Theo cơ quan chức năng Hà Nội, vụ cháy không gây thương vong nhưng gây ùn tắc kéo dài.";

    #[test]
    fn test_without_key_uses_extractive() {
        let summarizer = Summarizer::from_config(&Config::default());
        assert_eq!(summarizer.primary(), "extractive");
    }

    #[test]
    fn test_with_key_prefers_model() {
        let mut config = Config::default();
        config.summarizer = SummarizerConfig {
            api_key: Some("sk-test".to_string()),
            ..SummarizerConfig::default()
        };
        assert_eq!(Summarizer::from_config(&config).primary(), "model");
    }

    #[tokio::test]
    async fn test_matches_extractive_and_is_deterministic() {
        let summarizer = Summarizer::from_config(&Config::default());
        let a = summarizer.summarize("Cháy kho hàng", BODY, 100).await;
        let b = summarizer.summarize("Cháy kho hàng", BODY, 100).await;
        assert_eq!(a, b);
        assert_eq!(a, ExtractiveSummarizer::new(&Vocabulary::default()).summarize_text(BODY, 100));
    }
}
