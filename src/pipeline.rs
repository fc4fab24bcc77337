//! Per-candidate processing: extract, check scope, fingerprint, summarize.

use crate::extractor::{ExtractError, extract};
use crate::fetcher::{Fetch, FetchError};
use crate::models::{Candidate, IncidentRecord, fingerprint};
use crate::summarizer::Summarizer;
use crate::text::ContentFilter;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Why a candidate produced no record.
#[derive(Debug, Error)]
pub enum SkipReason {
    #[error("page unavailable: {0}")]
    Unavailable(#[source] FetchError),

    #[error("page unextractable ({chars} chars of content)")]
    Unextractable { chars: usize },

    #[error("article does not mention the covered area")]
    OutOfScope,
}

impl From<ExtractError> for SkipReason {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::Fetch(e) => SkipReason::Unavailable(e),
            ExtractError::TooShort { chars } => SkipReason::Unextractable { chars },
        }
    }
}

/// Turns one [`Candidate`] into an [`IncidentRecord`].
#[derive(Debug)]
pub struct ArticlePipeline<F> {
    fetcher: F,
    summarizer: Summarizer,
    filter: ContentFilter,
    page_timeout: Duration,
    summary_words: usize,
}

impl<F: Fetch> ArticlePipeline<F> {
    pub fn new(
        fetcher: F,
        summarizer: Summarizer,
        filter: ContentFilter,
        page_timeout: Duration,
        summary_words: usize,
    ) -> Self {
        Self {
            fetcher,
            summarizer,
            filter,
            page_timeout,
            summary_words,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Process one candidate.
    ///
    /// The scope check and the fingerprint depend only on the extracted page,
    /// so the outcome is the same whichever summarization strategy runs.
    #[instrument(level = "debug", skip_all, fields(url = %candidate.url))]
    pub async fn process(&self, candidate: &Candidate) -> Result<IncidentRecord, SkipReason> {
        let content = extract(&self.fetcher, &candidate.url, self.page_timeout, &self.filter).await?;

        let scope_text = format!("{} {}", content.title, content.body);
        if !self.summarizer.fallback().mentions_locality(&scope_text) {
            debug!("Not related to the covered area");
            return Err(SkipReason::OutOfScope);
        }

        let content_hash = fingerprint(&content.body);
        let summary = self
            .summarizer
            .summarize(&content.title, &content.body, self.summary_words)
            .await;

        let date = if content.publish_date.is_empty() {
            candidate
                .published
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_default()
        } else {
            content.publish_date
        };

        Ok(IncidentRecord {
            title: candidate.title.clone(),
            url: candidate.url.clone(),
            source: candidate.source.clone(),
            date,
            summary,
            content_hash,
        })
    }
}
