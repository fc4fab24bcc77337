//! The harvest run: poll every source, process candidates in parallel, and
//! merge new incidents into the store.
//!
//! # Flow
//!
//! 1. Load the store (never fails, see [`Store::load`])
//! 2. Read each source's feeds one after another, pausing between sources
//! 3. Drop candidates whose URL was already seen in this run
//! 4. Run the [`ArticlePipeline`] over the worklist with a bounded number of
//!    tasks in flight; results are filtered against the fingerprints stored
//!    before the run started
//! 5. Merge accepted records and rewrite the store file
//!
//! The stream consumer is the only owner of the run counters, so no shared
//! mutable state exists between tasks.

use crate::config::Config;
use crate::feeds::read_source;
use crate::fetcher::Fetch;
use crate::models::{Candidate, HarvestSummary, IncidentRecord};
use crate::pipeline::{ArticlePipeline, SkipReason};
use crate::store::Store;
use crate::summarizer::Summarizer;
use crate::text::ContentFilter;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use rand::{Rng, rng};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

pub struct Harvester<F> {
    config: Config,
    pipeline: ArticlePipeline<F>,
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// Sleep for a random duration within `range` (milliseconds).
async fn politeness_pause((lo, hi): (u64, u64)) {
    if hi == 0 {
        return;
    }
    let ms = rng().random_range(lo.min(hi)..=hi);
    sleep(Duration::from_millis(ms)).await;
}

impl<F: Fetch> Harvester<F> {
    pub fn new(config: Config, fetcher: F) -> Self {
        let summarizer = Summarizer::from_config(&config);
        info!(summarizer = summarizer.primary(), sources = config.sources.len(), "Harvester ready");
        let pipeline = ArticlePipeline::new(
            fetcher,
            summarizer,
            ContentFilter::new(&config.vocabulary),
            config.page_timeout(),
            config.summary_words,
        );
        Self { config, pipeline }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one harvest against the current time.
    pub async fn run(&self) -> HarvestSummary {
        self.run_at(Utc::now()).await
    }

    /// Run one harvest, judging feed recency against `now`.
    ///
    /// # Arguments
    ///
    /// * `now` - Reference time for the feed recency window
    ///
    /// # Returns
    ///
    /// The run counters. Failures of individual sources or candidates are
    /// counted, never returned; `persisted` is false when the store file
    /// could not be written.
    #[instrument(level = "info", skip_all, fields(store = %self.config.store_path.display()))]
    pub async fn run_at(&self, now: DateTime<Utc>) -> HarvestSummary {
        let t0 = Instant::now();
        let mut summary = HarvestSummary::default();
        let mut store = Store::load(&self.config.store_path).await;
        if !store.is_saveable() {
            warn!("Store file cannot be replaced; results of this run will not be persisted");
        }

        let candidates = self.discover(now).await;
        summary.candidates = candidates.len();

        let accepted = self.process_all(&candidates, &store, &mut summary).await;
        let offered = accepted.len();
        summary.new_count = store.merge(accepted);
        summary.duplicates += offered - summary.new_count;
        summary.total_count = store.len();

        match store.save(&self.config.store_path).await {
            Ok(()) => summary.persisted = true,
            Err(e) => error!(error = %e, "Failed to write store file"),
        }

        info!(
            new = summary.new_count,
            total = summary.total_count,
            candidates = summary.candidates,
            duplicates = summary.duplicates,
            unavailable = summary.unavailable,
            unextractable = summary.unextractable,
            out_of_scope = summary.out_of_scope,
            failed = summary.failed,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Harvest complete"
        );
        summary
    }

    /// Poll every source in order and build the deduplicated worklist.
    async fn discover(&self, now: DateTime<Utc>) -> Vec<Candidate> {
        let mut all = Vec::new();
        let mut contributing = 0usize;

        for (i, source) in self.config.sources.iter().enumerate() {
            if i > 0 && self.config.source_pause_ms > 0 {
                sleep(Duration::from_millis(self.config.source_pause_ms)).await;
            }
            let found = read_source(
                self.pipeline.fetcher(),
                source,
                self.config.per_source_limit,
                self.config.feed_timeout(),
                now,
            )
            .await;
            info!(source = %source.name, count = found.len(), "Collected candidates");
            if !found.is_empty() {
                contributing += 1;
            }
            all.extend(found);
        }

        let before = all.len();
        let unique: Vec<Candidate> = all.into_iter().unique_by(|c| c.url.clone()).collect();
        info!(
            sources = self.config.sources.len(),
            contributing,
            candidates = unique.len(),
            duplicate_urls = before - unique.len(),
            "Discovery finished"
        );
        unique
    }

    /// Process the worklist with at most `workers` tasks in flight.
    async fn process_all(
        &self,
        candidates: &[Candidate],
        store: &Store,
        summary: &mut HarvestSummary,
    ) -> Vec<IncidentRecord> {
        let total = candidates.len();
        if total == 0 {
            return Vec::new();
        }
        let delay = self.config.task_delay_ms;
        let step = (total / 10).max(1);
        info!(total, workers = self.config.workers, "Processing candidates");

        let mut results = stream::iter(candidates)
            .map(|candidate| async move {
                let outcome = AssertUnwindSafe(self.pipeline.process(candidate))
                    .catch_unwind()
                    .await;
                politeness_pause(delay).await;
                (candidate, outcome)
            })
            .buffer_unordered(self.config.workers);

        let mut accepted = Vec::new();
        let mut done = 0usize;
        while let Some((candidate, outcome)) = results.next().await {
            done += 1;
            match outcome {
                Ok(Ok(record)) => {
                    if store.contains(&record.content_hash) {
                        debug!(url = %candidate.url, "Already stored");
                        summary.duplicates += 1;
                    } else {
                        debug!(url = %candidate.url, "Accepted");
                        accepted.push(record);
                    }
                }
                Ok(Err(reason)) => {
                    debug!(url = %candidate.url, %reason, "Skipped");
                    match reason {
                        SkipReason::Unavailable(_) => summary.unavailable += 1,
                        SkipReason::Unextractable { .. } => summary.unextractable += 1,
                        SkipReason::OutOfScope => summary.out_of_scope += 1,
                    }
                }
                Err(payload) => {
                    warn!(
                        url = %candidate.url,
                        panic = %panic_message(payload.as_ref()),
                        "Candidate task panicked; skipping"
                    );
                    summary.failed += 1;
                }
            }

            if done % step == 0 || done == total {
                info!(done, total, percent = done * 100 / total, accepted = accepted.len(), "Progress");
            }
        }

        accepted
    }
}
