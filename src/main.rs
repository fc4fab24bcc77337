//! # Incident Harvester
//!
//! Collects local incident reports from Vietnamese news outlets: polls each
//! outlet's syndication feeds, pulls the full article text, keeps articles
//! about the covered area, summarizes them, and merges new ones into a
//! deduplicated JSON store.
//!
//! ## Usage
//!
//! ```sh
//! incident_harvester -c harvest.yaml --export-incidents incidents.jsonl
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Discovery**: Read each source's feeds in order, first working endpoint wins
//! 2. **Extraction**: Download each article and isolate its prose
//! 3. **Summarization**: Model synopsis when configured, sentence scoring otherwise
//! 4. **Output**: Merge into the store by content fingerprint and rewrite it

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod extractor;
mod feeds;
mod fetcher;
mod harvest;
mod models;
mod pipeline;
mod store;
mod summarizer;
mod text;
mod utils;

use cli::Cli;
use config::Config;
use fetcher::HttpFetcher;
use harvest::Harvester;
use store::Store;
use utils::ensure_parent_writable;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("incident_harvester starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.config, ?args.store, ?args.workers, "Parsed CLI arguments");

    // ---- Load config ----
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => {
            info!("No config file given; using built-in sources");
            Config::default()
        }
    };
    args.apply(&mut config);
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    // Early check: the store location must be writable
    if let Err(e) = ensure_parent_writable(&config.store_path).await {
        error!(
            path = %config.store_path.display(),
            error = %e,
            "Store directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Harvest ----
    let fetcher = HttpFetcher::new()?;
    let harvester = Harvester::new(config, fetcher);
    let summary = harvester.run().await;
    if !summary.persisted {
        error!("Store file was not updated; new records from this run are lost");
    }

    // ---- Classification export ----
    if let Some(path) = &args.export_incidents {
        let store = Store::load(&harvester.config().store_path).await;
        if store.is_empty() {
            warn!(path = %path.display(), "Store is empty; export will have no lines");
        }
        if let Err(e) = store.export_incidents(path).await {
            error!(path = %path.display(), error = %e, "Failed to write incident export");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        new = summary.new_count,
        total = summary.total_count,
        "Execution complete"
    );
    println!(
        "{}",
        serde_json::to_string(&summary).unwrap_or_else(|_| format!("{summary:?}"))
    );

    Ok(())
}
