//! Command-line interface definitions for the incident harvester.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Flags override the matching values from the YAML configuration.

use crate::config::Config;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for one harvest run.
///
/// # Examples
///
/// ```sh
/// # Stock sources, default store location
/// incident_harvester
///
/// # Custom config and store, fewer workers
/// incident_harvester -c harvest.yaml -s /var/lib/harvest/store.json -w 4
///
/// # Model summaries and an export for the classifier
/// OPENAI_API_KEY=sk-... incident_harvester --export-incidents incidents.jsonl
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Store file path (overrides the config)
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    /// Number of concurrent article workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Maximum candidates per source
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Target summary length in words
    #[arg(long)]
    pub summary_words: Option<usize>,

    /// API key for model summaries; extractive summaries are used without one
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Write the store as JSON Lines classification input after the run
    #[arg(long)]
    pub export_incidents: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(store) = &self.store {
            config.store_path = store.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(limit) = self.limit {
            config.per_source_limit = limit;
        }
        if let Some(words) = self.summary_words {
            config.summary_words = words;
        }
        if let Some(key) = &self.openai_api_key {
            config.summarizer.api_key = Some(key.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["incident_harvester"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.store.is_none());
        assert!(cli.export_incidents.is_none());
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "incident_harvester",
            "-c",
            "harvest.yaml",
            "-s",
            "/tmp/store.json",
            "-w",
            "4",
            "-l",
            "20",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("harvest.yaml")));
        assert_eq!(cli.store, Some(PathBuf::from("/tmp/store.json")));
        assert_eq!(cli.workers, Some(4));
        assert_eq!(cli.limit, Some(20));
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let cli = Cli::parse_from([
            "incident_harvester",
            "--store",
            "out/store.json",
            "--summary-words",
            "60",
            "--openai-api-key",
            "sk-test",
            "--export-incidents",
            "out/incidents.jsonl",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.store_path, PathBuf::from("out/store.json"));
        assert_eq!(config.summary_words, 60);
        assert_eq!(config.summarizer.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.workers, 8);
        assert_eq!(cli.export_incidents, Some(PathBuf::from("out/incidents.jsonl")));
    }

    #[test]
    fn test_rejects_non_numeric_workers() {
        assert!(Cli::try_parse_from(["incident_harvester", "-w", "many"]).is_err());
    }
}
