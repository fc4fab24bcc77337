//! Harvest configuration.
//!
//! A [`Config`] is loaded once at startup (optionally from a YAML file) and
//! handed to the [`Harvester`](crate::harvest::Harvester) by value. Every
//! field has a default, so a YAML file only needs to list what it overrides.
//!
//! ```yaml
//! store_path: Data/safemap_data.json
//! workers: 8
//! sources:
//!   - name: VnExpress
//!     base_url: https://vnexpress.net
//!     feeds:
//!       - https://vnexpress.net/rss/tin-moi-nhat.rss
//!       - https://vnexpress.net/rss/thoi-su.rss
//! ```

use crate::models::Source;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};

/// Errors raised while loading or validating configuration.
///
/// These are the only errors that end a run at the process level.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no sources configured")]
    NoSources,

    #[error("source {0:?} has no feed endpoints")]
    NoFeeds(String),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level configuration for one harvest run.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub sources: Vec<Source>,
    pub store_path: PathBuf,
    /// Maximum candidates collected per source.
    pub per_source_limit: usize,
    /// Size of the article worker pool.
    pub workers: usize,
    /// Target synopsis length in words.
    pub summary_words: usize,
    pub feed_timeout_secs: u64,
    pub page_timeout_secs: u64,
    /// Pause between consecutive sources while polling feeds.
    pub source_pause_ms: u64,
    /// Randomized politeness delay after each article task, in milliseconds.
    pub task_delay_ms: (u64, u64),
    pub vocabulary: Vocabulary,
    pub summarizer: SummarizerConfig,
}

/// Keyword tables driving relevance, scoring, and the content-sentence filter.
///
/// Matching is always case-insensitive substring matching.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Vocabulary {
    /// Locality keywords; an article must mention one to be kept.
    pub locality: Vec<String>,
    /// Terms indicating an incident (damage, casualties, fire, flood, ...).
    pub indicators: Vec<String>,
    /// UI and navigation phrases that disqualify a sentence.
    pub noise: Vec<String>,
    /// Common functional words; a sentence must contain one.
    pub functional: Vec<String>,
}

/// Settings for the external summarization service.
///
/// The service is used only when `api_key` is set.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Retries after the first failed call.
    pub max_retries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            store_path: PathBuf::from("Data/safemap_data.json"),
            per_source_limit: 50,
            workers: 8,
            summary_words: 100,
            feed_timeout_secs: 10,
            page_timeout_secs: 15,
            source_pause_ms: 1000,
            task_delay_ms: (500, 1000),
            vocabulary: Vocabulary::default(),
            summarizer: SummarizerConfig::default(),
        }
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            locality: strings(&["Hà Nội", "Ha Noi", "Thủ đô", "TP Hà Nội"]),
            indicators: strings(&[
                "xảy ra", "diễn ra", "gây ra", "dẫn đến", "khiến", "thiệt hại", "thương vong",
                "bị thương", "tử vong", "tai nạn", "va chạm", "cháy", "nổ", "cướp", "trộm",
                "kẹt xe", "ùn tắc", "ngập", "lũ lụt", "sập", "đổ", "theo", "cho biết",
                "thông tin", "cảnh báo",
            ]),
            noise: strings(&[
                "lưu bài", "bỏ lưu", "đồng ý", "chia sẻ", "thành công", "xem lại bài viết",
                "tin bài đã lưu", "sự kiện", "theo dõi", "đăng ký nhận tin", "like", "share",
                "comment", "bình luận", "phóng viên", "nguồn:", "tin liên quan", "xem thêm",
                "cập nhật lúc", "chuyên mục", "tags:", "từ khóa",
            ]),
            functional: strings(&["là", "có", "được", "tại", "này", "đã", "sẽ", "người", "theo"]),
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            temperature: 0.1,
            max_tokens: 400,
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file and validate it.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
        config.validate()?;
        info!(sources = config.sources.len(), "Loaded configuration");
        Ok(config)
    }

    /// Parse YAML without validating.
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        if let Some(source) = self.sources.iter().find(|s| s.feeds.is_empty()) {
            return Err(ConfigError::NoFeeds(source.name.clone()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.per_source_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "per_source_limit",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.summary_words == 0 {
            return Err(ConfigError::Invalid {
                field: "summary_words",
                reason: "must be at least 1".to_string(),
            });
        }
        let (lo, hi) = self.task_delay_ms;
        if lo > hi {
            return Err(ConfigError::Invalid {
                field: "task_delay_ms",
                reason: format!("lower bound {lo} exceeds upper bound {hi}"),
            });
        }
        Ok(())
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn source(name: &str, base_url: &str, feeds: &[&str]) -> Source {
    Source {
        name: name.to_string(),
        feeds: strings(feeds),
        base_url: base_url.to_string(),
    }
}

fn default_sources() -> Vec<Source> {
    vec![
        source(
            "VnExpress",
            "https://vnexpress.net",
            &[
                "https://vnexpress.net/rss/tin-moi-nhat.rss",
                "https://vnexpress.net/rss/thoi-su.rss",
                "https://vnexpress.net/rss/xa-hoi.rss",
            ],
        ),
        source(
            "Dân Trí",
            "https://dantri.com.vn",
            &[
                "https://dantri.com.vn/rss/home.rss",
                "https://dantri.com.vn/rss/thoi-su.rss",
                "https://dantri.com.vn/rss/su-kien.rss",
            ],
        ),
        source(
            "Vietnamnet",
            "https://vietnamnet.vn",
            &[
                "https://vietnamnet.vn/rss/thoi-su.rss",
                "https://vietnamnet.vn/rss/xa-hoi.rss",
            ],
        ),
        source(
            "Tuổi Trẻ",
            "https://tuoitre.vn",
            &[
                "https://tuoitre.vn/rss/tin-moi-nhat.rss",
                "https://tuoitre.vn/rss/thoi-su.rss",
                "https://tuoitre.vn/rss/xa-hoi.rss",
            ],
        ),
        source(
            "Thanh Niên",
            "https://thanhnien.vn",
            &[
                "https://thanhnien.vn/rss/home.rss",
                "https://thanhnien.vn/rss/thoi-su.rss",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sources.len(), 5);
        assert_eq!(config.workers, 8);
        assert_eq!(config.per_source_limit, 50);
        assert!(config.summarizer.api_key.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
workers: 4
sources:
  - name: X
    base_url: https://x.example
    feeds: [https://x.example/rss]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].name, "X");
        assert_eq!(config.summary_words, 100);
        assert!(config.vocabulary.locality.contains(&"Hà Nội".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_no_sources_is_rejected() {
        let config = Config::from_yaml("sources: []").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::NoSources)));
    }

    #[test]
    fn test_source_without_feeds_is_rejected() {
        let yaml = r#"
sources:
  - name: Empty
    base_url: https://e.example
    feeds: []
"#;
        let config = Config::from_yaml(yaml).unwrap();
        match config.validate() {
            Err(ConfigError::NoFeeds(name)) => assert_eq!(name, "Empty"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let config = Config {
            workers: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "workers", .. })
        ));
    }

    #[test]
    fn test_inverted_delay_is_rejected() {
        let config = Config {
            task_delay_ms: (900, 100),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
