//! Summaries from an OpenAI-compatible chat model.

use super::SummaryStrategy;
use crate::api::{ChatClient, RetryAsk, ask_with_backoff};
use crate::config::SummarizerConfig;
use crate::utils::{looks_truncated, truncate_for_log};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{instrument, warn};

/// Body characters sent to the model.
pub const MAX_PROMPT_BODY_CHARS: usize = 3000;

const SYSTEM_PROMPT: &str = "Bạn là chuyên gia phân tích và tóm tắt tin tức về Hà Nội. \
    Tóm tắt phải có đúng số từ được yêu cầu và giữ thông tin quan trọng nhất.";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("summarization request failed: {0}")]
    Request(String),
    #[error("model returned malformed JSON: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("model judged the article out of scope")]
    NotRelevant,
    #[error("model returned an empty summary")]
    EmptySummary,
}

/// The structured answer requested from the model.
#[derive(Debug, Deserialize)]
struct ModelVerdict {
    #[serde(alias = "is_hanoi_related")]
    relevant: bool,
    #[serde(default)]
    summary: String,
}

#[derive(Debug)]
pub struct ModelSummarizer {
    api: RetryAsk<ChatClient>,
}

impl ModelSummarizer {
    /// Returns `None` when no API key is configured.
    pub fn from_config(config: &SummarizerConfig) -> Option<Self> {
        let client = ChatClient::from_config(config, SYSTEM_PROMPT)?;
        Some(Self {
            api: RetryAsk::new(client, config.max_retries, Duration::from_secs(1)),
        })
    }
}

/// Build the user prompt for one article.
pub fn build_prompt(title: &str, body: &str, max_words: usize) -> String {
    let body: String = body.chars().take(MAX_PROMPT_BODY_CHARS).collect();
    format!(
        "Phân tích bài báo sau và trích xuất thông tin:\n\n\
         Tiêu đề: {title}\n\
         Nội dung: {body}\n\n\
         Yêu cầu:\n\
         1. Xác định bài báo có liên quan đến Hà Nội không\n\
         2. Tóm tắt bài báo bằng tiếng Việt, CHÍNH XÁC {max_words} từ, giữ lại các thông tin quan trọng nhất \
         về sự kiện (cái gì, khi nào, ở đâu, tại sao, như thế nào).\n\n\
         Trả về JSON:\n\
         {{\"relevant\": true/false, \"summary\": \"tóm tắt {max_words} từ\"}}\n\n\
         Chỉ trả về JSON, không text khác."
    )
}

/// Strip a surrounding Markdown code fence, if any.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_verdict(raw: &str) -> Result<ModelVerdict, serde_json::Error> {
    serde_json::from_str(strip_code_fence(raw))
}

/// Turn a parsed verdict into a usable summary.
fn accept(verdict: ModelVerdict) -> Result<String, ModelError> {
    if !verdict.relevant {
        return Err(ModelError::NotRelevant);
    }
    let summary = verdict.summary.trim();
    if summary.is_empty() {
        return Err(ModelError::EmptySummary);
    }
    Ok(summary.to_string())
}

impl SummaryStrategy for ModelSummarizer {
    type Error = ModelError;

    fn name(&self) -> &'static str {
        "model"
    }

    #[instrument(level = "debug", skip_all, fields(title = %truncate_for_log(title, 80)))]
    async fn summarize(&self, title: &str, body: &str, max_words: usize) -> Result<String, ModelError> {
        let prompt = build_prompt(title, body, max_words);
        let raw = ask_with_backoff(&self.api, &prompt)
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        let mut parsed = parse_verdict(&raw);

        // A cut-off response gets one more chance.
        if let Err(e) = &parsed {
            if looks_truncated(e) {
                warn!(error = %e, "EOF while parsing model response; re-asking once");
                let again = ask_with_backoff(&self.api, &prompt)
                    .await
                    .map_err(|e| ModelError::Request(e.to_string()))?;
                parsed = parse_verdict(&again);
            }
        }

        match parsed {
            Ok(verdict) => accept(verdict),
            Err(e) => {
                warn!(
                    error = %e,
                    response_preview = %truncate_for_log(&raw, 300),
                    "Model returned non-conforming JSON"
                );
                Err(ModelError::Malformed(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_caps_body() {
        let body = "#".repeat(5000);
        let prompt = build_prompt("Tiêu đề", &body, 100);
        assert!(prompt.contains("Tiêu đề: Tiêu đề"));
        assert!(prompt.contains("CHÍNH XÁC 100 từ"));
        assert_eq!(prompt.matches('#').count(), MAX_PROMPT_BODY_CHARS);
    }

    #[test]
    fn test_parse_plain_and_fenced() {
        let plain = parse_verdict(r#"{"relevant": true, "summary": "Tóm tắt"}"#).unwrap();
        assert!(plain.relevant);
        assert_eq!(plain.summary, "Tóm tắt");

        let fenced = parse_verdict("```json\n{\"relevant\": false, \"summary\": \"\"}\n```").unwrap();
        assert!(!fenced.relevant);
    }

    #[test]
    fn test_parse_accepts_legacy_flag_name() {
        let v = parse_verdict(r#"{"is_hanoi_related": true, "summary": "S"}"#).unwrap();
        assert!(v.relevant);
    }

    #[test]
    fn test_truncated_response_is_detected() {
        let err = parse_verdict(r#"{"relevant": true, "summary": "Tóm"#).unwrap_err();
        assert!(looks_truncated(&err));
    }

    #[test]
    fn test_accept_rules() {
        let ok = accept(ModelVerdict {
            relevant: true,
            summary: "  Cháy tại Hà Nội.  ".to_string(),
        });
        assert_eq!(ok.unwrap(), "Cháy tại Hà Nội.");

        let off_topic = accept(ModelVerdict {
            relevant: false,
            summary: "S".to_string(),
        });
        assert!(matches!(off_topic, Err(ModelError::NotRelevant)));

        let empty = accept(ModelVerdict {
            relevant: true,
            summary: " ".to_string(),
        });
        assert!(matches!(empty, Err(ModelError::EmptySummary)));
    }

    #[test]
    fn test_requires_api_key() {
        assert!(ModelSummarizer::from_config(&SummarizerConfig::default()).is_none());
    }
}
