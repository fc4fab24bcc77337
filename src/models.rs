//! Data models for harvested articles and their persisted representation.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Source`]: A configured news origin with its ordered feed endpoints
//! - [`Candidate`]: An article reference discovered in a feed
//! - [`ExtractedContent`]: Article text isolated from a fetched page
//! - [`IncidentRecord`]: The persisted unit, keyed by its content fingerprint
//! - [`HarvestSummary`]: Counters reported at the end of a run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A news origin with one or more syndication feed endpoints.
///
/// Endpoints are tried in declared order; the first one that yields
/// candidates wins for the run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Source {
    /// Human-readable name, copied into every record from this source.
    pub name: String,
    /// Ordered feed endpoint URLs.
    pub feeds: Vec<String>,
    /// Base URL used to resolve relative entry links.
    pub base_url: String,
}

/// One discovered article reference awaiting processing.
///
/// `published` is `None` when no date could be resolved from the feed entry;
/// such entries are assumed to be recent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub title: String,
    pub source: String,
    pub published: Option<DateTime<Utc>>,
}

/// Article text isolated from a single fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    pub title: String,
    pub body: String,
    /// Best-effort publish date as found in the page; may be empty.
    pub publish_date: String,
    pub url: String,
}

/// A harvested incident, as stored in the JSON store file.
///
/// Records are never mutated once created. `content_hash` is the dedup key
/// and is unique within the store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IncidentRecord {
    pub title: String,
    pub url: String,
    pub source: String,
    #[serde(default)]
    pub date: String,
    pub summary: String,
    pub content_hash: String,
}

impl IncidentRecord {
    /// Free text handed to the downstream classifier.
    ///
    /// Parts are included only when non-empty and joined by single spaces.
    pub fn incident_text(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(5);
        if !self.title.trim().is_empty() {
            parts.push(self.title.trim().to_string());
        }
        if !self.summary.trim().is_empty() {
            parts.push(self.summary.trim().to_string());
        }
        if !self.date.is_empty() {
            parts.push(format!("Ngày: {}", self.date));
        }
        if !self.source.is_empty() {
            parts.push(format!("Nguồn: {}", self.source));
        }
        if !self.url.is_empty() {
            parts.push(format!("Url: {}", self.url));
        }
        parts.join(" ")
    }
}

/// Stable fingerprint of a raw extracted body: lowercase hex SHA-256.
pub fn fingerprint(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    format!("{:x}", digest)
}

/// Counters reported by one harvest run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HarvestSummary {
    /// Records added to the store by this run.
    pub new_count: usize,
    /// Records in the store after this run.
    pub total_count: usize,
    /// Candidates discovered across all sources (after URL dedup).
    pub candidates: usize,
    /// Records rejected because their fingerprint was already stored.
    pub duplicates: usize,
    pub unavailable: usize,
    pub unextractable: usize,
    pub out_of_scope: usize,
    /// Tasks that panicked.
    pub failed: usize,
    /// Whether the store file was rewritten successfully.
    pub persisted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> IncidentRecord {
        IncidentRecord {
            title: "Cháy nhà ở Cầu Giấy".to_string(),
            url: "https://example.vn/chay".to_string(),
            source: "VnExpress".to_string(),
            date: "2025-05-06T08:00:00+07:00".to_string(),
            summary: "Đám cháy xảy ra tại Hà Nội.".to_string(),
            content_hash: fingerprint("body"),
        }
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = fingerprint("Một vụ tai nạn xảy ra tại Hà Nội.");
        let b = fingerprint("Một vụ tai nạn xảy ra tại Hà Nội.");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, fingerprint("Một vụ tai nạn xảy ra tại Hà Nội"));
    }

    #[test]
    fn test_fingerprint_known_value() {
        assert_eq!(
            fingerprint("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_record_serialization_field_names() {
        let json = serde_json::to_string(&record()).unwrap();
        for field in ["title", "url", "source", "date", "summary", "content_hash"] {
            assert!(json.contains(&format!("\"{}\"", field)), "missing {field}");
        }
    }

    #[test]
    fn test_record_deserialization_without_date() {
        let json = r#"{
            "title": "T",
            "url": "https://example.vn/a",
            "source": "S",
            "summary": "Sum",
            "content_hash": "abc"
        }"#;
        let rec: IncidentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.date, "");
    }

    #[test]
    fn test_incident_text() {
        let text = record().incident_text();
        assert_eq!(
            text,
            "Cháy nhà ở Cầu Giấy Đám cháy xảy ra tại Hà Nội. Ngày: 2025-05-06T08:00:00+07:00 \
             Nguồn: VnExpress Url: https://example.vn/chay"
        );
    }

    #[test]
    fn test_incident_text_skips_empty_parts() {
        let mut rec = record();
        rec.date.clear();
        rec.summary.clear();
        assert_eq!(
            rec.incident_text(),
            "Cháy nhà ở Cầu Giấy Nguồn: VnExpress Url: https://example.vn/chay"
        );
    }
}
