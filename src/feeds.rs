//! Syndication feed reading with ordered endpoint fallback.
//!
//! Each [`Source`] lists one or more feed endpoints. [`read_source`] tries
//! them in order and stops at the first one that yields candidates:
//!
//! 1. A failed fetch, or a response declared as `text/html`, skips the endpoint.
//! 2. The payload is parsed leniently as RSS or Atom; zero entries skips it.
//! 3. Up to `5 × limit` entries are inspected; each gets a timestamp from
//!    its published date, its updated date, or free-text date fields.
//! 4. Entries from the last 24 hours, or with no resolvable date, are kept
//!    until `limit` candidates are collected.
//!
//! No endpoint working is not an error; the source simply contributes
//! nothing to the run.

use crate::fetcher::Fetch;
use crate::models::{Candidate, Source};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::borrow::Cow;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// How far back an entry may be dated and still be harvested.
pub const RECENT_WINDOW_HOURS: i64 = 24;
/// Entries inspected per endpoint, as a multiple of the per-source limit.
pub const SCAN_FACTOR: usize = 5;

/// One entry of a parsed feed, before date resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    /// `pubDate` (RSS) or `published` (Atom).
    pub published: Option<String>,
    /// `updated` (Atom, or `atom:updated` inside RSS).
    pub updated: Option<String>,
    /// `dc:date`.
    pub date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Published,
    Updated,
    Date,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"pubDate" | b"published" => Some(Field::Published),
            b"updated" => Some(Field::Updated),
            b"date" => Some(Field::Date),
            _ => None,
        }
    }

    fn assign(self, entry: &mut FeedEntry, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        match self {
            Field::Title => entry.title = value.to_string(),
            Field::Link => {
                if entry.link.is_empty() {
                    entry.link = value.to_string();
                }
            }
            Field::Published => entry.published = Some(value.to_string()),
            Field::Updated => entry.updated = Some(value.to_string()),
            Field::Date => entry.date = Some(value.to_string()),
        }
    }
}

/// Parse an RSS or Atom document into entries.
///
/// Parsing is lenient: mismatched end tags are tolerated, and a hard XML
/// error ends parsing while keeping every entry completed so far.
pub fn parse_feed(xml: &str) -> Vec<FeedEntry> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = false;

    let mut entries = Vec::new();
    let mut current: Option<FeedEntry> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"item" | b"entry" => {
                        current = Some(FeedEntry::default());
                        field = None;
                    }
                    other => {
                        if let Some(entry) = current.as_mut() {
                            if other == b"link" {
                                take_href(&e, entry);
                            }
                            field = Field::from_name(other);
                            text.clear();
                        }
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(entry) = current.as_mut() {
                    if e.local_name().as_ref() == b"link" {
                        take_href(&e, entry);
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if field.is_some() {
                    text.push_str(&unescape_lossy(&String::from_utf8_lossy(&e)));
                }
            }
            Ok(Event::CData(e)) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if field.is_some() {
                    text.push_str(&resolve_entity(&String::from_utf8_lossy(&e)));
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"item" | b"entry" => {
                        if let Some(entry) = current.take() {
                            entries.push(entry);
                        }
                        field = None;
                    }
                    other => {
                        if let (Some(f), Some(entry)) = (field, current.as_mut()) {
                            if Field::from_name(other) == Some(f) {
                                f.assign(entry, &text);
                                field = None;
                                text.clear();
                            }
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(
                    position = reader.buffer_position(),
                    error = %e,
                    kept = entries.len(),
                    "Feed XML error; keeping entries parsed so far"
                );
                break;
            }
            _ => {}
        }
    }

    entries
}

/// Atom-style `<link href="..." rel="alternate"/>`.
fn take_href(e: &BytesStart<'_>, entry: &mut FeedEntry) {
    if !entry.link.is_empty() {
        return;
    }
    let mut href = None;
    let mut rel = None;
    for attr in e.attributes().flatten() {
        let value = unescape_lossy(&String::from_utf8_lossy(&attr.value)).into_owned();
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(value),
            b"rel" => rel = Some(value),
            _ => {}
        }
    }
    if let Some(href) = href {
        if rel.as_deref().is_none_or(|r| r == "alternate") {
            entry.link = href.trim().to_string();
        }
    }
}

fn unescape_lossy(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }
    match quick_xml::escape::unescape(raw) {
        Ok(s) => s,
        Err(_) => Cow::Borrowed(raw),
    }
}

/// Resolve `&name;` reported outside of text.
fn resolve_entity(name: &str) -> String {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => num.parse::<u32>().ok(),
        };
        return code
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default();
    }
    if let Some(s) = quick_xml::escape::resolve_predefined_entity(name) {
        return s.to_string();
    }
    match name {
        "nbsp" => " ",
        "ndash" | "mdash" => "-",
        "ldquo" | "rdquo" => "\"",
        "lsquo" | "rsquo" => "'",
        "hellip" => "...",
        _ => "",
    }
    .to_string()
}

/// Strictly parse a structured feed date (RFC 2822 or RFC 3339).
fn parse_structured(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%a, %d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S %z",
];

/// Offset-less formats are read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%a, %d %b %Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

/// Best-effort parse of a free-text date.
pub fn parse_free_text(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(dt) = parse_structured(raw) {
        return Some(dt);
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

/// Resolve an entry's publish time: structured published, then structured
/// updated, then free-text parsing of the published, updated and date fields.
pub fn resolve_timestamp(entry: &FeedEntry) -> Option<DateTime<Utc>> {
    entry
        .published
        .as_deref()
        .and_then(parse_structured)
        .or_else(|| entry.updated.as_deref().and_then(parse_structured))
        .or_else(|| {
            [&entry.published, &entry.updated, &entry.date]
                .into_iter()
                .flatten()
                .find_map(|raw| parse_free_text(raw))
        })
}

/// Whether an entry stamped `published` is recent enough relative to `now`.
///
/// Entries without a date are assumed recent.
pub fn is_recent(published: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    let cutoff = now - TimeDelta::hours(RECENT_WINDOW_HOURS);
    published.is_none_or(|ts| ts >= cutoff)
}

fn resolve_link(base: Option<&Url>, link: &str) -> Option<String> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }
    match base {
        Some(base) => base.join(link).ok().map(|u| u.to_string()),
        None => Url::parse(link).ok().map(|u| u.to_string()),
    }
}

/// Turn parsed entries into candidates, applying the scan cap, recency
/// filter, and `limit`.
pub fn select_candidates(
    source: &Source,
    entries: &[FeedEntry],
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<Candidate> {
    let base = Url::parse(&source.base_url).ok();
    let mut candidates = Vec::new();

    for entry in entries.iter().take(limit.saturating_mul(SCAN_FACTOR)) {
        let Some(url) = resolve_link(base.as_ref(), &entry.link) else {
            debug!(title = %entry.title, "Entry without usable link");
            continue;
        };
        let published = resolve_timestamp(entry);
        if !is_recent(published, now) {
            continue;
        }
        let title = if entry.title.is_empty() {
            "No title".to_string()
        } else {
            entry.title.clone()
        };
        candidates.push(Candidate {
            url,
            title,
            source: source.name.clone(),
            published,
        });
        if candidates.len() >= limit {
            break;
        }
    }

    candidates
}

/// Read one source, falling back through its endpoints until one yields
/// candidates.
///
/// # Arguments
///
/// * `fetcher` - Client used for the feed requests
/// * `source` - Outlet whose `feeds` are tried in order
/// * `limit` - Most candidates to keep from the first working endpoint
/// * `timeout` - Per-request timeout
/// * `now` - Reference time for the 24 hour recency window
///
/// # Returns
///
/// Candidates from the first endpoint that yields any, or an empty vector
/// when every endpoint fails or yields nothing recent.
#[instrument(level = "info", skip_all, fields(source = %source.name))]
pub async fn read_source<F: Fetch>(
    fetcher: &F,
    source: &Source,
    limit: usize,
    timeout: Duration,
    now: DateTime<Utc>,
) -> Vec<Candidate> {
    for endpoint in &source.feeds {
        let page = match fetcher.fetch(endpoint, timeout).await {
            Ok(page) => page,
            Err(e) => {
                warn!(%endpoint, error = %e, "Failed to fetch feed; trying next endpoint");
                continue;
            }
        };

        if page.is_html() {
            warn!(
                %endpoint,
                content_type = page.content_type.as_deref().unwrap_or_default(),
                "Received HTML instead of a feed; trying next endpoint"
            );
            continue;
        }

        let entries = parse_feed(&page.body);
        if entries.is_empty() {
            warn!(%endpoint, "No entries found; trying next endpoint");
            continue;
        }

        let candidates = select_candidates(source, &entries, limit, now);
        info!(
            %endpoint,
            entries = entries.len(),
            recent = candidates.len(),
            "Processed feed"
        );
        if !candidates.is_empty() {
            return candidates;
        }
        warn!(%endpoint, "No recent articles; trying next endpoint");
    }

    warn!("No articles found from any endpoint");
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::StaticFetcher;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-05-06T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn rss_date(hours_ago: i64) -> String {
        (now() - TimeDelta::hours(hours_ago)).to_rfc2822()
    }

    fn rss(items: &[(&str, &str, Option<String>)]) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>Kênh</title><link>https://x.example</link>"#,
        );
        for (title, link, date) in items {
            xml.push_str("<item>");
            xml.push_str(&format!("<title>{title}</title><link>{link}</link>"));
            if let Some(date) = date {
                xml.push_str(&format!("<pubDate>{date}</pubDate>"));
            }
            xml.push_str("</item>");
        }
        xml.push_str("</channel></rss>");
        xml
    }

    fn source(feeds: &[&str]) -> Source {
        Source {
            name: "X".to_string(),
            feeds: feeds.iter().map(|s| s.to_string()).collect(),
            base_url: "https://x.example".to_string(),
        }
    }

    #[test]
    fn test_parse_rss_items() {
        let xml = rss(&[
            ("Một", "https://x.example/1", Some(rss_date(1))),
            ("Hai", "https://x.example/2", None),
        ]);
        let entries = parse_feed(&xml);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "Một");
        assert_eq!(entries[0].link, "https://x.example/1");
        assert!(entries[0].published.is_some());
        assert_eq!(entries[1].published, None);
    }

    #[test]
    fn test_parse_atom_entries() {
        let xml = r#"<?xml version="1.0"?>
            <feed xmlns="http://www.w3.org/2005/Atom">
              <title>Feed</title>
              <link href="https://x.example/" rel="self"/>
              <entry>
                <title>Tin A</title>
                <link rel="enclosure" href="https://x.example/a.jpg"/>
                <link href="https://x.example/a"/>
                <updated>2025-05-06T10:00:00Z</updated>
              </entry>
            </feed>"#;
        let entries = parse_feed(xml);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].link, "https://x.example/a");
        assert_eq!(entries[0].updated.as_deref(), Some("2025-05-06T10:00:00Z"));
    }

    #[test]
    fn test_parse_cdata_and_entities() {
        let xml = r#"<rss><channel><item>
            <title><![CDATA[Cháy & nổ]]></title>
            <link>https://x.example/a?x=1&amp;y=2</link>
            <dc:date>2025-05-06</dc:date>
            </item>
            <item><title>An &amp; Bình</title><link>https://x.example/b</link></item>
            </channel></rss>"#;
        let entries = parse_feed(xml);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].title, "An & Bình");
        assert_eq!(entries[0].title, "Cháy & nổ");
        assert_eq!(entries[0].link, "https://x.example/a?x=1&y=2");
        assert_eq!(entries[0].date.as_deref(), Some("2025-05-06"));
    }

    #[test]
    fn test_parse_truncated_feed_keeps_complete_items() {
        let xml = r#"<rss><channel>
            <item><title>A</title><link>https://x.example/a</link></item>
            <item><title>B</title><link>https://x.example/b</link></item>
            <item><title>C</title><link>https://x.exa"#;
        let entries = parse_feed(xml);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].title, "B");
    }

    #[test]
    fn test_parse_garbage_yields_nothing() {
        assert!(parse_feed("<html><body><p>Not a feed</p></body></html>").is_empty());
        assert!(parse_feed("").is_empty());
    }

    #[test]
    fn test_resolve_timestamp_order() {
        let entry = FeedEntry {
            published: Some("not a date".to_string()),
            updated: Some("2025-05-06T10:00:00Z".to_string()),
            ..FeedEntry::default()
        };
        assert_eq!(
            resolve_timestamp(&entry).unwrap().to_rfc3339(),
            "2025-05-06T10:00:00+00:00"
        );

        let entry = FeedEntry {
            date: Some("2025-05-06 09:30:00".to_string()),
            ..FeedEntry::default()
        };
        assert_eq!(
            resolve_timestamp(&entry).unwrap().to_rfc3339(),
            "2025-05-06T09:30:00+00:00"
        );

        assert_eq!(resolve_timestamp(&FeedEntry::default()), None);
    }

    #[test]
    fn test_free_text_formats() {
        assert!(parse_free_text("Tue, 06 May 2025 08:00:00 +0700").is_some());
        assert!(parse_free_text("06/05/2025 08:00").is_some());
        assert!(parse_free_text("2025-05-06").is_some());
        assert!(parse_free_text("hôm qua").is_none());
    }

    #[test]
    fn test_is_recent() {
        assert!(is_recent(None, now()));
        assert!(is_recent(Some(now() - TimeDelta::hours(2)), now()));
        assert!(!is_recent(Some(now() - TimeDelta::hours(30)), now()));
    }

    #[test]
    fn test_relative_links_resolved() {
        let entries = vec![FeedEntry {
            title: "T".to_string(),
            link: "/thoi-su/a.html".to_string(),
            ..FeedEntry::default()
        }];
        let candidates = select_candidates(&source(&[]), &entries, 10, now());
        assert_eq!(candidates[0].url, "https://x.example/thoi-su/a.html");
    }

    #[test]
    fn test_scan_cap_and_limit() {
        let entries: Vec<FeedEntry> = (0..20)
            .map(|i| FeedEntry {
                title: format!("T{i}"),
                link: format!("https://x.example/{i}"),
                // first ten are stale
                published: Some(rss_date(if i < 10 { 48 } else { 1 })),
                ..FeedEntry::default()
            })
            .collect();
        // limit 2 scans 10 entries: all stale
        assert!(select_candidates(&source(&[]), &entries, 2, now()).is_empty());
        // limit 3 scans 15 entries and stops at 3
        let picked = select_candidates(&source(&[]), &entries, 3, now());
        let titles: Vec<_> = picked.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["T10", "T11", "T12"]);
    }

    #[tokio::test]
    async fn test_recency_scenario_keeps_order() {
        let xml = rss(&[
            ("Hai giờ", "https://x.example/a", Some(rss_date(2))),
            ("Ba mươi giờ", "https://x.example/b", Some(rss_date(30))),
            ("Không ngày", "https://x.example/c", None),
        ]);
        let fetcher = StaticFetcher::new().with_feed("https://x.example/rss", &xml);
        let got = read_source(&fetcher, &source(&["https://x.example/rss"]), 50, Duration::ZERO, now()).await;
        let urls: Vec<_> = got.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x.example/a", "https://x.example/c"]);
        assert!(got[0].published.is_some());
        assert_eq!(got[1].published, None);
        assert!(got.iter().all(|c| c.source == "X"));
    }

    #[tokio::test]
    async fn test_html_endpoint_falls_back() {
        let items: Vec<(String, String)> = (0..5)
            .map(|i| (format!("Tin {i}"), format!("https://x.example/{i}")))
            .collect();
        let refs: Vec<(&str, &str, Option<String>)> = items
            .iter()
            .map(|(t, l)| (t.as_str(), l.as_str(), None))
            .collect();
        let fetcher = StaticFetcher::new()
            .with_html("https://x.example/a.rss", &rss(&refs))
            .with_feed("https://x.example/b.rss", &rss(&refs));
        let got = read_source(
            &fetcher,
            &source(&["https://x.example/a.rss", "https://x.example/b.rss"]),
            50,
            Duration::ZERO,
            now(),
        )
        .await;
        assert_eq!(got.len(), 5);
        // A was fetched once and never fetched again for extraction.
        assert_eq!(
            fetcher.requests(),
            vec!["https://x.example/a.rss", "https://x.example/b.rss"]
        );
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let a = rss(&[("A", "https://x.example/a", None)]);
        let b = rss(&[("B", "https://x.example/b", None)]);
        let fetcher = StaticFetcher::new()
            .with_feed("https://x.example/a.rss", &a)
            .with_feed("https://x.example/b.rss", &b);
        let got = read_source(
            &fetcher,
            &source(&["https://x.example/a.rss", "https://x.example/b.rss"]),
            50,
            Duration::ZERO,
            now(),
        )
        .await;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].title, "A");
        assert_eq!(fetcher.requests(), vec!["https://x.example/a.rss"]);
    }

    #[tokio::test]
    async fn test_stale_endpoint_falls_through() {
        let stale = rss(&[("Cũ", "https://x.example/old", Some(rss_date(72)))]);
        let fresh = rss(&[("Mới", "https://x.example/new", Some(rss_date(1)))]);
        let fetcher = StaticFetcher::new()
            .with_feed("https://x.example/a.rss", &stale)
            .with_feed("https://x.example/b.rss", &fresh);
        let got = read_source(
            &fetcher,
            &source(&["https://x.example/a.rss", "https://x.example/b.rss"]),
            50,
            Duration::ZERO,
            now(),
        )
        .await;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].title, "Mới");
    }

    #[tokio::test]
    async fn test_all_endpoints_fail_is_empty() {
        let fetcher = StaticFetcher::new().with_feed("https://x.example/bad.rss", "<<<not xml");
        let got = read_source(
            &fetcher,
            &source(&["https://x.example/missing.rss", "https://x.example/bad.rss"]),
            50,
            Duration::ZERO,
            now(),
        )
        .await;
        assert!(got.is_empty());
    }
}
