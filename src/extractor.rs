//! Full-text article extraction from news pages.
//!
//! Pages are fetched through [`Fetch`] and parsed with `scraper`. The body is
//! located by trying a list of container selectors from most to least
//! specific (site-specific article classes first, generic `article` and
//! `*content*` containers last). Inside a container, scripts, links, buttons
//! and popup/share/confirmation blocks are ignored, and only paragraphs that
//! pass the [`ContentFilter`] are kept.
//!
//! A page whose final body is shorter than 100 characters is rejected.

use crate::fetcher::{Fetch, FetchError};
use crate::models::ExtractedContent;
use crate::text::{ContentFilter, clean_sentence};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Element;
use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Body length, in characters, at which selector scanning stops.
pub const ENOUGH_BODY_CHARS: usize = 200;
/// Bodies shorter than this are rejected as unextractable.
pub const MIN_BODY_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("extracted body too short ({chars} chars)")]
    TooShort { chars: usize },
}

const CONTENT_SELECTORS: &[&str] = &[
    "article.fck_detail",
    "div.fck_detail",
    "div.singular-content",
    "div.dt-news__content",
    "div.ArticleContent",
    "div.article-content",
    "div#main-detail-content",
    "div.detail-content",
    "div.detail-content-body",
    "div.cate-24h-content-detail",
    "article",
    r#"div[class*="content"]"#,
    r#"div[class*="article"]"#,
];

const DATE_METAS: &[(&str, &str)] = &[
    ("property", "article:published_time"),
    ("property", "og:updated_time"),
    ("name", "pubdate"),
    ("name", "date"),
    ("itemprop", "datePublished"),
];

const STRIPPED_TAGS: &[&str] = &["script", "style", "iframe", "noscript", "button", "a"];

static POPUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)popup|modal|share|save|button|action|system|success|confirm|notification")
        .unwrap()
});

static CONTAINERS: Lazy<Vec<Selector>> = Lazy::new(|| {
    CONTENT_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").unwrap());
static DATE_META_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    DATE_METAS
        .iter()
        .map(|(attr, value)| Selector::parse(&format!(r#"meta[{attr}="{value}"]"#)).unwrap())
        .collect()
});

/// Fetch `url` and extract its article content.
#[instrument(level = "debug", skip_all, fields(%url))]
pub async fn extract<F: Fetch>(
    fetcher: &F,
    url: &str,
    timeout: Duration,
    filter: &ContentFilter,
) -> Result<ExtractedContent, ExtractError> {
    let page = fetcher.fetch(url, timeout).await?;
    parse_article(&page.body, url, filter)
}

/// Extract title, body and publish date from an HTML document.
pub fn parse_article(
    html: &str,
    url: &str,
    filter: &ContentFilter,
) -> Result<ExtractedContent, ExtractError> {
    let document = Html::parse_document(html);

    let title = extract_title(&document);
    let body = extract_body(&document, filter);
    let publish_date = extract_publish_date(&document);

    let chars = body.chars().count();
    if chars < MIN_BODY_CHARS {
        debug!(chars, "Content too short");
        return Err(ExtractError::TooShort { chars });
    }
    debug!(chars, %title, "Extracted article");

    Ok(ExtractedContent {
        title,
        body,
        publish_date,
        url: url.to_string(),
    })
}

fn extract_title(document: &Html) -> String {
    let h1 = document
        .select(&H1)
        .next()
        .map(|el| clean_sentence(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty());
    h1.or_else(|| {
        document
            .select(&TITLE)
            .next()
            .map(|el| clean_sentence(&el.text().collect::<String>()))
    })
    .unwrap_or_default()
}

fn extract_body(document: &Html, filter: &ContentFilter) -> String {
    let mut body = String::new();

    for selector in CONTAINERS.iter() {
        let Some(container) = document.select(selector).next() else {
            continue;
        };
        let texts: Vec<String> = container
            .select(&PARAGRAPH)
            .filter(|p| !hidden_within(p, Some(container)))
            .map(paragraph_text)
            .filter(|t| filter.is_content(t))
            .collect();
        body = texts.join(" ");
        if body.chars().count() > ENOUGH_BODY_CHARS {
            return body;
        }
    }

    // Not enough from any container: scan every paragraph on the page.
    let texts: Vec<String> = document
        .select(&PARAGRAPH)
        .filter(|p| !hidden_within(p, None))
        .map(paragraph_text)
        .filter(|t| filter.is_content(t))
        .collect();
    let fallback = texts.join(" ");
    if fallback.chars().count() >= body.chars().count() {
        fallback
    } else {
        body
    }
}

fn extract_publish_date(document: &Html) -> String {
    for selector in DATE_META_SELECTORS.iter() {
        let content = document
            .select(selector)
            .filter_map(|el| el.value().attr("content"))
            .map(str::trim)
            .find(|c| !c.is_empty());
        if let Some(content) = content {
            return content.to_string();
        }
    }

    document
        .select(&TIME)
        .next()
        .map(|el| match el.value().attr("datetime").map(str::trim) {
            Some(dt) if !dt.is_empty() => dt.to_string(),
            _ => clean_sentence(&el.text().collect::<String>()),
        })
        .unwrap_or_default()
}

fn is_stripped(el: &Element) -> bool {
    STRIPPED_TAGS.contains(&el.name())
}

/// A `div` or `section` is a popup when its class or its id matches. Either
/// attribute alone is enough, since many outlets name dialogs only by id.
fn is_popup(el: &Element) -> bool {
    matches!(el.name(), "div" | "section")
        && (el.attr("class").is_some_and(|c| POPUP.is_match(c))
            || el.attr("id").is_some_and(|i| POPUP.is_match(i)))
}

/// Whether a paragraph sits inside an ignored element.
///
/// With a container, popup blocks between the paragraph and the container
/// also hide it; without one, only stripped tags do.
fn hidden_within(p: &ElementRef<'_>, container: Option<ElementRef<'_>>) -> bool {
    let stop = container.map(|c| c.id());
    p.ancestors()
        .take_while(|node| Some(node.id()) != stop)
        .filter_map(|node| node.value().as_element())
        .any(|el| is_stripped(el) || (stop.is_some() && is_popup(el)))
}

/// Visible text of a paragraph, skipping text under stripped tags.
fn paragraph_text(p: ElementRef<'_>) -> String {
    let root = p.id();
    let mut out = String::new();
    for node in p.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .take_while(|a| a.id() != root)
            .filter_map(|a| a.value().as_element())
            .any(is_stripped);
        if hidden {
            continue;
        }
        out.push_str(text);
        out.push(' ');
    }
    clean_sentence(&out)
}
