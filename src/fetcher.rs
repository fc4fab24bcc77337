//! HTTP fetching with retry, exponential backoff, and rotating client identity.
//!
//! Everything that touches the network goes through the [`Fetch`] trait. The
//! production implementation is [`HttpFetcher`]; tests substitute an
//! in-memory fetcher so feed and extraction logic can run offline.
//!
//! # Retry Strategy
//!
//! - Up to 3 attempts per URL
//! - Any transport error or non-200 status counts as a failed attempt
//! - Delay between attempts doubles from a 1 second base
//! - Each attempt draws a random User-Agent from a fixed pool

use rand::{Rng, rng};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

/// Attempts made per URL before giving up.
pub const MAX_ATTEMPTS: usize = 3;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

const ACCEPT_VALUE: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE_VALUE: &str = "vi-VN,vi;q=0.9,en-US;q=0.8,en;q=0.7";

/// A failed fetch. Callers treat any variant as "this item is unavailable".
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A successfully fetched document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    /// Declared `Content-Type`, if any.
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchedPage {
    /// Whether the server declared an HTML payload.
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
    }
}

/// The single point of contact with the network.
pub trait Fetch {
    /// GET `url`, giving up on each attempt after `timeout`.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage, FetchError>;
}

/// Pick a User-Agent at random from the pool.
pub fn random_user_agent() -> &'static str {
    USER_AGENTS[rng().random_range(0..USER_AGENTS.len())]
}

/// Delay before the attempt following failed attempt number `attempt` (1-based).
pub fn backoff_delay(base: Duration, attempt: usize) -> Duration {
    base.saturating_mul(1 << (attempt.saturating_sub(1)).min(16))
}

/// Run `op` up to `attempts` times, sleeping with exponential backoff in between.
///
/// `op` receives the 1-based attempt number. The last error is returned when
/// every attempt fails.
pub async fn with_retries<T, Op, Fut>(
    attempts: usize,
    base_delay: Duration,
    mut op: Op,
) -> Result<T, FetchError>
where
    Op: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                let delay = backoff_delay(base_delay, attempt);
                warn!(attempt, max = attempts, ?delay, error = %e, "fetch attempt failed; backing off");
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// [`Fetch`] implementation backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_delay: Duration,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            client,
            base_delay: Duration::from_secs(1),
        })
    }

    async fn attempt(&self, url: &str, timeout: Duration) -> Result<FetchedPage, FetchError> {
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .header(USER_AGENT, random_user_agent())
            .header(ACCEPT, ACCEPT_VALUE)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        if resp.status() != StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await.map_err(|source| FetchError::Body {
            url: url.to_string(),
            source,
        })?;

        Ok(FetchedPage {
            url: final_url,
            content_type,
            body,
        })
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage, FetchError> {
        let t0 = Instant::now();
        let res = with_retries(MAX_ATTEMPTS, self.base_delay, |_| self.attempt(url, timeout)).await;
        match &res {
            Ok(page) => debug!(
                elapsed_ms = t0.elapsed().as_millis() as u64,
                bytes = page.body.len(),
                "Fetched"
            ),
            Err(e) => warn!(elapsed_ms = t0.elapsed().as_millis() as u64, error = %e, "Fetch gave up"),
        }
        res
    }
}
