//! HTTP retrieval of shared conversation pages.
//!
//! The pipeline never touches the network; this module fetches the raw
//! HTML, applies retry with a growing delay, and rejects response bodies
//! that cannot be a real share page (anti-bot interstitials, truncated or
//! garbled payloads) so that retries re-fetch instead of re-parsing junk.

use crate::error::FetchError;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Browser-like User-Agent; the share endpoint serves bot clients a
/// stripped or garbled page
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Connect timeout, separate from the configurable body timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A real share page is never this small
const MIN_BODY_BYTES: usize = 1000;

/// Fetch configuration
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Total per-attempt timeout (default 30 s)
    pub timeout: Duration,
    /// Maximum attempts per URL (default 3)
    pub max_retries: u32,
    /// Base delay between attempts; attempt `n` waits `delay * n` (default 1 s)
    pub delay: Duration,
    /// Custom User-Agent
    pub user_agent: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            delay: Duration::from_secs(1),
            user_agent: None,
        }
    }
}

/// Check whether a URL is a Poe share link
pub fn is_share_url(url: &str) -> bool {
    conversation_id(url).is_some()
}

/// Extract the conversation id from a share URL like
/// `https://poe.com/s/vtYxbVcTZH5pVoi166Lr`
pub fn conversation_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    if host != "poe.com" && host != "www.poe.com" {
        return None;
    }
    let id = parsed.path().strip_prefix("/s/")?;
    if id.is_empty()
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return None;
    }
    Some(id.to_string())
}

/// Fetch a share page with default options
pub async fn fetch_share_page(url: &str) -> Result<String, FetchError> {
    fetch_share_page_with_options(url, &FetchOptions::default()).await
}

/// Fetch a share page, validating the URL first.
///
/// Retries re-fetch the page; they never re-parse identical HTML.
pub async fn fetch_share_page_with_options(
    url: &str,
    options: &FetchOptions,
) -> Result<String, FetchError> {
    if !is_share_url(url) {
        return Err(FetchError::InvalidShareUrl(url.to_string()));
    }
    fetch_page(url, options).await
}

/// Fetch any URL with retry and body validation.
///
/// Exposed separately from [`fetch_share_page_with_options`] so the
/// validation-free path stays testable against a local server.
pub async fn fetch_page(url: &str, options: &FetchOptions) -> Result<String, FetchError> {
    let client = build_client(options)?;
    let attempts = options.max_retries.max(1);
    let mut last_error = FetchError::Timeout;

    for attempt in 1..=attempts {
        if attempt > 1 {
            let backoff = options.delay * (attempt - 1);
            debug!(attempt, ?backoff, "waiting before retry");
            tokio::time::sleep(backoff).await;
        }
        info!(url, attempt, attempts, "fetching page");

        match attempt_fetch(&client, url, options.timeout).await {
            Ok(html) => {
                info!(url, bytes = html.len(), "fetched page");
                return Ok(html);
            }
            Err(err) => {
                warn!(url, attempt, %err, "fetch attempt failed");
                last_error = err;
            }
        }
    }

    Err(FetchError::RetriesExhausted {
        url: url.to_string(),
        attempts,
        source: Box::new(last_error),
    })
}

fn build_client(options: &FetchOptions) -> Result<reqwest::Client, FetchError> {
    let mut headers = HeaderMap::new();
    let user_agent = options.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_USER_AGENT)),
    );
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(options.timeout)
        .build()
        .map_err(FetchError::ClientBuildError)
}

async fn attempt_fetch(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<String, FetchError> {
    let response = client.get(url).send().await.map_err(FetchError::from_reqwest)?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }

    let body = read_body_with_deadline(response, timeout).await?;
    let html = String::from_utf8_lossy(&body).to_string();
    validate_body(&html)?;
    Ok(html)
}

/// Stream the body under a deadline.
///
/// A partial page cannot be parsed, so hitting the deadline fails the
/// attempt and the retry loop re-fetches from scratch.
async fn read_body_with_deadline(
    response: reqwest::Response,
    timeout: Duration,
) -> Result<Bytes, FetchError> {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        tokio::select! {
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => body.extend_from_slice(&bytes),
                Some(Err(err)) => return Err(FetchError::from_reqwest(err)),
                None => return Ok(Bytes::from(body)),
            },
            _ = tokio::time::sleep_until(deadline) => {
                warn!("body deadline reached");
                return Err(FetchError::Timeout);
            }
        }
    }
}

/// Reject bodies that cannot be a real conversation page
fn validate_body(html: &str) -> Result<(), FetchError> {
    if html.len() < MIN_BODY_BYTES {
        return Err(FetchError::SuspiciousContent("body_too_short"));
    }

    let head: String = html.chars().take(500).collect();
    if head.contains("403") || head.contains("Access Denied") {
        return Err(FetchError::SuspiciousContent("access_denied"));
    }

    let probe: String = html.chars().take(1000).collect();
    if !is_mostly_printable(&probe) {
        return Err(FetchError::SuspiciousContent("unprintable_body"));
    }

    let lower = html.to_ascii_lowercase();
    if !lower.contains("<html") || !lower.contains("</html>") {
        return Err(FetchError::SuspiciousContent("not_html"));
    }

    Ok(())
}

/// Anti-bot responses show up as mostly-unprintable garbage
fn is_mostly_printable(text: &str) -> bool {
    let total = text.chars().count();
    if total == 0 {
        return false;
    }
    let printable = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .count();
    printable * 10 >= total * 8
}
