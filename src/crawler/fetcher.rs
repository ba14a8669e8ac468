//! HTTP fetcher implementation
//!
//! This module handles retrieval of page and resource bytes, including:
//! - Building the HTTP client with the configured identification string
//! - Static fetches over the network transport
//! - Dynamic fetches delegated to the render capability
//! - Retry with exponential backoff for transient failures
//! - Transient/permanent error classification

use crate::crawler::renderer::Renderer;
use crate::url::CanonicalUrl;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How a URL should be retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Plain network retrieval.
    Static,
    /// Delegate to the headless render capability.
    Dynamic,
}

/// Result of a successful fetch. Created per fetch and discarded after
/// extraction.
#[derive(Debug)]
pub struct FetchOutcome {
    /// The canonical URL that was requested.
    pub source_url: CanonicalUrl,

    /// Final URL after redirects.
    pub final_url: url::Url,

    /// Content-Type header value, empty if absent.
    pub content_type: String,

    /// Raw response body.
    pub body: Vec<u8>,

    /// Whether the dynamic path produced this outcome.
    pub rendered: bool,

    /// Resource URLs the render capability reported as loaded (dynamic
    /// mode only).
    pub reported_resources: Vec<String>,
}

impl FetchOutcome {
    pub fn is_html(&self) -> bool {
        self.content_type.contains("text/html")
    }

    pub fn is_css(&self) -> bool {
        self.content_type.contains("text/css")
    }

    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Whether a failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, connection error, 5xx, or 429: retried with backoff.
    Transient,
    /// Other 4xx or an unusable request: surfaced immediately.
    Permanent,
}

/// A fetch that did not produce usable content, after retries where the
/// policy allowed them. Non-fatal to the crawl: the scheduler records it
/// and moves on.
#[derive(Debug, Error)]
#[error("fetch failed for {url} after {attempts} attempt(s): {cause}")]
pub struct FetchError {
    pub url: String,
    pub attempts: u32,
    pub kind: FailureKind,
    /// HTTP status of the last response, when the failure was an HTTP
    /// error rather than a transport one.
    pub status: Option<u16>,
    pub cause: String,
}

/// Retry schedule for transient failures, kept separate from the fetch
/// path so the backoff behavior is unit-testable on its own.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,

    /// Delay before the first retry; doubles each retry.
    pub base_delay: Duration,

    /// Ceiling for the backoff delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration) -> Self {
        Self {
            max_retries: 3,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Total attempts including the initial one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Backoff before retry number `retry` (0-based): base delay doubled
    /// each time, capped at `max_delay`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        std::cmp::min(self.base_delay.saturating_mul(factor), self.max_delay)
    }

    /// HTTP statuses that are retried: server errors and 429 rate limits.
    pub fn is_transient_status(status: StatusCode) -> bool {
        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
    }
}

/// Builds the HTTP client used for every static fetch.
pub fn build_http_client(
    user_agent: &str,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

struct AttemptError {
    transient: bool,
    status: Option<u16>,
    cause: String,
}

/// Retrieves URLs via the static transport or the dynamic render
/// capability, applying the retry policy to transient failures.
pub struct Fetcher {
    client: Client,
    renderer: Option<Arc<dyn Renderer>>,
    retry: RetryPolicy,
    render_wait: Duration,
    user_agent: String,
}

impl Fetcher {
    pub fn new(client: Client, retry: RetryPolicy, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            renderer: None,
            retry,
            render_wait: Duration::from_secs(2),
            user_agent: user_agent.into(),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>, wait: Duration) -> Self {
        self.renderer = Some(renderer);
        self.render_wait = wait;
        self
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    /// Fetches a URL in the given mode.
    pub async fn fetch(
        &self,
        url: &CanonicalUrl,
        mode: FetchMode,
    ) -> Result<FetchOutcome, FetchError> {
        match mode {
            FetchMode::Static => self.fetch_static(url).await,
            FetchMode::Dynamic => self.fetch_dynamic(url).await,
        }
    }

    /// Fetches a page: static first, falling back to the dynamic path once
    /// when the static fetch died on an HTTP error and a renderer is
    /// available. Sites that refuse plain clients often still serve a
    /// browser engine.
    pub async fn fetch_page(&self, url: &CanonicalUrl) -> Result<FetchOutcome, FetchError> {
        match self.fetch_static(url).await {
            Ok(outcome) => Ok(outcome),
            Err(static_err) if static_err.status.is_some() && self.renderer.is_some() => {
                tracing::info!(
                    "static fetch of {} failed ({}), trying dynamic render",
                    url,
                    static_err.cause
                );
                self.fetch_dynamic(url).await.map_err(|mut render_err| {
                    render_err.cause = format!(
                        "{}; dynamic fallback also failed: {}",
                        static_err.cause, render_err.cause
                    );
                    render_err
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_static(&self, url: &CanonicalUrl) -> Result<FetchOutcome, FetchError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.try_get(url).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    if !err.transient || attempt >= self.retry.max_attempts() {
                        return Err(FetchError {
                            url: url.as_str().to_string(),
                            attempts: attempt,
                            kind: if err.transient {
                                FailureKind::Transient
                            } else {
                                FailureKind::Permanent
                            },
                            status: err.status,
                            cause: err.cause,
                        });
                    }
                    let delay = self.retry.backoff(attempt - 1);
                    tracing::debug!(
                        "transient failure for {} (attempt {}): {}; retrying in {:?}",
                        url,
                        attempt,
                        err.cause,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn try_get(&self, url: &CanonicalUrl) -> Result<FetchOutcome, AttemptError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError {
                transient: RetryPolicy::is_transient_status(status),
                status: Some(status.as_u16()),
                cause: format!("HTTP {}", status.as_u16()),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response
            .bytes()
            .await
            .map_err(classify_transport_error)?
            .to_vec();

        Ok(FetchOutcome {
            source_url: url.clone(),
            final_url,
            content_type,
            body,
            rendered: false,
            reported_resources: Vec::new(),
        })
    }

    async fn fetch_dynamic(&self, url: &CanonicalUrl) -> Result<FetchOutcome, FetchError> {
        let renderer = self.renderer.as_deref().ok_or_else(|| FetchError {
            url: url.as_str().to_string(),
            attempts: 1,
            kind: FailureKind::Permanent,
            status: None,
            cause: "dynamic fetch requested but no renderer is configured".to_string(),
        })?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match renderer
                .render(url.as_url(), self.render_wait, &self.user_agent)
                .await
            {
                Ok(rendered) => {
                    return Ok(FetchOutcome {
                        source_url: url.clone(),
                        final_url: url.as_url().clone(),
                        content_type: "text/html".to_string(),
                        body: rendered.html.into_bytes(),
                        rendered: true,
                        reported_resources: rendered.resource_urls,
                    })
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts() {
                        return Err(FetchError {
                            url: url.as_str().to_string(),
                            attempts: attempt,
                            kind: FailureKind::Transient,
                            status: None,
                            cause: e.to_string(),
                        });
                    }
                    let delay = self.retry.backoff(attempt - 1);
                    tracing::debug!(
                        "render of {} failed (attempt {}): {}; retrying in {:?}",
                        url,
                        attempt,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn classify_transport_error(e: reqwest::Error) -> AttemptError {
    let transient = e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode();
    AttemptError {
        transient,
        status: None,
        cause: if e.is_timeout() {
            "request timeout".to_string()
        } else {
            e.to_string()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::renderer::{RenderError, Rendered};
    use crate::url::normalize_start;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy_ms(base: u64) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(base))
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = policy_ms(100);
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_capped() {
        let mut policy = policy_ms(1000);
        policy.max_delay = Duration::from_secs(3);
        assert_eq!(policy.backoff(10), Duration::from_secs(3));
    }

    #[test]
    fn test_max_attempts_includes_initial() {
        assert_eq!(policy_ms(1).max_attempts(), 4);
    }

    #[test]
    fn test_transient_statuses() {
        assert!(RetryPolicy::is_transient_status(
            StatusCode::INTERNAL_SERVER_ERROR
        ));
        assert!(RetryPolicy::is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(RetryPolicy::is_transient_status(
            StatusCode::SERVICE_UNAVAILABLE
        ));
        assert!(RetryPolicy::is_transient_status(
            StatusCode::TOO_MANY_REQUESTS
        ));
        assert!(!RetryPolicy::is_transient_status(StatusCode::NOT_FOUND));
        assert!(!RetryPolicy::is_transient_status(StatusCode::FORBIDDEN));
        assert!(!RetryPolicy::is_transient_status(StatusCode::GONE));
    }

    #[test]
    fn test_build_http_client() {
        let client = build_http_client("TestAgent/1.0", Duration::from_secs(5));
        assert!(client.is_ok());
    }

    struct CountingRenderer {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl Renderer for CountingRenderer {
        async fn render(
            &self,
            url: &url::Url,
            _wait: Duration,
            _user_agent: &str,
        ) -> Result<Rendered, RenderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(RenderError {
                    url: url.to_string(),
                    message: "engine crashed".to_string(),
                })
            } else {
                Ok(Rendered {
                    html: "<html><body>rendered</body></html>".to_string(),
                    resource_urls: vec!["https://example.com/app.js".to_string()],
                })
            }
        }
    }

    fn test_fetcher() -> Fetcher {
        let client = build_http_client("TestAgent/1.0", Duration::from_secs(2)).unwrap();
        Fetcher::new(client, policy_ms(1), "TestAgent/1.0")
    }

    #[tokio::test]
    async fn test_dynamic_without_renderer_is_permanent() {
        let fetcher = test_fetcher();
        let url = normalize_start("https://example.com/").unwrap();

        let err = fetcher.fetch(&url, FetchMode::Dynamic).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Permanent);
        assert_eq!(err.attempts, 1);
    }

    #[tokio::test]
    async fn test_dynamic_render_retries_then_succeeds() {
        let renderer = Arc::new(CountingRenderer {
            calls: AtomicU32::new(0),
            fail_first: 2,
        });
        let fetcher = test_fetcher().with_renderer(renderer.clone(), Duration::from_millis(10));
        let url = normalize_start("https://example.com/").unwrap();

        let outcome = fetcher.fetch(&url, FetchMode::Dynamic).await.unwrap();
        assert!(outcome.rendered);
        assert!(outcome.is_html());
        assert_eq!(outcome.reported_resources.len(), 1);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dynamic_render_exhausts_retries() {
        let renderer = Arc::new(CountingRenderer {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
        });
        let fetcher = test_fetcher().with_renderer(renderer, Duration::from_millis(10));
        let url = normalize_start("https://example.com/").unwrap();

        let err = fetcher.fetch(&url, FetchMode::Dynamic).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Transient);
        assert_eq!(err.attempts, 4);
        assert!(err.cause.contains("engine crashed"));
    }

    // HTTP-level retry behavior is covered with a mock server in the
    // integration tests.
}
