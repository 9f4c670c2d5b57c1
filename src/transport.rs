//! Page retrieval with retry and backoff.
//!
//! The pipeline only depends on the [`Transport`] shape: a static fetch and a
//! rendered fetch, each yielding an HTTP status and a body. How pages are
//! actually retrieved stays behind this seam.
//!
//! # Architecture
//!
//! - [`Transport`]: core trait defining the two fetch operations
//! - [`HttpTransport`]: `reqwest` for static pages, a headless rendering
//!   service for script-populated pages
//! - [`RetryTransport`]: decorator that adds retry logic to any `Transport`
//!
//! # Retry Strategy
//!
//! - Transport errors and 5xx statuses are retried; 4xx statuses are not
//! - Exponential backoff starting at `base_delay`, capped at 10 seconds
//! - Random jitter (0-250ms) added to spread out retries

use crate::error::FetchError;
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};
use url::Url;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// What a rendered fetch waits for before the page is snapshotted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    /// Wait until network activity settles.
    NetworkIdle,
    /// Wait until an element matching the CSS selector exists.
    Selector(String),
}

impl WaitCondition {
    pub fn from_selector(selector: Option<&str>) -> Self {
        match selector {
            Some(s) if !s.trim().is_empty() => WaitCondition::Selector(s.to_string()),
            _ => WaitCondition::NetworkIdle,
        }
    }
}

/// Status and body of a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    #[cfg(test)]
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The two retrieval operations the pipeline needs.
pub trait Transport {
    /// Retrieve a page as served.
    async fn fetch_static(&self, url: &str) -> Result<FetchResponse, FetchError>;

    /// Retrieve a page after client-side scripts have populated it.
    async fn fetch_rendered(
        &self,
        url: &str,
        wait: &WaitCondition,
    ) -> Result<FetchResponse, FetchError>;
}

/// `reqwest`-backed transport.
///
/// Rendered fetches are delegated to a headless rendering service that
/// accepts `GET {endpoint}?url=<page>&waitFor=<selector>` and answers with
/// the rendered HTML (browserless-style `/content` endpoints work). Without
/// an endpoint, rendered fetches fail with
/// [`FetchError::RendererUnavailable`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    render_endpoint: Option<Url>,
}

impl HttpTransport {
    /// Build the HTTP client.
    ///
    /// # Arguments
    ///
    /// * `request_timeout` - Limit for each request, rendered fetches included.
    /// * `render_endpoint` - Base URL of the rendering service, if any.
    ///
    /// # Returns
    ///
    /// An error if the client cannot be built or the endpoint is not a URL.
    pub fn new(
        request_timeout: StdDuration,
        render_endpoint: Option<&str>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()?;
        let render_endpoint = render_endpoint.map(Url::parse).transpose()?;
        Ok(Self {
            client,
            render_endpoint,
        })
    }

    async fn get(&self, url: &str, display_url: &str) -> Result<FetchResponse, FetchError> {
        let transport_err = |e: reqwest::Error| FetchError::Transport {
            url: display_url.to_string(),
            reason: e.to_string(),
        };
        let response = self.client.get(url).send().await.map_err(transport_err)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_err)?;
        Ok(FetchResponse { status, body })
    }
}

impl Transport for HttpTransport {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_static(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.get(url, url).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_rendered(
        &self,
        url: &str,
        wait: &WaitCondition,
    ) -> Result<FetchResponse, FetchError> {
        let Some(endpoint) = &self.render_endpoint else {
            return Err(FetchError::RendererUnavailable {
                url: url.to_string(),
            });
        };
        let mut render_url = endpoint.clone();
        {
            let mut query = render_url.query_pairs_mut();
            query.append_pair("url", url);
            if let WaitCondition::Selector(selector) = wait {
                query.append_pair("waitFor", selector);
            }
        }
        self.get(render_url.as_str(), url).await
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Transport`].
///
/// The delay between retries follows:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryTransport<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryTransport<T>
where
    T: Transport,
{
    /// Wrap `inner` with retries.
    ///
    /// # Arguments
    ///
    /// * `inner` - The transport doing the actual fetches.
    /// * `max_retries` - Attempts after the first; `0` disables retrying.
    /// * `base_delay` - First backoff, doubled per attempt up to 10 seconds,
    ///   plus up to 250 ms of jitter.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let transport = RetryTransport::new(
    ///     HttpTransport::new(Duration::from_secs(60), None)?,
    ///     2,
    ///     Duration::from_millis(500),
    /// );
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(10),
        }
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt - 1).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1u32 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }

    async fn with_retries<F, Fut>(&self, url: &str, op: F) -> Result<FetchResponse, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<FetchResponse, FetchError>>,
    {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let outcome = op().await;
            let retryable = match &outcome {
                Ok(resp) => resp.status >= 500,
                Err(FetchError::RendererUnavailable { .. }) => false,
                Err(_) => true,
            };
            if !retryable {
                return outcome;
            }

            attempt += 1;
            if attempt > self.max_retries {
                error!(
                    %url,
                    attempt,
                    max = self.max_retries,
                    elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                    "fetch exhausted retries"
                );
                return outcome;
            }

            let delay = self.backoff(attempt);
            match &outcome {
                Ok(resp) => warn!(%url, attempt, status = resp.status, ?delay, "server error; backing off"),
                Err(e) => warn!(%url, attempt, error = %e, ?delay, "fetch failed; backing off"),
            }
            sleep(delay).await;
        }
    }
}

impl<T> fmt::Debug for RetryTransport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryTransport")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> Transport for RetryTransport<T>
where
    T: Transport,
{
    async fn fetch_static(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let res = self.with_retries(url, move || self.inner.fetch_static(url)).await;
        debug!(%url, ok = res.is_ok(), "static fetch finished");
        res
    }

    async fn fetch_rendered(
        &self,
        url: &str,
        wait: &WaitCondition,
    ) -> Result<FetchResponse, FetchError> {
        let res = self
            .with_retries(url, move || self.inner.fetch_rendered(url, wait))
            .await;
        debug!(%url, ok = res.is_ok(), "rendered fetch finished");
        res
    }
}

/// Scripted in-memory transport for tests.
#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub enum Reply {
        Page(FetchResponse),
        Fail(FetchError),
        /// Never answers; exercises timeouts.
        Hang,
    }

    /// Replies are looked up by exact URL; unknown URLs answer 404.
    #[derive(Debug, Default)]
    pub struct StubTransport {
        replies: HashMap<String, Vec<Reply>>,
        calls: Mutex<Vec<(String, bool)>>,
    }

    impl StubTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(self, url: &str, body: impl Into<String>) -> Self {
            self.reply(url, Reply::Page(FetchResponse::ok(body)))
        }

        pub fn status(self, url: &str, status: u16) -> Self {
            self.reply(
                url,
                Reply::Page(FetchResponse {
                    status,
                    body: String::new(),
                }),
            )
        }

        pub fn hang(self, url: &str) -> Self {
            self.reply(url, Reply::Hang)
        }

        /// Queue a reply. Several replies for one URL are served in order,
        /// the last one repeating.
        pub fn reply(mut self, url: &str, reply: Reply) -> Self {
            self.replies.entry(url.to_string()).or_default().push(reply);
            self
        }

        /// Requested URLs with whether the rendered path was used.
        pub fn calls(&self) -> Vec<(String, bool)> {
            self.calls.lock().unwrap().clone()
        }

        async fn answer(&self, url: &str, rendered: bool) -> Result<FetchResponse, FetchError> {
            let seen = {
                let mut calls = self.calls.lock().unwrap();
                let seen = calls.iter().filter(|(u, _)| u == url).count();
                calls.push((url.to_string(), rendered));
                seen
            };
            let reply = self
                .replies
                .get(url)
                .map(|queue| queue[seen.min(queue.len() - 1)].clone());
            match reply {
                Some(Reply::Page(resp)) => Ok(resp),
                Some(Reply::Fail(e)) => Err(e),
                Some(Reply::Hang) => std::future::pending().await,
                None => Ok(FetchResponse {
                    status: 404,
                    body: String::new(),
                }),
            }
        }
    }

    impl Transport for StubTransport {
        async fn fetch_static(&self, url: &str) -> Result<FetchResponse, FetchError> {
            self.answer(url, false).await
        }

        async fn fetch_rendered(
            &self,
            url: &str,
            _wait: &WaitCondition,
        ) -> Result<FetchResponse, FetchError> {
            self.answer(url, true).await
        }
    }
}
