//! # Retrying Fetcher
//!
//! One logical request, retried immediately on transport failure until the
//! number of failures exceeds `max_retries`. Every failure that is followed by
//! another attempt is kept on the outcome for diagnostics; the one that ends
//! the fetch is reported on its own.
//!
//! A non-2xx status is not a failure here. It comes back as an ordinary
//! [`FetchOutcome`] and the caller decides what it means.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::errors::{RelayError, RelayResult};

/// Header carrying the configured request signature.
pub const SIGNATURE_HEADER: &str = "x-feed-signature";

/// Knobs for the fetcher and its HTTP client.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Failures tolerated before giving up.
    pub max_retries: u32,
    /// Sent as `User-Agent` on every request.
    pub user_agent: String,
    /// Sent as `X-Feed-Signature` when present.
    pub signature: Option<String>,
    /// Connect, read and overall request timeout.
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_retries: 10,
            user_agent: concat!("feedrelay/", env!("CARGO_PKG_VERSION")).to_string(),
            signature: None,
            timeout: Duration::from_secs(300),
        }
    }
}

/// What a single transport attempt produced.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// The body, read in full, if capture was requested.
    pub body: Option<String>,
}

/// Performs one HTTP GET. Errors are transport-level failures and are retried.
#[async_trait]
pub trait HttpTransport: Send + Sync + fmt::Debug {
    /// Issues the request, reading the body only when `capture_body` is set.
    async fn get(&self, url: &Url, capture_body: bool) -> RelayResult<TransportResponse>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a client with the configured agent, signature and timeouts.
    pub fn new(options: &FetchOptions) -> RelayResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(signature) = &options.signature {
            let value = HeaderValue::from_str(signature)
                .map_err(|e| RelayError::Config(format!("signature header: {e}")))?;
            headers.insert(HeaderName::from_static(SIGNATURE_HEADER), value);
        }

        let client = reqwest::Client::builder()
            .user_agent(options.user_agent.as_str())
            .default_headers(headers)
            .connect_timeout(options.timeout)
            .read_timeout(options.timeout)
            .timeout(options.timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &Url, capture_body: bool) -> RelayResult<TransportResponse> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = if capture_body { Some(response.text().await?) } else { None };
        Ok(TransportResponse { status, headers, body })
    }
}

/// A completed fetch. The body can be taken out exactly once.
#[derive(Debug)]
pub struct FetchOutcome {
    status: u16,
    headers: HeaderMap,
    body: Option<String>,
    attempts: u32,
    prior_errors: Vec<RelayError>,
    elapsed: Duration,
}

impl FetchOutcome {
    /// HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Attempts made, the successful one included.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Failures that preceded the successful attempt.
    pub fn prior_errors(&self) -> &[RelayError] {
        &self.prior_errors
    }

    /// From the start of the first attempt to completion of the last.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Consumes the outcome, yielding the captured body.
    pub fn into_body(self) -> Option<String> {
        self.body
    }
}

/// A fetch that ran out of retries.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    /// The failure that ended the fetch.
    pub last: RelayError,
    /// Every earlier failure, oldest first.
    pub prior: Vec<RelayError>,
    /// Attempts made.
    pub attempts: u32,
    /// Time spent across all attempts.
    pub elapsed: Duration,
}

impl From<FetchFailure> for RelayError {
    fn from(f: FetchFailure) -> Self {
        RelayError::RetryExhausted { attempts: f.attempts, last: f.last.to_string() }
    }
}

/// Retry wrapper over an [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    max_retries: u32,
}

impl Fetcher {
    /// Wraps `transport`, tolerating up to `max_retries` failures.
    pub fn new(transport: Arc<dyn HttpTransport>, max_retries: u32) -> Self {
        Self { transport, max_retries }
    }

    /// Builds the production fetcher from options.
    pub fn from_options(options: &FetchOptions) -> RelayResult<Self> {
        Ok(Self::new(Arc::new(ReqwestTransport::new(options)?), options.max_retries))
    }

    /// The configured failure budget.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Runs the request, retrying on transport failures.
    pub async fn fetch(&self, url: &Url, capture_body: bool) -> Result<FetchOutcome, FetchFailure> {
        let started = Instant::now();
        let mut prior = Vec::new();
        let mut failures: u32 = 0;

        loop {
            match self.transport.get(url, capture_body).await {
                Ok(response) => {
                    let outcome = FetchOutcome {
                        status: response.status,
                        headers: response.headers,
                        body: response.body,
                        attempts: failures + 1,
                        prior_errors: prior,
                        elapsed: started.elapsed(),
                    };
                    tracing::debug!(
                        url = %url,
                        status = outcome.status,
                        attempts = outcome.attempts,
                        elapsed_ms = outcome.elapsed.as_millis() as u64,
                        "fetch complete"
                    );
                    return Ok(outcome);
                }
                Err(e) => {
                    failures += 1;
                    if failures > self.max_retries {
                        tracing::warn!(url = %url, attempts = failures, error = %e, "fetch gave up");
                        return Err(FetchFailure {
                            last: e,
                            prior,
                            attempts: failures,
                            elapsed: started.elapsed(),
                        });
                    }
                    tracing::debug!(url = %url, attempt = failures, error = %e, "fetch failed, retrying");
                    prior.push(e);
                }
            }
        }
    }

    /// Fetches a document body, treating a non-2xx status or missing body as an error.
    pub async fn fetch_text(&self, url: &Url) -> RelayResult<String> {
        let outcome = self.fetch(url, true).await?;
        if !outcome.is_success() {
            return Err(RelayError::Transport(format!("HTTP {} from {url}", outcome.status())));
        }
        outcome
            .into_body()
            .ok_or_else(|| RelayError::Transport(format!("empty body from {url}")))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport for unit tests.

    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays scripted results per URL, then repeats a fallback body forever.
    #[derive(Debug, Default)]
    pub struct ScriptedTransport {
        script: Mutex<VecDeque<RelayResult<TransportResponse>>>,
        bodies: Mutex<HashMap<String, String>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues `n` failures ahead of everything else.
        pub fn fail_times(self, n: usize) -> Self {
            {
                let mut script = self.script.lock().unwrap();
                for i in 0..n {
                    script.push_back(Err(RelayError::Transport(format!("failure {}", i + 1))));
                }
            }
            self
        }

        /// Serves `body` with status 200 for `url` once the script is exhausted.
        pub fn serve(&self, url: &str, body: &str) {
            self.bodies.lock().unwrap().insert(url.to_string(), body.to_string());
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn get(&self, url: &Url, capture_body: bool) -> RelayResult<TransportResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(next) = self.script.lock().unwrap().pop_front() {
                return next;
            }
            match self.bodies.lock().unwrap().get(url.as_str()) {
                Some(body) => Ok(TransportResponse {
                    status: 200,
                    headers: HeaderMap::new(),
                    body: capture_body.then(|| body.clone()),
                }),
                None => Ok(TransportResponse { status: 404, headers: HeaderMap::new(), body: None }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedTransport;
    use super::*;

    const URL: &str = "https://feeds.example.com/series/1.xml";

    fn fetcher(transport: ScriptedTransport, max_retries: u32) -> (Fetcher, Arc<ScriptedTransport>) {
        transport.serve(URL, "<rss/>");
        let transport = Arc::new(transport);
        (Fetcher::new(transport.clone(), max_retries), transport)
    }

    #[tokio::test]
    async fn succeeds_after_failures_within_budget() {
        let (fetcher, transport) = fetcher(ScriptedTransport::new().fail_times(3), 3);
        let outcome = fetcher.fetch(&Url::parse(URL).unwrap(), true).await.unwrap();

        assert_eq!(outcome.attempts(), 4);
        assert_eq!(outcome.prior_errors().len(), 3);
        assert_eq!(outcome.prior_errors()[0], RelayError::Transport("failure 1".into()));
        assert_eq!(transport.calls(), 4);
        assert_eq!(outcome.into_body().as_deref(), Some("<rss/>"));
    }

    #[tokio::test]
    async fn gives_up_with_the_failure_past_the_budget() {
        let (fetcher, transport) = fetcher(ScriptedTransport::new().fail_times(5), 2);
        let failure = fetcher.fetch(&Url::parse(URL).unwrap(), true).await.unwrap_err();

        assert_eq!(failure.last, RelayError::Transport("failure 3".into()));
        assert_eq!(failure.prior.len(), 2);
        assert_eq!(failure.attempts, 3);
        assert_eq!(transport.calls(), 3);
        assert!(matches!(RelayError::from(failure), RelayError::RetryExhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn zero_retries_means_one_attempt() {
        let (fetcher, transport) = fetcher(ScriptedTransport::new().fail_times(1), 0);
        assert!(fetcher.fetch(&Url::parse(URL).unwrap(), false).await.is_err());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn error_status_is_an_outcome_not_a_retry() {
        let (fetcher, transport) = fetcher(ScriptedTransport::new(), 10);
        let missing = Url::parse("https://feeds.example.com/missing.xml").unwrap();
        let outcome = fetcher.fetch(&missing, true).await.unwrap();
        assert_eq!(outcome.status(), 404);
        assert!(!outcome.is_success());
        assert_eq!(transport.calls(), 1);

        assert!(matches!(fetcher.fetch_text(&missing).await, Err(RelayError::Transport(_))));
    }

    #[tokio::test]
    async fn body_is_only_read_when_asked_for() {
        let (fetcher, _) = fetcher(ScriptedTransport::new(), 10);
        let outcome = fetcher.fetch(&Url::parse(URL).unwrap(), false).await.unwrap();
        assert!(outcome.is_success());
        assert!(outcome.into_body().is_none());
    }

    #[test]
    fn reqwest_transport_rejects_unprintable_signature() {
        let options = FetchOptions { signature: Some("bad\nvalue".into()), ..FetchOptions::default() };
        assert!(matches!(ReqwestTransport::new(&options), Err(RelayError::Config(_))));
    }
}
