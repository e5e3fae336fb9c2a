//! HTTP fetcher implementation
//!
//! This module owns every outbound request of a crawl:
//! - Building HTTP clients (one per proxy) with compression and timeouts
//! - Rate limiting and identity rotation per attempt
//! - Retry logic for transient failures, with backoff
//! - Error classification into typed failures
//!
//! Nothing above this module retries a request on its own.

use crate::config::SearchConfig;
use crate::crawler::identity::{Identity, IdentityRotator};
use crate::crawler::rate_limiter::{seeded_rng, RateLimiter};
use crate::crawler::retry::{Disposition, RetryPolicy, RetryState};
use async_trait::async_trait;
use rand::rngs::StdRng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect::Policy, Client};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Why a single attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureKind {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to read body: {0}")]
    Body(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("malformed request: {0}")]
    InvalidRequest(String),

    #[error("unparseable response: {0}")]
    Unparseable(String),
}

/// Terminal outcome of a failed fetch
///
/// The attempt count and the last identity are carried for diagnostics only.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url} still failing after {attempts} attempt(s) via {last_identity}: {kind}")]
    Transient {
        url: String,
        kind: FailureKind,
        attempts: u32,
        last_identity: String,
    },

    #[error("{url} failed permanently after {attempts} attempt(s) via {last_identity}: {kind}")]
    Fatal {
        url: String,
        kind: FailureKind,
        attempts: u32,
        last_identity: String,
    },

    #[error("fetch of {url} cancelled after {attempts} attempt(s)")]
    Cancelled { url: String, attempts: u32 },
}

impl FetchError {
    /// Number of attempts that were issued
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Transient { attempts, .. }
            | Self::Fatal { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// The failure of the last attempt, if any attempt failed
    pub fn kind(&self) -> Option<&FailureKind> {
        match self {
            Self::Transient { kind, .. } | Self::Fatal { kind, .. } => Some(kind),
            Self::Cancelled { .. } => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// A GET request: base URL plus query parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub url: String,
    pub query: Vec<(String, String)>,
}

impl RequestSpec {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// The full request URL with the query string encoded
    pub fn to_url(&self) -> Result<Url, FailureKind> {
        // parse_with_params appends a bare `?` even for an empty query
        let parsed = if self.query.is_empty() {
            Url::parse(&self.url)
        } else {
            Url::parse_with_params(&self.url, &self.query)
        };
        parsed.map_err(|e| FailureKind::InvalidRequest(format!("{}: {}", self.url, e)))
    }
}

impl fmt::Display for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_url() {
            Ok(url) => write!(f, "{}", url),
            Err(_) => write!(f, "{}", self.url),
        }
    }
}

/// Body of a successful response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// Result of one attempt as seen by the retry loop
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(RawPayload),
    TransientFailure(FailureKind),
    FatalFailure(FailureKind),
}

/// One issued attempt; never persisted
#[derive(Debug)]
pub struct FetchAttempt {
    pub attempt_number: u32,
    pub identity_used: String,
    pub started_at: Instant,
    pub outcome: AttemptOutcome,
}

/// Raw network access used by [`PageFetcher`]
///
/// Implementations perform exactly one request and never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: &RequestSpec,
        identity: &Identity,
    ) -> Result<RawPayload, FailureKind>;
}

/// Builds an HTTP client, optionally routed through a proxy
///
/// # Arguments
///
/// * `proxy` - Proxy descriptor (e.g. "http://10.0.0.1:8080")
/// * `timeout` - Total request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Invalid proxy or TLS backend failure
pub fn build_http_client(proxy: Option<&str>, timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }

    builder.build()
}

/// [`Transport`] backed by reqwest, with one client per proxy
pub struct ReqwestTransport {
    direct: Client,
    proxied: HashMap<String, Client>,
}

impl ReqwestTransport {
    pub fn new(config: &SearchConfig) -> Result<Self, reqwest::Error> {
        let direct = build_http_client(None, config.request_timeout)?;
        let mut proxied = HashMap::new();
        for proxy in &config.proxy_pool {
            proxied.insert(
                proxy.clone(),
                build_http_client(Some(proxy), config.request_timeout)?,
            );
        }

        Ok(Self { direct, proxied })
    }

    fn client_for(&self, identity: &Identity) -> Result<&Client, FailureKind> {
        match &identity.proxy {
            None => Ok(&self.direct),
            Some(proxy) => self
                .proxied
                .get(proxy)
                .ok_or_else(|| FailureKind::InvalidRequest(format!("unknown proxy {}", proxy))),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        request: &RequestSpec,
        identity: &Identity,
    ) -> Result<RawPayload, FailureKind> {
        let client = self.client_for(identity)?;
        let url = request.to_url()?;

        let mut headers = HeaderMap::new();
        for (k, v) in &identity.headers {
            if let (Ok(k), Ok(v)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(v),
            ) {
                headers.insert(k, v);
            }
        }

        let response = client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FailureKind::Status(status.as_u16()));
        }

        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| FailureKind::Body(e.to_string()))?;

        Ok(RawPayload {
            url: final_url,
            status: status.as_u16(),
            body,
        })
    }
}

/// Maps a transport error onto a failure kind
fn classify_reqwest_error(error: reqwest::Error) -> FailureKind {
    if error.is_timeout() {
        FailureKind::Timeout
    } else if error.is_connect() {
        FailureKind::Connect(error.to_string())
    } else if error.is_builder() {
        FailureKind::InvalidRequest(error.to_string())
    } else if error.is_body() || error.is_decode() {
        FailureKind::Body(error.to_string())
    } else {
        FailureKind::Network(error.to_string())
    }
}

/// Performs rate-limited, retried fetches with identity rotation
pub struct PageFetcher {
    transport: Arc<dyn Transport>,
    limiter: RateLimiter,
    rotator: IdentityRotator,
    policy: RetryPolicy,
    request_timeout: Duration,
    partition_by_proxy: bool,
    cancel: CancellationToken,
    rng: Mutex<StdRng>,
}

impl PageFetcher {
    /// Creates a fetcher for one crawl
    ///
    /// # Arguments
    ///
    /// * `config` - Crawl settings (spacing, retries, identities, timeout)
    /// * `transport` - Network access
    /// * `cancel` - Checked between attempts and during waits
    pub fn new(
        config: &SearchConfig,
        transport: Arc<dyn Transport>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            limiter: RateLimiter::from_config(config),
            rotator: IdentityRotator::from_config(config),
            policy: RetryPolicy::from_config(config),
            request_timeout: config.request_timeout,
            partition_by_proxy: config.partition_by_proxy,
            cancel,
            rng: Mutex::new(seeded_rng(config.seed.map(|s| s.wrapping_add(1)))),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches a request, retrying transient failures
    ///
    /// # Request Flow
    ///
    /// 1. Draw a fresh identity (every attempt, retries included)
    /// 2. Wait for a rate-limit slot in the identity's partition
    /// 3. Issue the request, bounded by the request timeout
    /// 4. On a transient failure with attempts left, back off and go to 1
    ///
    /// # Returns
    ///
    /// * `Ok(RawPayload)` - A 2xx response body
    /// * `Err(FetchError)` - Retries exhausted, a fatal failure, or cancellation
    pub async fn fetch(&self, request: &RequestSpec) -> Result<RawPayload, FetchError> {
        let url = request.to_string();
        let mut attempt = 1;

        loop {
            let record = self.attempt(request, &url, attempt).await?;

            let kind = match record.outcome {
                AttemptOutcome::Success(payload) => {
                    tracing::debug!(
                        "Fetched {} via {} ({:?})",
                        url,
                        record.identity_used,
                        self.policy.on_success(attempt)
                    );
                    return Ok(payload);
                }
                AttemptOutcome::TransientFailure(kind) | AttemptOutcome::FatalFailure(kind) => kind,
            };

            let delay = {
                let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                self.policy.next_delay(attempt, &mut *rng)
            };

            match self.policy.on_failure(attempt, &kind, Instant::now(), delay) {
                backoff @ RetryState::Backoff { until, .. } => {
                    tracing::warn!(
                        "Request to {} failed (attempt {}/{}): {}; retrying in {:?}",
                        url,
                        attempt,
                        self.policy.max_attempts(),
                        kind,
                        delay
                    );
                    self.wait_backoff(&url, attempt, until).await?;
                    if let RetryState::Attempting(next) = self.policy.on_backoff_elapsed(backoff) {
                        attempt = next;
                    }
                }
                RetryState::Aborted(attempts) => {
                    tracing::debug!("Request to {} failed permanently: {}", url, kind);
                    return Err(FetchError::Fatal {
                        url,
                        kind,
                        attempts,
                        last_identity: record.identity_used,
                    });
                }
                other => {
                    tracing::warn!(
                        "Giving up on {} after {} attempt(s): {}",
                        url,
                        other.attempts(),
                        kind
                    );
                    return Err(FetchError::Transient {
                        url,
                        kind,
                        attempts: other.attempts(),
                        last_identity: record.identity_used,
                    });
                }
            }
        }
    }

    /// Issues one attempt
    async fn attempt(
        &self,
        request: &RequestSpec,
        url: &str,
        attempt: u32,
    ) -> Result<FetchAttempt, FetchError> {
        let cancelled = || FetchError::Cancelled {
            url: url.to_string(),
            attempts: attempt - 1,
        };

        if attempt > 1 && self.cancel.is_cancelled() {
            return Err(cancelled());
        }

        let identity = self.rotator.next();
        let partition = if self.partition_by_proxy {
            identity.proxy.as_deref()
        } else {
            None
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(cancelled()),
            _ = self.limiter.acquire(partition) => {}
        }

        let started_at = Instant::now();
        let result =
            match tokio::time::timeout(self.request_timeout, self.transport.execute(request, &identity))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(FailureKind::Timeout),
            };

        let outcome = match result {
            Ok(payload) => AttemptOutcome::Success(payload),
            Err(kind) => match self.policy.classify(&kind) {
                Disposition::Transient => AttemptOutcome::TransientFailure(kind),
                Disposition::Fatal => AttemptOutcome::FatalFailure(kind),
            },
        };

        Ok(FetchAttempt {
            attempt_number: attempt,
            identity_used: identity.to_string(),
            started_at,
            outcome,
        })
    }

    /// Sleeps until `until` unless the crawl is cancelled first
    async fn wait_backoff(&self, url: &str, attempts: u32, until: Instant) -> Result<(), FetchError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled {
                url: url.to_string(),
                attempts,
            }),
            _ = tokio::time::sleep_until(until) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::test_support::{fast_config, ScriptedTransport};

    fn fetcher(config: &SearchConfig, transport: Arc<ScriptedTransport>) -> PageFetcher {
        PageFetcher::new(config, transport, CancellationToken::new())
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(None, Duration::from_secs(5)).is_ok());
        assert!(build_http_client(Some("http://10.0.0.1:8080"), Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_request_spec_encodes_query() {
        let request = RequestSpec::get("https://search.example.com/s")
            .with_query("keyword", "冰箱")
            .with_query("page", "1");
        assert_eq!(
            request.to_string(),
            "https://search.example.com/s?keyword=%E5%86%B0%E7%AE%B1&page=1"
        );
    }

    #[test]
    fn test_request_without_query_is_unchanged() {
        let url = "https://item.example.com/100.html";
        assert_eq!(RequestSpec::get(url).to_string(), url);
        assert_eq!(RequestSpec::get(url).to_url().unwrap().as_str(), url);
    }

    #[test]
    fn test_malformed_request_is_invalid() {
        let request = RequestSpec::get("not a url");
        assert!(matches!(
            request.to_url(),
            Err(FailureKind::InvalidRequest(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let config = fast_config();
        let transport = Arc::new(ScriptedTransport::new());
        transport.route("https://shop.test/a", vec![Ok("hello")]);

        let payload = fetcher(&config, transport.clone())
            .fetch(&RequestSpec::get("https://shop.test/a"))
            .await
            .unwrap();

        assert_eq!(payload.body, "hello");
        assert_eq!(transport.calls_to("https://shop.test/a"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let config = fast_config();
        let transport = Arc::new(ScriptedTransport::new());
        transport.route(
            "https://shop.test/a",
            vec![
                Err(FailureKind::Status(503)),
                Err(FailureKind::Timeout),
                Ok("recovered"),
            ],
        );

        let payload = fetcher(&config, transport.clone())
            .fetch(&RequestSpec::get("https://shop.test/a"))
            .await
            .unwrap();

        assert_eq!(payload.body, "recovered");
        assert_eq!(transport.calls_to("https://shop.test/a"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_stop_at_ceiling() {
        let mut config = fast_config();
        config.retry_ceiling = 2;
        let transport = Arc::new(ScriptedTransport::new());
        transport.route("https://shop.test/a", vec![Err(FailureKind::Status(429))]);

        let err = fetcher(&config, transport.clone())
            .fetch(&RequestSpec::get("https://shop.test/a"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Transient { attempts: 3, .. }));
        assert_eq!(err.kind(), Some(&FailureKind::Status(429)));
        assert_eq!(transport.calls_to("https://shop.test/a"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_not_retried() {
        let config = fast_config();
        let transport = Arc::new(ScriptedTransport::new());
        transport.route("https://shop.test/a", vec![Err(FailureKind::Status(404))]);

        let err = fetcher(&config, transport.clone())
            .fetch(&RequestSpec::get("https://shop.test/a"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Fatal { attempts: 1, .. }));
        assert_eq!(transport.calls_to("https://shop.test/a"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_rotates_identity() {
        let mut config = fast_config();
        config.proxy_pool = vec![
            "http://10.0.0.1:8080".to_string(),
            "http://10.0.0.2:8080".to_string(),
        ];
        let transport = Arc::new(ScriptedTransport::new());
        transport.route(
            "https://shop.test/a",
            vec![Err(FailureKind::Status(403)), Ok("ok")],
        );

        fetcher(&config, transport.clone())
            .fetch(&RequestSpec::get("https://shop.test/a"))
            .await
            .unwrap();

        let identities = transport.identities();
        assert_eq!(identities.len(), 2);
        assert_ne!(identities[0].proxy, identities[1].proxy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_request_times_out() {
        let mut config = fast_config();
        config.retry_ceiling = 1;
        config.request_timeout = Duration::from_millis(200);
        let transport = Arc::new(ScriptedTransport::new().with_latency(Duration::from_secs(60)));
        transport.route("https://shop.test/slow", vec![Ok("too late")]);

        let started = Instant::now();
        let err = fetcher(&config, transport)
            .fetch(&RequestSpec::get("https://shop.test/slow"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FetchError::Transient {
                kind: FailureKind::Timeout,
                attempts: 2,
                ..
            }
        ));
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_retries() {
        let mut config = fast_config();
        config.retry_ceiling = 10;
        config.backoff_base = Duration::from_secs(5);
        config.backoff_cap = Duration::from_secs(5);
        let transport = Arc::new(ScriptedTransport::new());
        transport.route("https://shop.test/a", vec![Err(FailureKind::Status(500))]);

        let cancel = CancellationToken::new();
        let fetcher = PageFetcher::new(&config, transport.clone(), cancel.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });

        let err = fetcher
            .fetch(&RequestSpec::get("https://shop.test/a"))
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(err.is_cancelled());
        assert_eq!(err.attempts(), 1);
        assert_eq!(transport.calls_to("https://shop.test/a"), 1);
    }
}
