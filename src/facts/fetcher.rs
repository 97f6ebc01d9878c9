//! Rate-limited HTTP fetching of JSON documents.
//!
//! Each request runs through [`seatbelt`] retry and timeout middleware, so transient
//! failures and rate limits are waited out before an error reaches the caller.

use super::Throttler;
use crate::FetchError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core::time::Duration;
use layered::{Execute, Service, Stack};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, LINK, RETRY_AFTER};
use seatbelt::retry::{Backoff, Retry};
use seatbelt::timeout::Timeout;
use seatbelt::{RecoveryInfo, ResilienceContext};
use serde_json::Value;
use std::sync::Arc;
use tick::Clock;
use url::{Origin, Url};

const LOG_TARGET: &str = "   fetcher";

/// Default timeout for a single request, body included.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum retry attempts (on top of the original request).
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff between retries.
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Wait applied when a service says we are rate limited but not for how long.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Upper bound on any single rate-limit wait.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(3600);

/// A decoded JSON response along with the headers it arrived with.
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    data: Value,
    headers: HeaderMap,
}

impl FetchResponse {
    #[must_use]
    pub const fn new(data: Value, headers: HeaderMap) -> Self {
        Self { data, headers }
    }

    /// A response without any headers.
    #[must_use]
    pub fn from_data(data: Value) -> Self {
        Self::new(data, HeaderMap::new())
    }

    #[must_use]
    pub const fn data(&self) -> &Value {
        &self.data
    }

    #[must_use]
    pub fn into_data(self) -> Value {
        self.data
    }

    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The `Link` header, if present and readable.
    #[must_use]
    pub fn link(&self) -> Option<&str> {
        self.headers.get(LINK)?.to_str().ok()
    }
}

/// Performs a GET and decodes the body as JSON.
///
/// Non-success statuses are errors. Implementations are expected to apply any
/// rate limiting themselves, so callers can issue requests freely.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send;
}

impl<T: Fetcher> Fetcher for Arc<T> {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send {
        (**self).fetch(url)
    }
}

impl<T: Fetcher> Fetcher for &T {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send {
        (**self).fetch(url)
    }
}

/// The production [`Fetcher`], backed by `reqwest`.
///
/// Every request goes through the shared [`Throttler`]. A GitHub token, when
/// configured, is only ever sent to the GitHub API origin.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    throttler: Arc<Throttler>,
    github_origin: Origin,
    github_auth: Option<HeaderValue>,
    retry_base_delay: Duration,
}

/// One completed HTTP exchange, before its status is interpreted.
#[derive(Debug)]
struct Exchange {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,

    /// How long the service asked us to back off, when it rate limited us.
    rate_limit: Option<Duration>,
}

impl HttpFetcher {
    /// Create a fetcher that authenticates requests to `github_api` with `github_token`.
    pub fn new(throttler: Arc<Throttler>, github_api: &str, github_token: Option<&str>) -> crate::Result<Self> {
        let github_origin = Url::parse(github_api)?.origin();

        let github_auth = match github_token {
            Some(t) => {
                let mut auth_val = HeaderValue::from_str(&format!("token {t}"))?;
                auth_val.set_sensitive(true);
                Some(auth_val)
            }
            None => None,
        };

        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            throttler,
            github_origin,
            github_auth,
            retry_base_delay: RETRY_BASE_DELAY,
        })
    }

    /// Override the backoff base used between retries.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// The authorization header to send with a request to `url`, if any.
    fn authorization_for(&self, url: &str) -> Option<HeaderValue> {
        let auth = self.github_auth.as_ref()?;
        let origin = Url::parse(url).ok()?.origin();
        (origin == self.github_origin).then(|| auth.clone())
    }

    async fn resilient_fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let clock = Clock::new_tokio();
        let context = ResilienceContext::new(&clock).name("fetch");

        let client = self.client.clone();
        let throttler = Arc::clone(&self.throttler);
        let auth = self.authorization_for(url);
        let timeout_url = url.to_string();

        let service = (
            Retry::layer("retry", &context)
                .clone_input()
                .recovery_with(|result: &Result<Exchange, FetchError>, _| should_retry(result))
                .max_retry_attempts(MAX_RETRY_ATTEMPTS)
                .base_delay(self.retry_base_delay)
                .backoff(Backoff::Exponential)
                .on_retry(|_output, args| {
                    log::debug!(
                        target: LOG_TARGET,
                        "Retrying request (attempt {}, delay {}ms)",
                        args.attempt().index() + 1,
                        args.retry_delay().as_millis(),
                    );
                }),
            Timeout::layer("timeout", &context)
                .timeout_error(move |_| FetchError::Timeout { url: timeout_url.clone() })
                .timeout(DEFAULT_REQUEST_TIMEOUT),
            Execute::new(move |url: String| {
                let client = client.clone();
                let throttler = Arc::clone(&throttler);
                let auth = auth.clone();
                async move { exchange(&client, &throttler, auth, url).await }
            }),
        )
            .into_service();

        let reply = service.execute(url.to_string()).await?;

        if !reply.status.is_success() {
            log::debug!(target: LOG_TARGET, "Request to {url} failed with HTTP {}", reply.status);
            return Err(FetchError::Status {
                url: url.to_string(),
                status: reply.status.as_u16(),
            });
        }

        // 204 No Content, e.g. the contributors of an empty repository
        let data = if reply.body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&reply.body).map_err(|source| FetchError::Decode {
                url: url.to_string(),
                source,
            })?
        };

        Ok(FetchResponse::new(data, reply.headers))
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send {
        self.resilient_fetch(url)
    }
}

/// Send one GET while holding a throttler permit, reading the whole body.
///
/// A rate-limited answer pauses the shared throttler so that no other request is
/// started before the limit resets.
async fn exchange(
    client: &reqwest::Client,
    throttler: &Arc<Throttler>,
    auth: Option<HeaderValue>,
    url: String,
) -> Result<Exchange, FetchError> {
    let _permit = throttler.acquire().await;
    log::info!(target: LOG_TARGET, "Querying {url}");

    let mut request = client.get(&url);
    if let Some(auth) = auth {
        request = request.header(AUTHORIZATION, auth);
    }

    let transport = |source| FetchError::Transport { url: url.clone(), source };
    let response = request.send().await.map_err(transport)?;
    let status = response.status();
    let headers = response.headers().clone();

    let rate_limit = rate_limit_delay(status, &headers, Utc::now());
    if let Some(wait) = rate_limit {
        log::warn!(
            target: LOG_TARGET,
            "Rate limited by {url} (HTTP {status}), waiting {}s before retrying",
            wait.as_secs()
        );
        let _ = throttler.pause_for(wait);
    }

    let body = response.bytes().await.map_err(transport)?;

    Ok(Exchange {
        status,
        headers,
        body,
        rate_limit,
    })
}

/// Classify the outcome of one exchange for retry purposes.
fn should_retry(result: &Result<Exchange, FetchError>) -> RecoveryInfo {
    match result {
        // Network failures and timeouts are transient.
        Err(FetchError::Transport { .. } | FetchError::Timeout { .. }) => RecoveryInfo::retry(),

        // Rate limited: wait as long as the service asked.
        Ok(Exchange {
            rate_limit: Some(wait), ..
        }) => RecoveryInfo::retry().delay(*wait),

        // Server errors (5xx) are transient.
        Ok(exchange) if exchange.status.is_server_error() => RecoveryInfo::retry(),

        // Everything else (success, 4xx client errors) is not retried.
        _ => RecoveryInfo::never(),
    }
}

/// How long to back off, if the response says we are being rate limited.
///
/// A 429 is always a rate limit. A 403 is one only when GitHub reports an exhausted
/// quota or asks us to retry later; otherwise it is a real permission failure.
fn rate_limit_delay(status: StatusCode, headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let exhausted = header_u64(headers, "x-ratelimit-remaining") == Some(0);
    let retry_after = header_u64(headers, RETRY_AFTER.as_str()).map(Duration::from_secs);

    let limited = match status {
        StatusCode::TOO_MANY_REQUESTS => true,
        StatusCode::FORBIDDEN => exhausted || retry_after.is_some(),
        _ => false,
    };

    if !limited {
        return None;
    }

    let until_reset = header_u64(headers, "x-ratelimit-reset")
        .and_then(|reset| i64::try_from(reset).ok())
        .and_then(|reset| DateTime::from_timestamp(reset, 0))
        .map(|reset_at| reset_at.signed_duration_since(now).to_std().unwrap_or(Duration::ZERO));

    let wait = until_reset.or(retry_after).unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
    Some(wait.clamp(Duration::from_secs(1), MAX_RATE_LIMIT_WAIT))
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
