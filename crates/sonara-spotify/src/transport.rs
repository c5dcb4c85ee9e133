// SPDX-License-Identifier: GPL-3.0-or-later

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::TransportError;
use crate::throttle::Throttle;

pub const SPOTIFY_API_BASE: &str = sonara_config::DEFAULT_API_BASE;
const USER_AGENT: &str = concat!("sonara/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }
}

/// One concrete HTTP call, fully rendered from an endpoint and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub verb: Verb,
    /// Path relative to the API base, or an absolute `http(s)://` URL.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            verb: Verb::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    /// Parsed JSON body; `Null` for an empty body. A non-JSON error body is
    /// kept as a JSON string so the caller can still report it.
    pub body: Value,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs single HTTP requests. Implementations must tolerate concurrent
/// invocation and are expected to absorb 429 responses themselves.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<TransportResponse, TransportError>;
}

/// Backoff policy for 429 and 5xx responses.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub retry_after_multiplier: f64,
    pub retry_server_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&sonara_config::RetryConfig::default())
    }
}

impl From<&sonara_config::RetryConfig> for RetryPolicy {
    fn from(config: &sonara_config::RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor,
            retry_after_multiplier: config.retry_after_multiplier,
            retry_server_errors: config.retry_server_errors,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    ///
    /// A scaled `Retry-After` too large for a [`Duration`] falls back to the
    /// exponential backoff, which saturates at [`Duration::MAX`].
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let hinted = retry_after
            .map(|server_hint| server_hint.as_secs_f64() * self.retry_after_multiplier)
            .and_then(seconds_to_duration);
        if let Some(wait) = hinted {
            return wait;
        }

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let backoff = self.backoff_factor * 2f64.powi(exponent);
        match seconds_to_duration(backoff) {
            Some(wait) => wait,
            None if backoff > 0.0 => Duration::MAX,
            None => Duration::ZERO,
        }
    }
}

/// Non-positive seconds are no wait; NaN and overflow are `None`.
fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    if seconds <= 0.0 {
        return Some(Duration::ZERO);
    }
    Duration::try_from_secs_f64(seconds).ok()
}

/// reqwest-backed [`Transport`] with a bounded request pool and backoff.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
    throttle: Throttle,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::builder().build()
    }

    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn resolve(&self, path: &str) -> Result<Url, TransportError> {
        let raw = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        };
        Url::parse(&raw).map_err(|e| TransportError::InvalidUrl(format!("{raw}: {e}")))
    }

    async fn send_once(
        &self,
        request: &ApiRequest,
        url: &Url,
        token: Option<&str>,
    ) -> Result<(StatusCode, Option<Duration>, String), TransportError> {
        let _permit = self.throttle.acquire().await?;

        let mut builder = match request.verb {
            Verb::Get => self.client.get(url.clone()),
            Verb::Post => self.client.post(url.clone()),
            Verb::Put => self.client.put(url.clone()),
            Verb::Delete => self.client.delete(url.clone()),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let text = response.text().await?;
        Ok((status, retry_after, text))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<TransportResponse, TransportError> {
        let url = self.resolve(&request.path)?;
        let mut attempt: u32 = 0;

        loop {
            trace!(target: "transport", "{} {}", request.verb.as_str(), url);
            let (status, retry_after, text) = self.send_once(request, &url, token).await?;
            debug!(target: "transport", path = %url.path(), "response status: {}", status);

            let retryable = status == StatusCode::TOO_MANY_REQUESTS
                || (status.is_server_error() && self.retry.retry_server_errors);

            if retryable && attempt < self.retry.max_retries {
                attempt += 1;
                let wait = self.retry.delay(attempt, retry_after);
                warn!(
                    target: "transport",
                    status = status.as_u16(),
                    attempt,
                    "retrying {} in {:?}",
                    url.path(),
                    wait
                );
                sleep(wait).await;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(TransportError::RetriesExhausted {
                    status: status.as_u16(),
                    attempts: attempt + 1,
                });
            }

            trace!(target: "transport", "response body: {}", text);
            return Ok(TransportResponse {
                status: status.as_u16(),
                body: decode_body(status, &text)?,
            });
        }
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
}

fn decode_body(status: StatusCode, text: &str) -> Result<Value, TransportError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(_) if !status.is_success() => Ok(Value::String(text.to_string())),
        Err(e) => Err(TransportError::Decode(e.to_string())),
    }
}

/// Builder for configuring an [`HttpTransport`].
#[derive(Debug)]
pub struct HttpTransportBuilder {
    base_url: String,
    timeout: Duration,
    pool_size: usize,
    min_interval: Duration,
    retry: RetryPolicy,
}

impl Default for HttpTransportBuilder {
    fn default() -> Self {
        Self {
            base_url: SPOTIFY_API_BASE.to_string(),
            timeout: Duration::from_secs(10),
            pool_size: 5,
            min_interval: Duration::ZERO,
            retry: RetryPolicy::default(),
        }
    }
}

impl HttpTransportBuilder {
    /// Set a custom base URL (useful for testing with mock servers).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum requests in flight, also used as the idle connection pool size.
    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(self) -> Result<HttpTransport, TransportError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(self.pool_size)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(HttpTransport {
            client,
            // Trim trailing slash once so every joined path is clean.
            base_url: self.base_url.trim_end_matches('/').to_string(),
            retry: self.retry,
            throttle: Throttle::new(self.pool_size, self.min_interval),
        })
    }
}
