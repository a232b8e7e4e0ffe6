//! Retrying HTTP transport.
//!
//! A thin wrapper over `reqwest::Client` that re-issues a request when the
//! connection fails or the response status is in the policy's forcelist,
//! sleeping with exponential backoff between attempts.
//!
//! Retry rules:
//! - connection failures are retried for every method (the request never
//!   reached the server);
//! - forcelist statuses and read timeouts are retried only for idempotent
//!   methods;
//! - once the budget is spent the final response or error is returned as-is.

use std::fmt;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Response};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ProvisionError;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default backoff factor. A factor of 1s waits 1s, 2s, 4s, 8s, ...
pub const DEFAULT_BACKOFF_FACTOR: Duration = Duration::from_secs(1);

/// Upper bound for a single backoff sleep.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(120);

/// Statuses retried by default.
pub const DEFAULT_STATUS_FORCELIST: [u16; 3] = [500, 502, 504];

/// Exponential backoff retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt. Total attempts = 1 + `max_retries`.
    pub max_retries: u32,

    /// Delay before the first retry; doubles on every subsequent retry.
    pub backoff_factor: Duration,

    /// Cap applied to each individual delay.
    pub backoff_max: Duration,

    /// Response statuses that trigger a retry.
    pub status_forcelist: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            backoff_max: DEFAULT_BACKOFF_MAX,
            status_forcelist: DEFAULT_STATUS_FORCELIST.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let multiplier = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.backoff_factor
            .saturating_mul(multiplier)
            .min(self.backoff_max)
    }

    /// Whether a response with `status` to a `method` request is retried.
    pub fn retries_status(&self, method: &Method, status: u16) -> bool {
        is_idempotent(method) && self.status_forcelist.contains(&status)
    }

    /// Whether a transport error for a `method` request is retried.
    pub fn retries_error(&self, method: &Method, err: &reqwest::Error) -> bool {
        if err.is_connect() {
            return true;
        }
        err.is_timeout() && is_idempotent(method)
    }
}

fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::PUT | Method::DELETE | Method::TRACE
    )
}

/// Transport settings. Built once per session and passed by value.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Verify server certificates. `false` accepts any certificate.
    pub verify_tls: bool,

    /// Per-attempt timeout covering connect and read.
    pub timeout: Option<Duration>,

    pub retry: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            verify_tls: true,
            timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// A request body with its content type.
#[derive(Debug, Clone)]
pub struct RequestBody {
    content_type: &'static str,
    bytes: Vec<u8>,
}

impl RequestBody {
    /// Serialize `value` as a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, ProvisionError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| ProvisionError::InvalidRequest(format!("failed to encode body: {e}")))?;
        Ok(Self {
            content_type: "application/json",
            bytes,
        })
    }

    /// An opaque XML body.
    pub fn xml(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: "text/xml",
            bytes: bytes.into(),
        }
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }
}

/// HTTP transport with automatic retries.
#[derive(Clone)]
pub struct RetryingTransport {
    client: reqwest::Client,
    retry: RetryPolicy,
    basic_auth: Option<(String, String)>,
}

impl fmt::Debug for RetryingTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingTransport")
            .field("retry", &self.retry)
            .field("user", &self.basic_auth.as_ref().map(|(user, _)| user))
            .finish_non_exhaustive()
    }
}

impl RetryingTransport {
    /// Build a transport from `config`.
    pub fn new(config: TransportConfig) -> Result<Self, ProvisionError> {
        let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(!config.verify_tls);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout).connect_timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            ProvisionError::InvalidRequest(format!("failed to create HTTP client: {e}"))
        })?;

        Ok(Self {
            client,
            retry: config.retry,
            basic_auth: None,
        })
    }

    /// Authenticate every request with HTTP basic auth.
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((username.into(), password.into()));
        self
    }

    /// Send a request, retrying per the policy.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&RequestBody>,
    ) -> Result<Response, ProvisionError> {
        let mut retry = 0u32;

        loop {
            let mut request = self.client.request(method.clone(), url);
            if let Some((username, password)) = &self.basic_auth {
                request = request.basic_auth(username, Some(password));
            }
            if let Some(body) = body {
                request = request
                    .header(CONTENT_TYPE, body.content_type)
                    .body(body.bytes.clone());
            }

            debug!(%method, url, attempt = retry + 1, "Sending request");
            let budget_left = retry < self.retry.max_retries;

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if !(budget_left && self.retry.retries_status(&method, status)) {
                        return Ok(response);
                    }
                    let delay = self.retry.delay(retry);
                    warn!(%method, url, status, attempt = retry + 1, ?delay, "Retryable status; backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if !(budget_left && self.retry.retries_error(&method, &err)) {
                        return Err(err.into());
                    }
                    let delay = self.retry.delay(retry);
                    warn!(%method, url, error = %err, attempt = retry + 1, ?delay, "Request failed; backing off");
                    tokio::time::sleep(delay).await;
                }
            }

            retry += 1;
        }
    }
}
