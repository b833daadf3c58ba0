//! Shared outbound HTTP transport: per-call timeout plus retry with
//! exponential backoff on transient failures.
//!
//! Callers never see the retries; they get the final response (or error) and
//! classify it themselves.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use tracing::debug;

use crate::config::{HttpConfig, RetryConfig};

/// When and how often to retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub statuses: Vec<u16>,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            statuses: config.statuses.clone(),
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.backoff_base.saturating_mul(factor)
    }

    pub fn is_transient_status(&self, status: u16) -> bool {
        self.statuses.contains(&status)
    }
}

/// Run `op` until it succeeds, `should_retry` declines, or attempts run out.
///
/// The last result is returned as-is, so an exhausted retry of a transient
/// status still hands the caller that response.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    mut op: F,
    should_retry: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&Result<T, E>) -> bool,
{
    let mut retry = 0;
    loop {
        let result = op().await;
        if retry >= policy.max_retries || !should_retry(&result) {
            return result;
        }
        retry += 1;
        let delay = policy.delay_for(retry);
        debug!(
            retry,
            max_retries = policy.max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "retrying outbound request"
        );
        tokio::time::sleep(delay).await;
    }
}

/// A `reqwest::Client` built once at startup and shared by every component.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    policy: RetryPolicy,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("stack-scout/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(HttpTransport {
            client,
            policy: RetryPolicy::from_config(&config.retry),
        })
    }

    /// Send the request produced by `build`, retrying transient failures.
    ///
    /// `build` is called once per attempt because request bodies (multipart
    /// in particular) cannot be replayed.
    pub async fn send<F>(&self, build: F) -> Result<Response, reqwest::Error>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        retry_with_backoff(
            &self.policy,
            || build(&self.client).send(),
            |result| match result {
                Ok(response) => self.policy.is_transient_status(response.status().as_u16()),
                Err(err) => err.is_connect() || err.is_timeout(),
            },
        )
        .await
    }
}
