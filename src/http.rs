//! Authorized REST client with retry
//!
//! [`ApiClient`] authorizes each request once through its credential's
//! [`req_auth`](crate::Credential::req_auth), then sends it with exponential
//! backoff on throttling and transient server errors. Token acquisition
//! failures surface as the credential's own error; failures of the request
//! itself surface as [`AuthError::RequestFailed`] or [`AuthError::Network`].

use reqwest::header::RETRY_AFTER;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use typed_builder::TypedBuilder;

use crate::credential::Credential;
use crate::error::{AuthError, Result};
use crate::utils::truncate_for_display;

/// Statuses retried by [`ApiClient::execute`]
pub const RETRYABLE_STATUSES: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Exponential backoff settings
#[derive(Debug, Clone, TypedBuilder)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    #[builder(default = 3)]
    pub max_retries: u32,

    /// Delay before the first retry; doubled for each further one
    #[builder(default = Duration::from_millis(500))]
    pub base_delay: Duration,

    /// Upper bound for any single delay, including `Retry-After`
    #[builder(default = Duration::from_secs(30))]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Never retry
    #[must_use]
    pub fn none() -> Self {
        Self::builder().max_retries(0).build()
    }

    /// Backoff before retry number `attempt` (zero-based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// `Retry-After` in seconds; HTTP dates are ignored
fn retry_after(response: &Response) -> Option<Duration> {
    let value = response.headers().get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// REST client bound to a base URL and a credential
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    provider: Arc<dyn Credential>,
    retry: RetryPolicy,
    http: reqwest::Client,
}

impl ApiClient {
    /// Create a client for `base_url`
    pub fn new(base_url: impl Into<String>, provider: Arc<dyn Credential>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            provider,
            retry: RetryPolicy::default(),
            http: reqwest::Client::new(),
        }
    }

    /// Replace the retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Credential authorizing requests
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn Credential> {
        &self.provider
    }

    /// Base URL without trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `path`
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start a request for `path`
    #[must_use]
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    /// Authorize and send a request, retrying transient failures
    ///
    /// # Errors
    ///
    /// Returns the credential's error if no token can be acquired,
    /// `AuthError::Network` for transport failures, and
    /// `AuthError::RequestFailed` for a non-success final status.
    pub async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        let request = self.provider.req_auth(request).await?.build()?;
        let mut attempt = 0;

        loop {
            let Some(current) = request.try_clone() else {
                // Streaming bodies cannot be replayed
                return check_status(self.http.execute(request).await?).await;
            };

            let retries_left = attempt < self.retry.max_retries;
            match self.http.execute(current).await {
                Ok(response) if retries_left && RETRYABLE_STATUSES.contains(&response.status()) => {
                    let delay = retry_after(&response)
                        .unwrap_or_else(|| self.retry.delay_for(attempt))
                        .min(self.retry.max_delay);
                    tracing::warn!(
                        status = %response.status(),
                        url = %request.url(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => return check_status(response).await,
                Err(e) if retries_left && (e.is_connect() || e.is_timeout()) => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(url = %request.url(), attempt = attempt + 1, "Retrying after transport error: {e}");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
            attempt += 1;
        }
    }

    /// GET `path` and decode the JSON body
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute), plus `AuthError::Json` for an
    /// undecodable body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.execute(self.request(Method::GET, path)).await?;
        decode(response).await
    }

    /// POST a JSON body to `path` and decode the JSON response
    ///
    /// # Errors
    ///
    /// As [`get_json`](Self::get_json).
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .execute(self.request(Method::POST, path).json(body))
            .await?;
        decode(response).await
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(AuthError::RequestFailed {
        status: status.as_u16(),
        body: truncate_for_display(body.trim(), 1000),
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::builder()
            .base_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(350))
            .build();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(40), Duration::from_millis(350));
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(RetryPolicy::none().max_retries, 0);
    }
}
