use rand::Rng;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::VaultError;
use crate::config::VaultConfig;

/// Backoff settings for requests that fail transiently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &VaultConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            min_wait: Duration::from_millis(config.min_retry_wait_ms),
            max_wait: Duration::from_secs(config.max_retry_wait_seconds),
        }
    }

    /// Exponential backoff with up to 10% jitter, capped at `max_wait`
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self
            .min_wait
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_wait);
        let jitter_cap = (base.as_millis() / 10) as u64;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        (base + Duration::from_millis(jitter)).min(self.max_wait)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(30),
        }
    }
}

/// HashiCorp Vault HTTP client
#[derive(Clone)]
pub struct VaultClient {
    client: Client,
    address: String,
    token: String,
    retry: RetryPolicy,
}

impl VaultClient {
    /// Create a new Vault client
    pub fn new(config: &VaultConfig) -> Result<Self, VaultError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(VaultError::Client)?;

        Ok(Self {
            client,
            address: config.address.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            retry: RetryPolicy::from_config(config),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path.trim_start_matches('/'))
    }

    /// Send a request, retrying transport failures and retryable statuses.
    ///
    /// The final response is returned whatever its status; callers decide
    /// which statuses are errors.
    pub(crate) async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, VaultError> {
        let url = self.url(path);
        let mut attempt = 0;

        loop {
            debug!("{} {}", method, url);

            let mut request = self
                .client
                .request(method.clone(), &url)
                .header("X-Vault-Token", &self.token);
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if attempt < self.retry.max_retries && is_retryable(status) {
                        let delay = self.retry.delay(attempt);
                        warn!(
                            "Vault returned {} for {}, retrying in {:?} ({}/{})",
                            status,
                            path,
                            delay,
                            attempt + 1,
                            self.retry.max_retries
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if attempt < self.retry.max_retries {
                        let delay = self.retry.delay(attempt);
                        warn!(
                            "Request to {} failed: {}, retrying in {:?} ({}/{})",
                            path,
                            e,
                            delay,
                            attempt + 1,
                            self.retry.max_retries
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(VaultError::Request {
                        path: path.to_string(),
                        source: e,
                    });
                }
            }
        }
    }

    /// GET a JSON document. A 404 is reported as `None`.
    pub(crate) async fn read_json<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, VaultError> {
        let response = self.send::<()>(Method::GET, path, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(path, response).await.map(Some)
    }

    /// Send a body and decode the JSON reply
    pub(crate) async fn write_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, VaultError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(method, path, Some(body)).await?;
        decode(path, response).await
    }

    /// Send a body and decode the JSON reply, if there is one.
    ///
    /// Some write endpoints answer 204 or an empty body on success.
    pub(crate) async fn write_json_optional<B, T>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, VaultError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(method, path, Some(body)).await?;
        let body = success_body(path, response).await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        parse(path, &body).map(Some)
    }

    /// Send a body where only success matters (Vault usually answers 204)
    pub(crate) async fn write_empty<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<(), VaultError> {
        let response = self.send(method, path, Some(body)).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VaultError::status(path, status, &body));
        }
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, VaultError> {
    let body = success_body(path, response).await?;
    parse(path, &body)
}

async fn success_body(path: &str, response: Response) -> Result<String, VaultError> {
    let status = response.status();
    let body = response.text().await.map_err(|e| VaultError::Request {
        path: path.to_string(),
        source: e,
    })?;

    if !status.is_success() {
        return Err(VaultError::status(path, status, &body));
    }
    Ok(body)
}

fn parse<T: DeserializeOwned>(path: &str, body: &str) -> Result<T, VaultError> {
    serde_json::from_str(body).map_err(|e| VaultError::Decode {
        path: path.to_string(),
        source: e,
    })
}

// 412 comes from performance standbys that have not caught up yet.
fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::PRECONDITION_FAILED
        || status == StatusCode::TOO_MANY_REQUESTS
        || (status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED)
}
