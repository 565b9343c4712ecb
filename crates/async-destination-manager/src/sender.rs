//! HTTP transport for destination uploads, with retry.

use crate::{RetryConfig, TransportResponse, UploadResult, UploadTransport};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, error, warn};

/// `reqwest`-backed [`UploadTransport`] with exponential backoff.
pub struct HttpTransport {
    config: RetryConfig,
    client: Client,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn new(config: RetryConfig) -> UploadResult<Self> {
        let client = Client::builder().build()?;
        Ok(Self { config, client })
    }

    /// Single attempt.
    async fn try_post(
        &self,
        url: &str,
        payload: &[u8],
        timeout: Duration,
    ) -> UploadResult<TransportResponse> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .body(payload.to_vec())
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(TransportResponse { status, body })
    }
}

/// Next backoff delay: doubled, capped at `max_delay_ms`.
fn next_delay(delay_ms: u64, max_delay_ms: u64) -> u64 {
    delay_ms.saturating_mul(2).min(max_delay_ms)
}

fn is_retryable(status: u16) -> bool {
    StatusCode::from_u16(status)
        .map(|s| s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS)
        .unwrap_or(false)
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> UploadResult<TransportResponse> {
        let mut attempt = 0;
        let mut delay = self.config.initial_retry_delay_ms;

        loop {
            attempt += 1;

            let (outcome, reason) = match self.try_post(url, &payload, timeout).await {
                Ok(response) if !is_retryable(response.status) => {
                    debug!(
                        url = %url,
                        status = response.status,
                        attempt = attempt,
                        "Upload attempt finished"
                    );
                    return Ok(response);
                }
                Ok(response) => {
                    let reason = format!("HTTP {}", response.status);
                    (Ok(response), reason)
                }
                Err(e) => {
                    let reason = e.to_string();
                    (Err(e), reason)
                }
            };

            if attempt >= self.config.max_retries {
                error!(url = %url, attempt = attempt, error = %reason, "Max retries exceeded");
                return outcome;
            }

            warn!(
                url = %url,
                attempt = attempt,
                delay_ms = delay,
                error = %reason,
                "Upload failed, retrying"
            );

            tokio::time::sleep(Duration::from_millis(delay)).await;

            delay = next_delay(delay, self.config.max_retry_delay_ms);
        }
    }
}
