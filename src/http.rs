//! Shared HTTP retry loop for the embedding and vector-index adapters.
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::fmt;
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::warn;

/// A request that failed for good.
#[derive(Debug)]
pub struct HttpFailure {
    /// Status of the last response, `None` for transport errors.
    pub status: Option<StatusCode>,
    pub message: String,
}

impl fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Delay before retry number `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

pub fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Send the request built by `build`, retrying transient failures up to
/// `max_retries` times. Returns the first successful response.
///
/// `service` names the remote API in error messages and logs.
pub async fn send_with_retry<F>(
    service: &str,
    max_retries: u32,
    build: F,
) -> Result<Response, HttpFailure>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            let reason = last_err
                .as_ref()
                .map(|e: &HttpFailure| e.message.clone())
                .unwrap_or_default();
            warn!(
                service,
                attempt,
                delay_secs = delay.as_secs(),
                error = %reason,
                "retrying request"
            );
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let body_text = response.text().await.unwrap_or_default();
                let failure = HttpFailure {
                    status: Some(status),
                    message: format!("{} API error {}: {}", service, status, body_text),
                };
                if is_retryable(status) {
                    last_err = Some(failure);
                    continue;
                }
                return Err(failure);
            }
            Err(e) => {
                last_err = Some(HttpFailure {
                    status: None,
                    message: format!("{} request failed: {}", service, e),
                });
            }
        }
    }

    Err(last_err.unwrap_or_else(|| HttpFailure {
        status: None,
        message: format!("{} request failed after retries", service),
    }))
}
