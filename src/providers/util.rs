use anyhow::Result;
use reqwest::{Response, StatusCode};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Attempts and spacing for retried HTTP requests. The wait grows linearly:
/// `delay` after the first failure, `2 * delay` after the second, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(retries: u32, delay: Duration) -> Self {
        RetryPolicy { retries, delay }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.delay * attempt
    }
}

/// Rate limiting and server side failures are worth another try, anything
/// else is the caller's to interpret.
fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Sends a request, retrying connection errors and transient statuses.
///
/// Once the retries are used up the last outcome is returned unchanged, so a
/// persistent `500` still reaches the caller as a response.
pub async fn send_with_retry<F, Fut>(policy: RetryPolicy, mut send: F) -> Result<Response>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = reqwest::Result<Response>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = send().await;
        let retry = match &outcome {
            Ok(response) if is_transient(response.status()) => {
                debug!(attempt, status = %response.status(), "Transient HTTP status");
                true
            }
            Ok(_) => false,
            Err(err) => {
                debug!(attempt, error = %err, "Request failed");
                true
            }
        };
        if !retry || attempt > policy.retries {
            return Ok(outcome?);
        }
        tokio::time::sleep(policy.backoff(attempt)).await;
    }
}
