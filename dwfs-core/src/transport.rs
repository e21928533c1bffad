use std::time::{Duration, SystemTime};

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Request, Response, StatusCode};
use tracing::{debug, warn};

use crate::error::DwError;
use crate::retry::RetryPolicy;

pub const DEFAULT_MAX_TRIES: u32 = 10;

/// Wraps every outbound send and absorbs HTTP 429 responses.
#[derive(Debug, Clone)]
pub struct ThrottledTransport {
    http: Client,
    policy: RetryPolicy,
    max_tries: u32,
}

impl ThrottledTransport {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            policy: RetryPolicy::throttle(),
            max_tries: DEFAULT_MAX_TRIES,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries.max(1);
        self
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Sends `request`, retrying while the server answers 429.
    ///
    /// A `Retry-After` header is slept in full on top of the policy's wait.
    pub async fn send(&self, request: Request) -> Result<Response, DwError> {
        let mut attempt = 0u32;
        loop {
            let Some(current) = request.try_clone() else {
                // Streaming bodies cannot be replayed.
                return Ok(self.http.execute(request).await?);
            };
            let response = self.http.execute(current).await?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            attempt += 1;
            if attempt >= self.max_tries {
                warn!(
                    url = %request.url(),
                    attempts = attempt,
                    "giving up on throttled request"
                );
                return Err(DwError::Throttled { attempts: attempt });
            }

            let hint = retry_after(response.headers());
            let wait = self.policy.wait(attempt - 1, hint);
            debug!(
                url = %request.url(),
                attempt,
                retry_after_secs = hint.map(|hint| hint.as_secs()),
                wait_ms = wait.as_millis() as u64,
                "throttled, waiting before retry"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

/// Parses `Retry-After` as whole seconds or as an HTTP date.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = httpdate::parse_http_date(value).ok()?;
    Some(at.duration_since(SystemTime::now()).unwrap_or_default())
}
