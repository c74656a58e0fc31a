//! Recognition service client
//!
//! [`RecognitionService`] is the seam between the pipeline and whatever
//! identifies audio. [`HttpRecognitionClient`] posts raw segment bytes to an
//! HTTP endpoint returning Shazam-shaped JSON and retries 429/5xx answers with
//! exponential backoff.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use rand::Rng;
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RecognitionConfig;
use crate::error::RecognitionError;
use crate::models::RecognitionOutcome;

/// Identifies the track playing in one audio segment
#[async_trait]
pub trait RecognitionService: Send + Sync {
    /// Recognize the audio file at `segment_path`.
    ///
    /// `Ok(NoMatch)` is a definitive answer and gets cached; `Err` is
    /// transient and is retried on the next run.
    async fn recognize(&self, segment_path: &Path) -> Result<RecognitionOutcome, RecognitionError>;
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep, then try again
    Retry(Duration),
    GiveUp,
}

/// Exponential backoff for retryable recognition failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RecognitionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Base delay after the `attempt`-th failure (1-based): `initial * 2^(attempt-1)`, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// Decide after the `attempt`-th failure (1-based)
    pub fn decide(&self, attempt: u32, error: &RecognitionError) -> RetryDecision {
        if !error.is_retryable() || attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        let base = self.backoff(attempt);
        let delay = match error.retry_after() {
            Some(hint) => hint.max(base),
            None => base + jitter(base),
        };
        RetryDecision::Retry(delay.min(self.max_backoff))
    }
}

/// Up to a quarter of `base`, so parallel clients do not retry in lockstep
fn jitter(base: Duration) -> Duration {
    let max_ms = (base.as_millis() / 4) as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// HTTP implementation of [`RecognitionService`]
pub struct HttpRecognitionClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    api_key_header: String,
    retry: RetryPolicy,
    /// Optional hard quota (`requests_per_minute`)
    rate_limiter: Option<DirectRateLimiter>,
}

impl HttpRecognitionClient {
    pub fn new(config: &RecognitionConfig) -> Result<Self, RecognitionError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RecognitionError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let rate_limiter = config
            .requests_per_minute
            .and_then(NonZeroU32::new)
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));

        if config.api_key.is_none() {
            debug!("No recognition API key configured");
        }

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            api_key_header: config.api_key_header.clone(),
            retry: RetryPolicy::from_config(config),
            rate_limiter,
        })
    }

    async fn attempt(&self, body: Vec<u8>) -> Result<RecognitionOutcome, RecognitionError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body);
        if let Some(key) = &self.api_key {
            request = request.header(self.api_key_header.as_str(), key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RecognitionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, body));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RecognitionError::Parse(format!("Response is not JSON: {}", e)))?;

        RecognitionOutcome::from_response(json)
    }
}

#[async_trait]
impl RecognitionService for HttpRecognitionClient {
    async fn recognize(&self, segment_path: &Path) -> Result<RecognitionOutcome, RecognitionError> {
        let bytes = tokio::fs::read(segment_path).await?;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match self.attempt(bytes.clone()).await {
                Ok(outcome) => {
                    if attempt > 1 {
                        debug!(
                            segment = %segment_path.display(),
                            attempt,
                            "Recognition succeeded after retry"
                        );
                    }
                    return Ok(outcome);
                }
                Err(e) => e,
            };

            match self.retry.decide(attempt, &error) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        segment = %segment_path.display(),
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Recognition failed ({}), retrying",
                        error
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp if error.is_retryable() => {
                    return Err(RecognitionError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(error),
                    });
                }
                RetryDecision::GiveUp => return Err(error),
            }
        }
    }
}

/// Map a non-success HTTP status to an error
pub fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: String,
) -> RecognitionError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        RecognitionError::RateLimited { retry_after }
    } else if status.is_server_error() {
        RecognitionError::Server {
            status: status.as_u16(),
            retry_after,
        }
    } else {
        RecognitionError::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}

/// `Retry-After` in delta-seconds form; HTTP-date values are ignored
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn policy() -> RetryPolicy {
        RetryPolicy::from_config(&RecognitionConfig::default())
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(12), Duration::from_millis(204_800));
        assert_eq!(p.backoff(20), Duration::from_millis(204_800));
    }

    #[test]
    fn test_decide_retries_rate_limit_with_jitter() {
        let p = policy();
        let err = RecognitionError::RateLimited { retry_after: None };
        match p.decide(3, &err) {
            RetryDecision::Retry(delay) => {
                assert!(delay >= Duration::from_millis(400));
                assert!(delay <= Duration::from_millis(500));
            }
            RetryDecision::GiveUp => panic!("429 must be retried"),
        }
    }

    #[test]
    fn test_decide_honors_retry_after() {
        let p = policy();
        let err = RecognitionError::Server {
            status: 503,
            retry_after: Some(Duration::from_secs(5)),
        };
        assert_eq!(p.decide(1, &err), RetryDecision::Retry(Duration::from_secs(5)));
    }

    #[test]
    fn test_decide_gives_up() {
        let p = policy();
        let retryable = RecognitionError::RateLimited { retry_after: None };
        assert_eq!(p.decide(12, &retryable), RetryDecision::GiveUp);

        let fatal = RecognitionError::Rejected {
            status: 401,
            body: "bad key".into(),
        };
        assert_eq!(p.decide(1, &fatal), RetryDecision::GiveUp);
        assert_eq!(
            p.decide(1, &RecognitionError::Network("refused".into())),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, None, String::new()),
            RecognitionError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, None, String::new()),
            RecognitionError::Server { status: 502, .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, None, "no".into()),
            RecognitionError::Rejected { status: 403, .. }
        ));
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[tokio::test]
    async fn test_missing_segment_file_is_io_error() {
        let client = HttpRecognitionClient::new(&RecognitionConfig::default()).unwrap();
        let err = client
            .recognize(Path::new("/nonexistent/segment_0.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, RecognitionError::Io(_)));
    }

    #[test]
    fn test_rate_limiter_only_when_configured() {
        let client = HttpRecognitionClient::new(&RecognitionConfig::default()).unwrap();
        assert!(client.rate_limiter.is_none());

        let config = RecognitionConfig {
            requests_per_minute: Some(20),
            ..RecognitionConfig::default()
        };
        let client = HttpRecognitionClient::new(&config).unwrap();
        assert!(client.rate_limiter.is_some());
    }
}
