//! Request pacing and throttle backoff for the destination client.
//!
//! Every request waits on a [`RequestPacer`] before it is sent. A `429` answer is
//! retried after [`backoff_delay`], which prefers the server's `Retry-After`
//! hint and otherwise doubles the base delay per attempt.

use std::time::Duration;

use reqwest::header::HeaderValue;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Upper bound for a single wait between throttled attempts
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Zero or negative disables pacing
    pub requests_per_second: f64,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5.0,
            max_retries: 5,
            retry_base_delay: Duration::from_secs(2),
        }
    }
}

impl RateLimitConfig {
    pub fn min_interval(&self) -> Option<Duration> {
        if self.requests_per_second > 0.0 && self.requests_per_second.is_finite() {
            Some(Duration::from_secs_f64(1.0 / self.requests_per_second))
        } else {
            None
        }
    }
}

/// Delay before retry number `retry_count + 1`.
pub fn backoff_delay(retry_count: u32, retry_after: Option<Duration>, base: Duration) -> Duration {
    let delay = match retry_after {
        Some(hint) if !hint.is_zero() => hint,
        _ => {
            let factor = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
            base.saturating_mul(factor)
        }
    };
    delay.min(MAX_RETRY_DELAY)
}

/// `Retry-After` in integer seconds. HTTP-date values are ignored.
pub fn parse_retry_after(value: Option<&HeaderValue>) -> Option<Duration> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Shared pacing clock. Callers serialize on the lock so concurrent
/// requests still respect the minimum interval.
#[derive(Debug)]
pub struct RequestPacer {
    min_interval: Option<Duration>,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            min_interval: config.min_interval(),
            last_request: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let Some(interval) = self.min_interval else {
            return;
        };

        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
