//! Retry loop with exponential backoff and jitter
//!
//! Drives re-attempts around a single outbound call. Only errors whose
//! status code classified as transient are retried; circuit-open and
//! transport failures propagate on first occurrence.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::error::Result;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries beyond the first attempt
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Ceiling on any single backoff delay
    pub max_delay: Duration,
    /// Growth factor per attempt, >= 1
    pub backoff_multiplier: f64,
    /// Whether to randomize each delay by +/-25%
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with a custom retry budget
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Set the base delay
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Compute the backoff delay before retry attempt `attempt` (0-based).
///
/// `base * multiplier^attempt`, capped at `max_delay`, then jittered by a
/// uniform factor in `[-0.25, +0.25]` when enabled.
pub fn compute_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let raw = policy.base_delay.as_millis() as f64 * policy.backoff_multiplier.powi(attempt as i32);
    let mut delay_ms = raw.min(policy.max_delay.as_millis() as f64);

    if policy.jitter {
        let factor: f64 = rand::thread_rng().gen_range(-0.25..=0.25);
        delay_ms += delay_ms * factor;
    }

    Duration::from_millis(delay_ms.max(0.0) as u64)
}

/// Execute an operation with retry logic.
///
/// Runs up to `max_retries + 1` attempts. Attempts are strictly sequential:
/// the next one never starts before the previous outcome is known and the
/// backoff delay has elapsed.
pub async fn execute_with_retry<F, Fut, T>(
    mut operation: F,
    policy: &RetryPolicy,
    endpoint_key: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(
                        endpoint = endpoint_key,
                        retries = attempt,
                        "request succeeded after {attempt} retries"
                    );
                }
                return Ok(value);
            }
            Err(err) => {
                if !err.is_retryable() || attempt >= policy.max_retries {
                    return Err(err);
                }

                let delay = compute_delay(attempt, policy);
                warn!(
                    endpoint = endpoint_key,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after failure: {err}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
