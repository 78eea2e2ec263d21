use std::future::Future;

use log::warn;
use tokio::time::{sleep, Duration};

/// How often and how patiently a failing call is repeated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), saturating at
    /// `Duration::MAX`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Runs `f` until it succeeds, the error is not retryable, or the policy
/// runs out of retries. Returns the last error in the latter two cases.
pub async fn with_retry<F, Fut, T, E, P>(policy: RetryPolicy, label: &str, should_retry: P, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries && should_retry(&e) => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                warn!(
                    "{} failed ({}), retry {}/{} in {:?}",
                    label, e, attempt, policy.max_retries, delay
                );
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
