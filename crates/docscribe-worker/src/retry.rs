//! Retry with exponential backoff and jitter.
//!
//! Applied only at the job boundary: a run that fails for transient
//! infrastructure reasons is re-executed from scratch. Domain outcomes
//! (a run finishing in Failed status) are results, not errors, and never
//! pass through here.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts including the first.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(600),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay before the given retry (1-based attempt that just failed).
    fn delay_after(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay);
        if !self.jitter {
            return backoff;
        }
        // Uniform in [0.5, 1.5) of the computed backoff.
        let factor = rand::thread_rng().gen_range(0.5..1.5);
        backoff.mul_f64(factor)
    }
}

/// Run `operation` until it succeeds, the error is not retryable, or
/// attempts run out.
pub async fn with_retry<T, E, F, Fut, R>(
    config: &RetryConfig,
    mut operation: F,
    is_retryable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < config.max_attempts && is_retryable(&e) => {
                let delay = config.delay_after(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_secs = delay.as_secs_f64(),
                    "attempt failed, retrying: {e}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
