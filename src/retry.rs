//! Bounded retry for registry lookups
//!
//! A reconcile pass gets a fixed number of attempts at the registry. Between
//! attempts the delay grows geometrically up to a cap, with random jitter so
//! many pools hitting the same outage do not retry in lockstep.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

/// Attempt budget and delay schedule for one retried operation
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (minimum 1)
    pub max_attempts: u32,
    /// Base delay after the first failure
    pub initial_delay: Duration,
    /// Ceiling for the base delay
    pub max_delay: Duration,
    /// Growth factor of the base delay per failure
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Default schedule with `attempts` attempts (at least one)
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Default::default()
        }
    }
}

/// Delay schedule driven by a [`RetryConfig`]
struct Backoff {
    base: Duration,
    ceiling: Duration,
    factor: f64,
}

impl Backoff {
    fn new(config: &RetryConfig) -> Self {
        Self {
            base: config.initial_delay,
            ceiling: config.max_delay,
            factor: config.backoff_multiplier.max(1.0),
        }
    }

    /// Jittered sleep for this failure; the base grows for the next one
    fn next_delay(&mut self) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let delay = self.base.mul_f64(jitter);
        self.base = self.base.mul_f64(self.factor).min(self.ceiling);
        delay
    }
}

/// Run `operation` until it succeeds or the attempt budget is spent.
///
/// Returns the last error when every attempt fails.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_backoff_if(config, operation_name, operation, |_| true).await
}

/// Like [`retry_with_backoff`], but an error for which `is_retryable` returns
/// false ends the loop at once.
pub async fn retry_with_backoff_if<F, Fut, T, E, R>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    is_retryable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let budget = config.max_attempts.max(1);
    let mut backoff = Backoff::new(config);
    let mut attempt = 1u32;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !is_retryable(&err) {
            debug!(
                operation = %operation_name,
                attempt,
                error = %err,
                "Error is not retryable"
            );
            return Err(err);
        }

        if attempt >= budget {
            warn!(
                operation = %operation_name,
                attempts = attempt,
                error = %err,
                "Giving up after exhausting attempts"
            );
            return Err(err);
        }

        let delay = backoff.next_delay();
        warn!(
            operation = %operation_name,
            attempt,
            error = %err,
            retry_in_ms = delay.as_millis() as u64,
            "Attempt failed"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
