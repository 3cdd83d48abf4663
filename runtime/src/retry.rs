//! Bounded retry with exponential backoff for transient storage conflicts.
//!
//! Lock wait timeouts, serialization failures and lost insert races are retried
//! by the Seat Ledger through [`retry_with_predicate`]. Domain rejections are
//! never retried: they are returned as successful attempts carrying a verdict.
//!
//! # Example
//!
//! ```rust
//! use enrollment_runtime::retry::{RetryPolicy, retry_with_predicate};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(5)
//!     .initial_delay(Duration::from_millis(5))
//!     .max_delay(Duration::from_millis(200))
//!     .multiplier(2.0)
//!     .build();
//!
//! let result = retry_with_predicate(
//!     policy,
//!     "example",
//!     || async { Ok::<_, String>(42) },
//!     |err: &String| err.contains("conflict"),
//! )
//! .await?;
//! assert_eq!(result, 42);
//! # Ok(())
//! # }
//! ```

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 5
/// - `initial_delay`: 10ms
/// - `max_delay`: 500ms
/// - `multiplier`: 2.0 (delay doubles each retry)
/// - `jitter`: true (each delay is scaled by a random factor in `[0.5, 1.0]`)
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first try
    pub max_retries: usize,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Randomize delays so contending requests do not retry in lockstep
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
            jitter: None,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn no_retries() -> Self {
        Self::builder().max_retries(0).build()
    }

    /// Total attempts this policy allows, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Calculate delay for a given attempt number, before jitter.
    ///
    /// Uses exponential backoff: delay = initial_delay * (multiplier ^ attempt)
    /// Capped at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let delay_ms = self.initial_delay.as_millis() as f64
            * self.multiplier.powi(attempt as i32);

        let delay = Duration::from_millis(delay_ms as u64);

        if delay > self.max_delay {
            self.max_delay
        } else {
            delay
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        delay.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<usize>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<bool>,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set initial delay before first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub const fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(5),
            initial_delay: self.initial_delay.unwrap_or(Duration::from_millis(10)),
            max_delay: self.max_delay.unwrap_or(Duration::from_millis(500)),
            multiplier: self.multiplier.unwrap_or(2.0),
            jitter: self.jitter.unwrap_or(true),
        }
    }
}

/// Retry an async operation while its error is retryable.
///
/// # Arguments
///
/// * `policy` - Retry policy configuration
/// * `operation_name` - Label used in logs and the retry counter
/// * `operation` - Async operation to retry (called once per attempt)
/// * `is_retryable` - Predicate to determine if an error should trigger a retry
///
/// # Returns
///
/// `Ok(T)` as soon as an attempt succeeds. A non-retryable error is returned
/// immediately. When every attempt failed with a retryable error, the last
/// error is returned.
///
/// # Errors
///
/// Returns the error of the final attempt.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: RetryPolicy,
    operation_name: &'static str,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    return Err(err);
                }

                if attempt >= policy.max_retries {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Operation failed after max retries"
                    );
                    return Err(err);
                }

                let delay = policy.jittered(policy.delay_for_attempt(attempt));
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Operation conflicted, retrying..."
                );
                crate::metrics::record_retry(operation_name);

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
