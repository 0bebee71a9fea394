//! Bounded retry with backoff for service calls.
//!
//! The first attempt runs immediately; attempt `n > 0` waits
//! `initial_delay_ms * multiplier^(n-1)`, capped at `max_delay_ms`. An
//! optional per-request timeout bounds each call and an optional deadline
//! bounds the whole sequence, waits included.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ServiceError;
use crate::metrics;

/// Configuration for retry with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between attempts in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
    /// Timeout applied to each individual request.
    pub request_timeout: Option<Duration>,
    /// Deadline for the whole sequence, including waits.
    pub overall_deadline: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3, 1_000, 4_000, 2.0)
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom values.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
            multiplier,
            request_timeout: None,
            overall_deadline: None,
        }
    }

    /// Raster and row upload: 4 attempts at 0, 1s, 2s, 4s.
    #[must_use]
    pub fn upload() -> Self {
        Self::new(4, 1_000, 4_000, 2.0)
    }

    /// Recognition: 3 attempts at 0, 1s, 2s under a 55s deadline.
    #[must_use]
    pub fn recognition() -> Self {
        Self::new(3, 1_000, 2_000, 2.0).with_overall_deadline(Duration::from_secs(55))
    }

    /// Validation: 3 attempts at 0, 800ms, 1.6s, each bounded by 20s.
    #[must_use]
    pub fn validation() -> Self {
        Self::new(3, 800, 1_600, 2.0).with_request_timeout(Duration::from_secs(20))
    }

    /// Speech synthesis: a single 20s attempt.
    #[must_use]
    pub fn speech() -> Self {
        Self::new(1, 0, 0, 1.0).with_request_timeout(Duration::from_secs(20))
    }

    /// Same attempt count with no waits between attempts.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, 0, 0, 1.0)
    }

    /// Bound each request.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Bound the whole sequence.
    #[must_use]
    pub fn with_overall_deadline(mut self, deadline: Duration) -> Self {
        self.overall_deadline = Some(deadline);
        self
    }

    /// Delay before a given attempt number (0-indexed).
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let exponent = (attempt - 1).min(31) as i32;
        let base_delay = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        base_delay.min(self.max_delay_ms as f64).max(0.0) as u64
    }

    /// Attempt count, never less than one.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Run `operation` until it succeeds, fails non-retryably, or attempts run out.
///
/// `service` names the call in logs and metrics. The closure receives the
/// 0-indexed attempt number.
///
/// # Errors
///
/// Returns the last error, or [`ServiceError::Timeout`] when a request
/// timeout or the overall deadline elapses.
pub async fn run_with_retry<T, F, Fut>(
    config: &RetryConfig,
    service: &'static str,
    mut operation: F,
) -> Result<T, ServiceError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let attempts = async {
        let max_attempts = config.attempts();
        let mut attempt = 0;
        loop {
            metrics::record_service_attempt(service);
            let result = match config.request_timeout {
                Some(limit) => tokio::time::timeout(limit, operation(attempt))
                    .await
                    .unwrap_or(Err(ServiceError::Timeout(limit))),
                None => operation(attempt).await,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    attempt += 1;
                    let delay = config.delay_for_attempt(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {}ms: {}",
                        service, attempt, max_attempts, delay, e
                    );
                    metrics::record_service_retry(service);
                    if delay > 0 {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
                Err(e) => {
                    metrics::record_service_failure(service);
                    return Err(e);
                }
            }
        }
    };

    match config.overall_deadline {
        Some(deadline) => tokio::time::timeout(deadline, attempts)
            .await
            .unwrap_or_else(|_| {
                warn!("{} exceeded its {}ms deadline", service, deadline.as_millis());
                metrics::record_service_failure(service);
                Err(ServiceError::Timeout(deadline))
            }),
        None => attempts.await,
    }
}
