use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use crate::{AdmissionController, GisError, Result, RetryPolicy};

/// Exponential backoff without a server hint:
/// `min(base_delay * 2^attempt + U(0, jitter_factor), max_delay)`.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exponential = policy.base_delay.as_secs_f64() * 2f64.powi(attempt.min(30) as i32);
    let jitter = if policy.jitter_factor > 0.0 {
        rand::rng().random_range(0.0..=policy.jitter_factor)
    } else {
        0.0
    };
    let capped = (exponential + jitter).min(policy.max_delay.as_secs_f64());
    Duration::try_from_secs_f64(capped).unwrap_or(policy.max_delay)
}

/// One failed attempt inside a single retry loop.
#[derive(Debug)]
struct RetryAttempt {
    index: u32,
    error: GisError,
    retryable: bool,
    delay: Duration,
}

impl RetryAttempt {
    fn new(index: u32, error: GisError, policy: &RetryPolicy) -> Self {
        let retryable = error.is_retryable();
        let delay = error
            .retry_after()
            .unwrap_or_else(|| backoff_delay(policy, index));
        Self {
            index,
            error,
            retryable,
            delay,
        }
    }
}

/// Drives one logical request to success or exhaustion.
///
/// Every attempt holds an admission slot for the duration of the
/// operation only; backoff sleeps happen with the slot released.
#[derive(Clone, Copy, Debug)]
pub struct RetryEngine<'a> {
    policy: &'a RetryPolicy,
    admission: &'a AdmissionController,
}

impl<'a> RetryEngine<'a> {
    pub fn new(policy: &'a RetryPolicy, admission: &'a AdmissionController) -> Self {
        Self { policy, admission }
    }

    /// Runs `operation` until it succeeds, fails terminally, or the policy
    /// is exhausted.
    ///
    /// `operation` receives the zero-based attempt index. Exhaustion yields
    /// [`GisError::MaxRetriesExceeded`] with `attempts == max_retries + 1`.
    pub async fn execute<T, F, Fut>(&self, target: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_retries + 1;
        #[cfg(not(feature = "tracing"))]
        let _ = (target, max_attempts);
        let mut index = 0u32;
        loop {
            let outcome = {
                let _permit = self.admission.acquire().await?;
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "request attempt {}/{}: GET {}",
                    index + 1,
                    max_attempts,
                    target
                );
                operation(index).await
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let attempt = RetryAttempt::new(index, error, self.policy);
            if !attempt.retryable {
                return Err(attempt.error);
            }
            if attempt.index >= self.policy.max_retries {
                #[cfg(feature = "tracing")]
                tracing::warn!("giving up on {} after {} attempts", target, max_attempts);
                return Err(GisError::MaxRetriesExceeded {
                    attempts: attempt.index + 1,
                    last_error: Box::new(attempt.error),
                });
            }

            #[cfg(feature = "tracing")]
            tracing::warn!(
                "retryable error on attempt {}: {}; retrying in {:.2}s (attempt {}/{})",
                attempt.index + 1,
                attempt.error,
                attempt.delay.as_secs_f64(),
                attempt.index + 2,
                max_attempts
            );

            sleep(attempt.delay).await;
            index += 1;
        }
    }
}
