use std::future::Future;
use std::time::Duration;

use atelier_core::config::PersistenceConfig;
use atelier_core::errors::ApplicationError;
use tracing::warn;

/// Bounded exponential backoff for persistence calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_delay_ms: 100, max_delay_ms: 2_000 }
    }
}

impl From<&PersistenceConfig> for RetryPolicy {
    fn from(config: &PersistenceConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts,
            initial_delay_ms: config.retry_initial_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }
}

impl RetryPolicy {
    /// No waiting and a single attempt.
    pub fn none() -> Self {
        Self { max_attempts: 1, initial_delay_ms: 0, max_delay_ms: 0 }
    }

    /// Delay before the retry that follows failed attempt `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.initial_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Runs `operation` until it succeeds, fails with a non-transient error,
    /// or the attempt budget is spent.
    pub async fn run<T, F, Fut>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, ApplicationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApplicationError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_transient() => return Err(error),
                Err(error) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        warn!(
                            event_name = "persistence.retry.exhausted",
                            operation = operation_name,
                            attempts = attempt,
                            error = %error,
                            "persistence retries exhausted"
                        );
                        return Err(error);
                    }

                    let delay = self.backoff(attempt - 1);
                    warn!(
                        event_name = "persistence.retry.scheduled",
                        operation = operation_name,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "transient persistence failure; retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
