//! Retry with backoff for operations failing with transient I/O errors.

use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts. None means infinite retries
    pub max_retries: Option<usize>,
    /// Initial delay between retries in milliseconds
    pub initial_delay_ms: u64,
    /// Whether to use exponential backoff
    pub exponential_backoff: bool,
    /// Upper bound on the delay between two attempts in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: Some(10),
            initial_delay_ms: 50,
            exponential_backoff: true,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryConfig {
    /// Returns the delay to wait before the provided attempt (1-indexed).
    pub fn delay(&self, attempt: usize) -> Duration {
        let delay_ms = if self.exponential_backoff {
            let exponent = attempt.saturating_sub(1).min(32) as u32;
            self.initial_delay_ms.saturating_mul(2_u64.saturating_pow(exponent))
        } else {
            self.initial_delay_ms
        };
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// Retry an operation as long as its error satisfies `retryable`. Errors that are not retryable
/// are returned immediately.
pub async fn retry_while<F, Fut, T, E, R>(
    operation_name: &str,
    operation: F,
    retryable: R,
    config: RetryConfig,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if !retryable(&error) {
                    return Err(error)
                }
                if config.max_retries.is_some_and(|max| attempt >= max) {
                    tracing::warn!(
                        target: "obscuro::db",
                        operation = operation_name,
                        ?error,
                        attempt,
                        "Retry ceiling reached"
                    );
                    return Err(error)
                }

                attempt += 1;
                tracing::debug!(
                    target: "obscuro::db",
                    operation = operation_name,
                    ?error,
                    attempt,
                    "Retrying operation"
                );

                tokio::time::sleep(config.delay(attempt)).await;
            }
        }
    }
}
