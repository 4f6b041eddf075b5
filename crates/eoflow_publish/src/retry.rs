//! One retry policy for every catalog call.

use eoflow_protocol::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::CatalogError;

/// Bounded retries with a fixed or growing delay.
///
/// Only [`CatalogError::is_retryable`] failures are retried; everything else
/// is returned on the first attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub max_delay: Duration,
    /// 1.0 keeps the delay fixed
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: config.delay(),
            max_delay: config.max_delay(),
            backoff_factor: config.backoff_factor.max(1.0),
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            max_delay: delay,
            backoff_factor: 1.0,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` is 1-indexed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let scaled = self.delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64().max(self.delay.as_secs_f64()));
        Duration::from_secs_f64(capped)
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, CatalogError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        "Retryable catalog failure, retrying in {:?}: {}",
                        delay,
                        err
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(20));
        assert_eq!(policy.delay_for(1), Duration::from_secs(20));
        assert_eq!(policy.delay_for(5), Duration::from_secs(20));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let policy = RetryPolicy::fixed(3, Duration::ZERO);
        let calls = AtomicU32::new(0);
        let result = policy
            .run("get_item", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(CatalogError::status(503, "unavailable"))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::fixed(3, Duration::ZERO);
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy
            .run("get_item", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CatalogError::Network("connection reset".into()))
            })
            .await;
        assert!(matches!(result, Err(CatalogError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let policy = RetryPolicy::fixed(5, Duration::ZERO);
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy
            .run("get_item", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CatalogError::status(403, "forbidden"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
