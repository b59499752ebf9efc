use std::future::Future;
use std::time::Duration;

/// Fixed-backoff retry policy. `max_attempts` counts the first call.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::single_retry(Duration::from_millis(500))
    }
}

impl RetryConfig {
    /// One retry after `backoff`, the policy used for transient AI provider failures.
    pub fn single_retry(backoff: Duration) -> Self {
        Self {
            max_attempts: 2,
            backoff,
        }
    }
}

/// Runs `f` until it produces an outcome `should_retry` rejects or attempts run out.
/// The last outcome is returned as-is; nothing is swallowed.
pub async fn retry_async_with_config<F, Fut, T, P>(config: RetryConfig, should_retry: P, mut f: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let mut attempts_left = config.max_attempts.max(1);

    loop {
        let outcome = f().await;
        attempts_left -= 1;
        if attempts_left == 0 || !should_retry(&outcome) {
            return outcome;
        }

        tracing::warn!(
            "Transient failure, retrying in {:?} ({} attempt(s) left)",
            config.backoff,
            attempts_left
        );
        tokio::time::sleep(config.backoff).await;
    }
}
