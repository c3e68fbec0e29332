//! Retry executor for running operations with retries.

use crate::config::RetryConfig;
use crate::retryable::Retryable;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// State of a retry loop.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Current attempt number (1-indexed).
    pub attempt: u32,
    /// Last error message.
    pub last_error: Option<String>,
    /// Total time spent waiting.
    pub total_wait_time: Duration,
    /// History of attempts.
    pub history: Vec<AttemptInfo>,
}

/// Information about a single attempt.
#[derive(Debug, Clone)]
pub struct AttemptInfo {
    /// Attempt number.
    pub attempt: u32,
    /// Whether it succeeded.
    pub success: bool,
    /// Error message if failed.
    pub error: Option<String>,
    /// Time waited after this attempt.
    pub wait_time: Duration,
}

impl RetryState {
    fn record(&mut self, error: Option<String>, wait: Duration) {
        self.total_wait_time += wait;
        self.history.push(AttemptInfo {
            attempt: self.attempt,
            success: error.is_none(),
            error: error.clone(),
            wait_time: wait,
        });
        if error.is_some() {
            self.last_error = error;
        }
    }
}

/// Execute an operation with retries.
///
/// The operation is re-invoked while its error reports
/// [`Retryable::is_retryable`] and the config allows more attempts.
///
/// # Example
///
/// ```ignore
/// use ssekit_retries::{with_retry, RetryConfig};
///
/// let config = RetryConfig::for_streaming();
/// with_retry(&config, || client.run(&headers, &params, on_event)).await?;
/// ```
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    with_retry_state(config, operation).await.0
}

/// Execute with retries and get state information.
pub async fn with_retry_state<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> (Result<T, E>, RetryState)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut state = RetryState::default();

    loop {
        state.attempt += 1;

        debug!(
            attempt = state.attempt,
            max_retries = ?config.max_retries,
            "Executing retry attempt"
        );

        let error = match operation().await {
            Ok(value) => {
                state.record(None, Duration::ZERO);
                return (Ok(value), state);
            }
            Err(error) => error,
        };

        if !error.is_retryable() || !config.allows_attempt(state.attempt) {
            warn!(
                attempt = state.attempt,
                retryable = error.is_retryable(),
                error = %error,
                "Giving up"
            );
            state.record(Some(error.to_string()), Duration::ZERO);
            return (Err(error), state);
        }

        let wait = config.wait.calculate(state.attempt, error.retry_after());
        debug!(
            attempt = state.attempt,
            wait_ms = wait.as_millis() as u64,
            error = %error,
            "Attempt failed, retrying"
        );
        state.record(Some(error.to_string()), wait);
        sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError {
        retryable: bool,
        retry_after: Option<Duration>,
    }

    impl TestError {
        fn transient() -> Self {
            Self {
                retryable: true,
                retry_after: None,
            }
        }

        fn fatal() -> Self {
            Self {
                retryable: false,
                retry_after: None,
            }
        }
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "stream dropped (retryable: {})", self.retryable)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }

        fn retry_after(&self) -> Option<Duration> {
            self.retry_after
        }
    }

    #[tokio::test]
    async fn test_server_hint_drives_wait() {
        let config = RetryConfig::new()
            .max_retries(1)
            .fixed(Duration::from_secs(30))
            .honor_retry_after(Duration::from_secs(1));

        let (result, state) = with_retry_state(&config, || async {
            Err::<(), _>(TestError {
                retryable: true,
                retry_after: Some(Duration::from_millis(5)),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(state.total_wait_time, Duration::from_millis(5));
        assert_eq!(state.history[0].wait_time, Duration::from_millis(5));
        assert_eq!(state.history[1].wait_time, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_with_retry_eventual_success() {
        let config = RetryConfig::new()
            .max_retries(3)
            .fixed(Duration::from_millis(1));

        let attempts = Arc::new(AtomicU32::new(0));
        let result = with_retry(&config, || {
            let attempts = attempts.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::transient())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_exhausted() {
        let config = RetryConfig::new()
            .max_retries(2)
            .fixed(Duration::from_millis(1));

        let (result, state) = with_retry_state(&config, || async {
            Err::<i32, _>(TestError::transient())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(state.attempt, 3);
        assert_eq!(state.history.len(), 3);
        assert_eq!(state.total_wait_time, Duration::from_millis(2));
    }

    #[tokio::test]
    async fn test_with_retry_non_retryable() {
        let config = RetryConfig::new().max_retries(3);

        let attempts = Arc::new(AtomicU32::new(0));
        let result = with_retry(&config, || {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::fatal())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_state_history() {
        let config = RetryConfig::new()
            .max_retries(3)
            .fixed(Duration::from_millis(1));

        let mut calls = 0;
        let (result, state) = with_retry_state(&config, || {
            calls += 1;
            let fail = calls < 2;
            async move {
                if fail {
                    Err(TestError::transient())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(state.attempt, 2);
        assert!(!state.history[0].success);
        assert!(state.history[1].success);
        assert!(state.last_error.is_some());
    }
}
