//! Reconnect supervisor.
//!
//! [`Client::run`] never reconnects. A [`Supervisor`] drives a client in a
//! loop, backing off between attempts according to a [`RetryConfig`].
//!
//! An attempt that got as far as an established stream (it ended with
//! [`StreamError::ReadError`] or [`StreamError::Timeout`]) resets the
//! backoff; consecutive connection failures grow it until the retry budget
//! runs out.

use crate::client::Client;
use crate::error::{StreamError, StreamResult};
use crate::event::Event;
use ssekit_core::LifecycleManager;
use ssekit_retries::{RetryConfig, Retryable};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Keeps a [`Client`] connected.
///
/// # Example
///
/// ```ignore
/// use ssekit_streaming::{Client, Supervisor};
/// use ssekit_retries::RetryConfig;
///
/// let client = Arc::new(Client::new("https://example.com/events", 70)?);
/// let supervisor = Arc::new(Supervisor::new(client, RetryConfig::for_streaming()));
///
/// let handle = {
///     let supervisor = supervisor.clone();
///     tokio::spawn(async move { supervisor.run(&headers, &params, on_event).await })
/// };
///
/// supervisor.stop_and_wait().await;
/// ```
#[derive(Debug)]
pub struct Supervisor {
    client: Arc<Client>,
    config: RetryConfig,
    lifecycle: LifecycleManager,
}

impl Supervisor {
    /// Create a supervisor for `client`.
    pub fn new(client: Arc<Client>, config: RetryConfig) -> Self {
        Self {
            client,
            config,
            lifecycle: LifecycleManager::new(),
        }
    }

    /// Get the supervised client.
    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    /// Returns `true` while the reconnect loop is active.
    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Run the client until stopped or until an attempt fails for good.
    ///
    /// The last `retry` hint received from the server is offered to the
    /// wait strategy; only [`WaitStrategy::RetryAfter`] uses it.
    ///
    /// [`WaitStrategy::RetryAfter`]: ssekit_retries::WaitStrategy::RetryAfter
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::AlreadyRunning`] if this supervisor or its
    /// client is already running, the first non-retryable error, or the
    /// last error once the retry budget is spent.
    pub async fn run<F>(
        &self,
        headers: &HashMap<String, String>,
        params: &HashMap<String, String>,
        callback: F,
    ) -> StreamResult<()>
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        if !self.lifecycle.begin_initialization() {
            return Err(StreamError::AlreadyRunning);
        }
        let _completion = self.lifecycle.completion_guard();
        if !self.lifecycle.initialization_complete() {
            return Ok(());
        }

        let callback = Arc::new(callback);
        let retry_hint = Arc::new(AtomicI64::new(0));
        let mut attempt: u32 = 0;

        loop {
            if !self.lifecycle.is_running() {
                return Ok(());
            }

            let on_event = {
                let callback = callback.clone();
                let retry_hint = retry_hint.clone();
                move |event: Event| {
                    if event.retry() > 0 {
                        retry_hint.store(event.retry(), Ordering::Relaxed);
                    }
                    (*callback)(event);
                }
            };

            let run = self.client.run(headers, params, on_event);
            tokio::pin!(run);
            let mut stop_forwarded = false;
            let result = loop {
                tokio::select! {
                    biased;
                    result = &mut run => break result,
                    _ = self.lifecycle.shutdown_requested(), if !stop_forwarded => {
                        stop_forwarded = true;
                        self.client.request_shutdown();
                    }
                }
            };

            if !self.lifecycle.is_running() {
                info!(url = %self.client.url(), "Supervisor stopped");
                return Ok(());
            }

            let err = match result {
                Ok(()) => {
                    info!(url = %self.client.url(), "Stream stopped, supervisor exiting");
                    return Ok(());
                }
                Err(err) => err,
            };
            if !err.is_retryable() {
                warn!(url = %self.client.url(), error = %err, "Stream failed, not retrying");
                return Err(err);
            }

            attempt = if err.is_stream_loss() { 1 } else { attempt + 1 };
            if !self.config.allows_attempt(attempt) {
                warn!(
                    url = %self.client.url(),
                    attempts = attempt,
                    error = %err,
                    "Retry budget exhausted"
                );
                return Err(err);
            }

            let hint = match retry_hint.load(Ordering::Relaxed) {
                ms if ms > 0 => Some(Duration::from_millis(ms as u64)),
                _ => None,
            };
            let wait = self.config.wait.calculate(attempt, hint);
            warn!(
                url = %self.client.url(),
                attempt,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "Stream ended, reconnecting"
            );

            tokio::select! {
                biased;
                _ = self.lifecycle.shutdown_requested() => {
                    debug!("Supervisor stopped during backoff");
                    return Ok(());
                }
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Stop the loop and the running stream without waiting.
    pub fn stop(&self) {
        let stopping = self.lifecycle.begin_shutdown();
        self.client.request_shutdown();
        debug!(stopping, "Supervisor stop requested");
    }

    /// Stop the loop and wait until [`run`](Self::run) has returned.
    pub async fn stop_and_wait(&self) {
        self.stop();
        self.lifecycle.wait_shutdown_complete().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::test_support::{sse_head, Step, TestServer};
    use pretty_assertions::assert_eq;
    use ssekit_retries::WaitStrategy;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::Instant;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn supervisor(url: String, config: RetryConfig) -> Arc<Supervisor> {
        let client = Client::with_config(
            ClientConfig::new(url).keep_alive_timeout(Duration::from_secs(30)),
        )
        .unwrap();
        Arc::new(Supervisor::new(Arc::new(client), config))
    }

    fn no_args() -> HashMap<String, String> {
        HashMap::new()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reconnects_after_stream_loss() {
        let server = TestServer::start(vec![Step::write(sse_head()), Step::write("data: x\n\n")]).await;
        // One retry only, yet losing an established stream never uses it up.
        let supervisor = supervisor(
            server.url("/"),
            RetryConfig::new().max_retries(1).fixed(Duration::from_millis(20)),
        );
        let count = Arc::new(AtomicUsize::new(0));

        let handle = {
            let supervisor = supervisor.clone();
            let count = count.clone();
            tokio::spawn(async move {
                supervisor
                    .run(&no_args(), &no_args(), move |_| {
                        count.fetch_add(1, Ordering::SeqCst);
                    })
                    .await
            })
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 3 {
            assert!(Instant::now() < deadline, "supervisor did not reconnect");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(supervisor.is_running());

        supervisor.stop_and_wait().await;
        assert!(!supervisor.is_running());
        assert!(handle.await.unwrap().is_ok());
        assert!(server.request_count() >= 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let supervisor = supervisor(
            server.uri(),
            RetryConfig::new().max_retries(2).fixed(Duration::from_millis(10)),
        );
        let err = supervisor.run(&no_args(), &no_args(), |_| {}).await.unwrap_err();
        assert_eq!(err.http_status(), Some(503));
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let supervisor = supervisor(server.uri(), RetryConfig::for_streaming());
        let err = supervisor.run(&no_args(), &no_args(), |_| {}).await.unwrap_err();
        assert_eq!(err.http_status(), Some(401));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_interrupts_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let supervisor = supervisor(
            server.uri(),
            RetryConfig::new().unlimited().fixed(Duration::from_secs(60)),
        );
        let handle = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.run(&no_args(), &no_args(), |_| {}).await })
        };

        tokio::time::sleep(Duration::from_millis(300)).await;
        tokio::time::timeout(Duration::from_secs(2), supervisor.stop_and_wait())
            .await
            .expect("stop did not interrupt backoff");
        assert!(handle.await.unwrap().is_ok());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_retry_hint_is_honored() {
        let server = TestServer::start(vec![
            Step::write(sse_head()),
            Step::write("retry: 50\ndata: x\n\n"),
        ])
        .await;
        let supervisor = supervisor(
            server.url("/"),
            RetryConfig::new().unlimited().wait(WaitStrategy::RetryAfter {
                fallback: Box::new(WaitStrategy::Fixed(Duration::from_secs(60))),
                cap: Duration::from_secs(10),
            }),
        );
        let handle = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.run(&no_args(), &no_args(), |_| {}).await })
        };

        let deadline = Instant::now() + Duration::from_secs(3);
        while server.request_count() < 2 {
            assert!(Instant::now() < deadline, "retry hint was not used");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        supervisor.stop_and_wait().await;
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_run_is_rejected() {
        let server = TestServer::start(vec![
            Step::write(sse_head()),
            Step::Sleep(Duration::from_secs(10)),
        ])
        .await;
        let supervisor = supervisor(server.url("/"), RetryConfig::for_streaming());
        let handle = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.run(&no_args(), &no_args(), |_| {}).await })
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while !supervisor.client().is_running() {
            assert!(Instant::now() < deadline, "stream did not start");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let second = supervisor.run(&no_args(), &no_args(), |_| {}).await;
        assert!(matches!(second, Err(StreamError::AlreadyRunning)));

        supervisor.stop_and_wait().await;
        assert!(handle.await.unwrap().is_ok());
        assert!(!supervisor.client().is_running());
    }
}
