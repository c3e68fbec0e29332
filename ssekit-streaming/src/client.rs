//! Server-Sent Events client.
//!
//! [`Client::run`] owns one stream from connect to teardown: it opens the
//! HTTP connection, spawns a reader task that turns the body into
//! [`Event`]s, and multiplexes shutdown requests, incoming events and the
//! keep-alive deadline until one of them ends the stream. Nothing spawned by
//! a call that runs to completion outlives it.

use crate::config::ClientConfig;
use crate::delivery::{self, Delivery};
use crate::error::{StreamError, StreamResult};
use crate::event::{Event, EventBuilder};
use futures::TryStreamExt;
use reqwest::header::{HeaderName, HeaderValue, ACCEPT};
use reqwest::{Request, Response, StatusCode};
use ssekit_core::{LifecycleManager, Status};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EVENT_STREAM: &str = "text/event-stream";

/// Client for one Server-Sent Events endpoint.
///
/// At most one stream is active per client. The client is meant to be
/// shared (`Arc<Client>`) between the task running the stream and whoever
/// stops it.
///
/// # Example
///
/// ```ignore
/// use ssekit_streaming::Client;
/// use std::collections::HashMap;
/// use std::sync::Arc;
///
/// let client = Arc::new(Client::new("https://example.com/events", 70)?);
///
/// let runner = {
///     let client = client.clone();
///     tokio::spawn(async move {
///         client
///             .run(&HashMap::new(), &HashMap::new(), |event| println!("{}", event.data()))
///             .await
///     })
/// };
///
/// client.shutdown(true).await;
/// runner.await??;
/// ```
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    http: reqwest::Client,
    lifecycle: LifecycleManager,
}

impl Client {
    /// Create a client with a keep-alive window of `timeout_secs` seconds.
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> StreamResult<Self> {
        Self::with_config(
            ClientConfig::new(url).keep_alive_timeout(Duration::from_secs(timeout_secs)),
        )
    }

    /// Create a client from a full config.
    pub fn with_config(config: ClientConfig) -> StreamResult<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| StreamError::InvalidConfig(e.to_string()))?;
        Ok(Self::from_parts(config, http))
    }

    /// Create a client reusing an existing HTTP client.
    ///
    /// The HTTP client must not have a total request timeout, or it will
    /// cut long-lived streams.
    pub fn with_http_client(config: ClientConfig, http: reqwest::Client) -> StreamResult<Self> {
        config.validate()?;
        Ok(Self::from_parts(config, http))
    }

    fn from_parts(config: ClientConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            lifecycle: LifecycleManager::new(),
        }
    }

    /// Get the stream URL.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Get the config.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns `true` while a stream is established and being read.
    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Get the lifecycle status.
    pub fn status(&self) -> Status {
        self.lifecycle.status()
    }

    /// Connect and stream events into `callback` until the stream ends.
    ///
    /// Returns `Ok(())` when the stream was stopped through
    /// [`shutdown`](Self::shutdown). Every other ending is an error; none is
    /// retried here.
    ///
    /// Empty frames (keep-alives) refresh the keep-alive deadline but never
    /// reach the callback. The callback runs on a blocking thread; how calls
    /// are ordered depends on [`DeliveryMode`](crate::DeliveryMode). At most
    /// [`event_buffer`](ClientConfig::event_buffer) events wait for the
    /// callback; beyond that the stream is read no faster than the callback
    /// keeps up.
    ///
    /// # Cancellation
    ///
    /// Dropping the future stops the reader, discards events not yet handed
    /// to the callback and returns the client to idle. A callback already
    /// running on its blocking thread cannot be interrupted and may still be
    /// running once the client reports idle. Use [`shutdown`](Self::shutdown)
    /// to wait for callbacks as well.
    ///
    /// # Errors
    ///
    /// - [`StreamError::AlreadyRunning`] if a stream is active, without any
    ///   network call.
    /// - [`StreamError::ConnectionFailed`] if the request could not be built,
    ///   the transport failed, or the status was not 200.
    /// - [`StreamError::ReadError`] if the stream ended on its own.
    /// - [`StreamError::Timeout`] if nothing arrived within the keep-alive
    ///   window.
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
            warn!(url = %self.config.url, "Stream already running, ignoring new run");
            return Err(StreamError::AlreadyRunning);
        }
        let _completion = self.lifecycle.completion_guard();

        let cancel = CancellationToken::new();
        let _cancel_on_exit = cancel.clone().drop_guard();

        let request = self.build_request(headers, params).map_err(|err| {
            error!(url = %self.config.url, error = %err, "Could not build stream request");
            err
        })?;

        info!(url = %self.config.url, "Connecting to event stream");
        let response = tokio::select! {
            biased;
            _ = self.lifecycle.shutdown_requested() => {
                info!(url = %self.config.url, "Shutdown requested while connecting");
                return Ok(());
            }
            response = self.http.execute(request) => response.map_err(|err| {
                error!(url = %self.config.url, error = %err, "Stream request failed");
                StreamError::transport(err)
            })?,
        };

        let status = response.status();
        if status != StatusCode::OK {
            error!(url = %self.config.url, status = status.as_u16(), "Stream rejected by server");
            return Err(StreamError::status(status.as_u16()));
        }

        if !self.lifecycle.initialization_complete() {
            info!(url = %self.config.url, "Shutdown requested before stream started");
            return Ok(());
        }
        info!(url = %self.config.url, "Event stream connected");

        self.stream_events(response, cancel, Arc::new(callback)).await
    }

    fn build_request(
        &self,
        headers: &HashMap<String, String>,
        params: &HashMap<String, String>,
    ) -> StreamResult<Request> {
        let mut builder = self.http.get(&self.config.url);
        if !params.is_empty() {
            builder = builder.query(params);
        }
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| StreamError::invalid_request(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| StreamError::invalid_request(format!("header {name}: {e}")))?;
            builder = builder.header(name, value);
        }

        let mut request = builder.build().map_err(StreamError::invalid_request)?;
        request
            .headers_mut()
            .insert(ACCEPT, HeaderValue::from_static(EVENT_STREAM));
        Ok(request)
    }

    async fn stream_events<F>(
        &self,
        response: Response,
        cancel: CancellationToken,
        callback: Arc<F>,
    ) -> StreamResult<()>
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        let (tx, mut events) = mpsc::channel(self.config.event_buffer);
        let reader = tokio::spawn(read_events(
            response,
            tx,
            cancel.clone(),
            self.config.max_line_length,
        ));
        let mut delivery =
            Delivery::start(self.config.delivery, self.config.event_buffer, callback);

        let timeout = self.config.keep_alive_timeout;
        let keep_alive = tokio::time::sleep(timeout);
        tokio::pin!(keep_alive);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = self.lifecycle.shutdown_requested() => {
                    info!(url = %self.config.url, "Shutting down event stream");
                    break Ok(());
                }
                event = events.recv() => match event {
                    Some(event) => {
                        keep_alive.as_mut().reset(Instant::now() + timeout);
                        if event.is_empty() {
                            debug!("Keep-alive received");
                            continue;
                        }
                        // Waits while delivery is at capacity, which in turn
                        // holds back the reader.
                        tokio::select! {
                            biased;
                            _ = self.lifecycle.shutdown_requested() => {
                                info!(url = %self.config.url, "Shutting down event stream");
                                break Ok(());
                            }
                            () = delivery.deliver(event) => {}
                        }
                    }
                    None => {
                        if self.lifecycle.abnormal_shutdown() {
                            warn!(url = %self.config.url, "Event stream closed unexpectedly");
                            break Err(StreamError::ReadError);
                        }
                        info!(url = %self.config.url, "Event stream closed while shutting down");
                        break Ok(());
                    }
                },
                () = &mut keep_alive => {
                    warn!(
                        url = %self.config.url,
                        timeout_ms = timeout.as_millis() as u64,
                        "No frame received within keep-alive window"
                    );
                    self.lifecycle.abnormal_shutdown();
                    break Err(StreamError::Timeout);
                }
                Some(joined) = delivery.join_next(), if delivery.needs_reaping() => {
                    delivery::reap(joined);
                }
            }
        };

        cancel.cancel();
        drop(events);
        if let Err(err) = reader.await {
            error!(error = %err, "Event stream reader failed");
        }
        delivery.finish().await;
        debug!(url = %self.config.url, "Event stream drained");

        outcome
    }

    /// Ask the running stream to stop without waiting for it.
    ///
    /// Returns `false` if nothing was running. Safe to call from any thread.
    pub fn request_shutdown(&self) -> bool {
        let requested = self.lifecycle.begin_shutdown();
        if !requested {
            debug!(url = %self.config.url, "Shutdown requested but no stream is running");
        }
        requested
    }

    /// Stop the running stream.
    ///
    /// A no-op when nothing is running. With `blocking`, returns only after
    /// the stream call has released every resource.
    pub async fn shutdown(&self, blocking: bool) {
        if !self.request_shutdown() {
            return;
        }
        if blocking {
            self.lifecycle.wait_shutdown_complete().await;
        }
    }

    /// Block the current thread until no stream is active.
    ///
    /// For callers outside the async runtime. Pair with
    /// [`request_shutdown`](Self::request_shutdown).
    pub fn block_until_stopped(&self) {
        self.lifecycle.block_until_shutdown_complete();
    }
}

/// Read the body line by line and push one event per frame.
///
/// Every blank line produces an event, an empty one when the frame carried
/// nothing, so bare keep-alive newlines still reach the dispatcher. Closing
/// the channel (by returning) tells the dispatcher the stream ended.
async fn read_events(
    response: Response,
    events: mpsc::Sender<Event>,
    cancel: CancellationToken,
    max_line_length: usize,
) {
    let body = Box::pin(response.bytes_stream().map_err(io::Error::other));
    let mut reader = StreamReader::new(body);
    let mut buf = Vec::new();
    let mut builder = EventBuilder::new();

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Event stream reader cancelled");
                return;
            }
            line = read_line(&mut reader, &mut buf, max_line_length) => line,
        };

        match line {
            Ok(Line::Complete) if buf.is_empty() => {
                let event = builder.build();
                builder.reset();

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    sent = events.send(event) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
            Ok(Line::Complete) => {
                let line = String::from_utf8_lossy(&buf);
                debug!(line = %line, "Event stream line");
                builder.add_line(&line);
            }
            Ok(Line::Eof) => {
                info!("Event stream reached end of body");
                return;
            }
            Ok(Line::TooLong) => {
                warn!(limit = max_line_length, "Event stream line too long, closing stream");
                return;
            }
            Err(err) => {
                warn!(error = %err, "Error reading event stream");
                return;
            }
        }
    }
}

enum Line {
    /// A line is in the buffer, terminator stripped.
    Complete,
    Eof,
    /// More than the allowed bytes arrived without a line terminator.
    TooLong,
}

/// Read one `\n` or `\r\n` terminated line of raw bytes into `buf`.
///
/// Bytes are kept as they are; decoding is up to the caller. A final line
/// without terminator is returned before [`Line::Eof`].
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    loop {
        let (used, terminated) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(if buf.is_empty() { Line::Eof } else { Line::Complete });
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    buf.extend_from_slice(&available[..end]);
                    (end + 1, true)
                }
                None => {
                    buf.extend_from_slice(available);
                    (available.len(), false)
                }
            }
        };
        reader.consume(used);

        if terminated {
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
            return Ok(if buf.len() > limit { Line::TooLong } else { Line::Complete });
        }
        // One extra byte for a `\r` still waiting for its `\n`.
        if buf.len() > limit.saturating_add(1) {
            return Ok(Line::TooLong);
        }
    }
}
