//! # ssekit - Server-Sent Events client for Rust
//!
//! ssekit consumes a long-lived `text/event-stream` endpoint and hands each
//! event to a callback. It notices silent connections through a keep-alive
//! timeout, shuts down cleanly from any thread, and can keep a stream
//! connected with a backoff supervisor.
//!
//! ## Quick Start
//!
//! ```ignore
//! use ssekit::prelude::*;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StreamError> {
//!     let client = Arc::new(Client::new("https://example.com/events", 70)?);
//!
//!     let stream = {
//!         let client = client.clone();
//!         tokio::spawn(async move {
//!             client
//!                 .run(&HashMap::new(), &HashMap::new(), |event| {
//!                     println!("{}: {}", event.event_type(), event.data());
//!                 })
//!                 .await
//!         })
//!     };
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     client.shutdown(true).await;
//!     stream.await.ok();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ssekit is organized as a workspace of focused crates:
//!
//! - [`ssekit_core`] - Start/stop lifecycle state machine
//! - [`ssekit_retries`] - Retry configuration and backoff strategies
//! - [`ssekit_streaming`] - Event parser, stream client and supervisor
//!
//! ## Errors
//!
//! [`Client::run`] returns `Ok(())` only when the stream was shut down on
//! request. Everything else is a [`StreamError`]:
//!
//! | Error | Meaning |
//! |-------|---------|
//! | `AlreadyRunning` | Another stream is active on the client |
//! | `ConnectionFailed` | Bad request, transport failure or non-200 status |
//! | `ReadError` | The server closed the stream |
//! | `Timeout` | Nothing arrived within the keep-alive window |
//!
//! ## Logging
//!
//! All crates log through [`tracing`](https://docs.rs/tracing). Install any
//! subscriber to see connection, shutdown and callback failure events.

#![warn(missing_docs)]
#![deny(unsafe_code)]

// ============================================================================
// Crate Re-exports
// ============================================================================

/// Lifecycle state machine.
pub use ssekit_core as core;

/// Retry strategies.
pub use ssekit_retries as retries;

/// Streaming client.
pub use ssekit_streaming as streaming;

// ============================================================================
// Type Re-exports (Flat)
// ============================================================================

// Lifecycle
pub use ssekit_core::{CompletionGuard, LifecycleManager, Status};

// Retries
pub use ssekit_retries::{with_retry, RetryConfig, Retryable, WaitStrategy};

// Streaming
pub use ssekit_streaming::{
    Client, ClientConfig, ConnectFailure, DeliveryMode, Event, EventBuilder, StreamError,
    StreamResult, Supervisor,
};

// ============================================================================
// Prelude
// ============================================================================

/// Prelude for common imports.
///
/// ```rust
/// use ssekit::prelude::*;
///
/// let config = ClientConfig::new("https://example.com/events")
///     .keep_alive_timeout(std::time::Duration::from_secs(30));
/// assert!(Client::with_config(config).is_ok());
/// ```
pub mod prelude {
    pub use crate::{
        Client, ClientConfig, DeliveryMode, Event, RetryConfig, StreamError, StreamResult,
        Supervisor,
    };
}

// ============================================================================
// Version Information
// ============================================================================

/// Returns the current version of ssekit.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
