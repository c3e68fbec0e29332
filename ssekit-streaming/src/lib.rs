//! # ssekit-streaming
//!
//! Server-Sent Events client for ssekit.
//!
//! This crate connects to an SSE endpoint over HTTP, parses the event
//! stream and hands every event to a user callback. A stream that goes
//! silent for longer than the keep-alive window is dropped, and a stream can
//! be stopped from any task or thread.
//!
//! ## Core Concepts
//!
//! - **[`Client`]**: Owns one stream at a time, from connect to teardown
//! - **[`Event`]**: One parsed frame (`id`, `event`, `data`, `retry`)
//! - **[`EventBuilder`]**: Line-by-line frame parser
//! - **[`ClientConfig`]**: Keep-alive window, connect timeout, buffering
//! - **[`Supervisor`]**: Reconnect loop with backoff around a client
//!
//! ## Example - Streaming
//!
//! ```ignore
//! use ssekit_streaming::Client;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! let client = Arc::new(Client::new("https://example.com/events", 70)?);
//! let headers = HashMap::from([("Authorization".to_string(), token)]);
//!
//! let result = client
//!     .run(&headers, &HashMap::new(), |event| {
//!         if event.is_error() {
//!             eprintln!("server error: {}", event.data());
//!         }
//!     })
//!     .await;
//! ```
//!
//! ## Example - Parsing
//!
//! ```
//! use ssekit_streaming::EventBuilder;
//!
//! let mut builder = EventBuilder::new();
//! builder.add_line("event: update");
//! builder.add_line("data: {\"n\": 1}");
//!
//! let event = builder.build();
//! assert_eq!(event.event_type(), "update");
//! assert_eq!(event.data(), "{\"n\": 1}");
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
mod delivery;
pub mod error;
pub mod event;
pub mod supervisor;

#[cfg(test)]
mod test_support;

// Re-exports
pub use client::Client;
pub use config::{
    ClientConfig, DeliveryMode, DEFAULT_CONNECT_TIMEOUT, DEFAULT_EVENT_BUFFER,
    DEFAULT_KEEP_ALIVE_TIMEOUT, DEFAULT_MAX_LINE_LENGTH,
};
pub use error::{ConnectFailure, StreamError, StreamResult};
pub use event::{Event, EventBuilder};
pub use supervisor::Supervisor;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        Client, ClientConfig, DeliveryMode, Event, EventBuilder, StreamError, StreamResult,
        Supervisor,
    };
}
