//! # ssekit-retries
//!
//! Retry strategies for ssekit.
//!
//! The streaming client never retries on its own. This crate provides the
//! backoff pieces a caller layers on top of it, either directly through
//! [`with_retry`] or through the reconnect supervisor in `ssekit-streaming`.
//!
//! ## Core Concepts
//!
//! - **[`RetryConfig`]**: How many times to retry and how long to wait
//! - **[`WaitStrategy`]**: Delay between attempts
//! - **[`Retryable`]**: Lets an error type say whether it is worth retrying
//! - **[`with_retry`]**: Execute an async operation with retries
//!
//! ## Wait Strategies
//!
//! - [`WaitStrategy::Fixed`]: Constant delay between attempts
//! - [`WaitStrategy::Exponential`]: Growing delay with a cap and optional jitter
//! - [`WaitStrategy::Linear`]: Linearly increasing delay
//! - [`WaitStrategy::RetryAfter`]: Prefer a server supplied delay
//!
//! ## Example
//!
//! ```ignore
//! use ssekit_retries::{with_retry, RetryConfig};
//! use std::time::Duration;
//!
//! let config = RetryConfig::new()
//!     .max_retries(3)
//!     .exponential(Duration::from_secs(1), Duration::from_secs(30));
//!
//! let result = with_retry(&config, || async {
//!     client.run(&headers, &params, |event| println!("{event:?}")).await
//! })
//! .await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod executor;
pub mod retryable;

// Re-exports
pub use config::{RetryConfig, WaitStrategy};
pub use executor::{with_retry, with_retry_state, AttemptInfo, RetryState};
pub use retryable::Retryable;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{with_retry, RetryConfig, Retryable, WaitStrategy};
}
