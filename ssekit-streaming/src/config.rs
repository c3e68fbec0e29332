//! Client configuration.

use crate::error::{StreamError, StreamResult};
use std::time::Duration;

/// Default keep-alive window.
pub const DEFAULT_KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(70);

/// Default timeout for establishing the TCP/TLS connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the channel between the reader and the dispatcher.
pub const DEFAULT_EVENT_BUFFER: usize = 1000;

/// Default limit for a single line of the event stream.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// How events are handed to the callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// One worker invokes the callback for each event in arrival order.
    #[default]
    Ordered,
    /// Each event gets its own task; invocations may overlap and reorder.
    Concurrent,
}

/// Configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Stream URL.
    pub url: String,
    /// Maximum silence, keep-alives included, before the stream is dropped.
    pub keep_alive_timeout: Duration,
    /// Timeout for establishing the connection.
    pub connect_timeout: Duration,
    /// Capacity of the reader to dispatcher channel. Also bounds how many
    /// events wait for, or run in, the callback.
    pub event_buffer: usize,
    /// Longest accepted line in bytes, line terminator excluded. A longer
    /// line ends the stream with [`StreamError::ReadError`].
    pub max_line_length: usize,
    /// Callback delivery mode.
    pub delivery: DeliveryMode,
}

impl ClientConfig {
    /// Create a config with defaults for everything but the URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            keep_alive_timeout: DEFAULT_KEEP_ALIVE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            event_buffer: DEFAULT_EVENT_BUFFER,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            delivery: DeliveryMode::default(),
        }
    }

    /// Set the keep-alive window.
    #[must_use]
    pub fn keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.keep_alive_timeout = timeout;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the event channel capacity.
    #[must_use]
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Set the line length limit.
    #[must_use]
    pub fn max_line_length(mut self, bytes: usize) -> Self {
        self.max_line_length = bytes;
        self
    }

    /// Set the delivery mode.
    #[must_use]
    pub fn delivery(mut self, mode: DeliveryMode) -> Self {
        self.delivery = mode;
        self
    }

    /// Check the config for values the client cannot work with.
    ///
    /// The URL is not checked here; an unusable URL surfaces as a
    /// connection failure from [`Client::run`](crate::Client::run).
    pub fn validate(&self) -> StreamResult<()> {
        if self.keep_alive_timeout.is_zero() {
            return Err(StreamError::InvalidConfig(
                "keep-alive timeout should be higher than 0".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(StreamError::InvalidConfig(
                "connect timeout should be higher than 0".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(StreamError::InvalidConfig(
                "event buffer should have capacity".to_string(),
            ));
        }
        if self.max_line_length == 0 {
            return Err(StreamError::InvalidConfig(
                "max line length should be higher than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("http://localhost/stream");
        assert_eq!(config.keep_alive_timeout, Duration::from_secs(70));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.event_buffer, 1000);
        assert_eq!(config.max_line_length, 1024 * 1024);
        assert_eq!(config.delivery, DeliveryMode::Ordered);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new("http://localhost/stream")
            .keep_alive_timeout(Duration::from_secs(2))
            .connect_timeout(Duration::from_millis(500))
            .event_buffer(16)
            .max_line_length(256)
            .delivery(DeliveryMode::Concurrent);

        assert_eq!(config.keep_alive_timeout, Duration::from_secs(2));
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
        assert_eq!(config.event_buffer, 16);
        assert_eq!(config.max_line_length, 256);
        assert_eq!(config.delivery, DeliveryMode::Concurrent);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let base = ClientConfig::new("http://localhost/stream");
        assert!(base.clone().keep_alive_timeout(Duration::ZERO).validate().is_err());
        assert!(base.clone().connect_timeout(Duration::ZERO).validate().is_err());
        assert!(base.clone().max_line_length(0).validate().is_err());
        assert!(matches!(
            base.event_buffer(0).validate(),
            Err(StreamError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_url_is_accepted() {
        assert!(ClientConfig::new("").validate().is_ok());
    }
}
