//! Streaming errors.

use ssekit_retries::Retryable;
use thiserror::Error;

/// Errors returned by [`Client::run`](crate::Client::run).
#[derive(Debug, Error)]
pub enum StreamError {
    /// Another `run` is already active on this client.
    #[error("Stream already running")]
    AlreadyRunning,

    /// The stream could not be established.
    #[error("Connection failed: {cause}")]
    ConnectionFailed {
        /// What went wrong while connecting.
        #[source]
        cause: ConnectFailure,
    },

    /// The stream ended while nobody asked it to stop.
    #[error("Error reading event stream")]
    ReadError,

    /// No frame, keep-alives included, arrived within the keep-alive window.
    #[error("Timeout waiting for keep-alive")]
    Timeout,

    /// Client configuration was rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Reason a connection attempt failed.
#[derive(Debug, Error)]
pub enum ConnectFailure {
    /// The request could not be built (bad URL, header name or value).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The transport failed before a response arrived.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The server answered with something other than 200.
    #[error("unexpected status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },
}

impl StreamError {
    pub(crate) fn invalid_request(msg: impl std::fmt::Display) -> Self {
        Self::ConnectionFailed {
            cause: ConnectFailure::InvalidRequest(msg.to_string()),
        }
    }

    pub(crate) fn transport(err: reqwest::Error) -> Self {
        Self::ConnectionFailed {
            cause: ConnectFailure::Transport(err),
        }
    }

    pub(crate) fn status(status: u16) -> Self {
        Self::ConnectionFailed {
            cause: ConnectFailure::Status { status },
        }
    }

    /// Get the HTTP status if the server rejected the stream.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::ConnectionFailed {
                cause: ConnectFailure::Status { status },
            } => Some(*status),
            _ => None,
        }
    }

    /// Check if the error happened before any stream was established.
    #[must_use]
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. })
    }

    /// Check if the error ended a stream that had been established.
    #[must_use]
    pub fn is_stream_loss(&self) -> bool {
        matches!(self, Self::ReadError | Self::Timeout)
    }
}

impl Retryable for StreamError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::AlreadyRunning | Self::InvalidConfig(_) => false,
            Self::ConnectionFailed { cause } => match cause {
                ConnectFailure::InvalidRequest(_) => false,
                ConnectFailure::Transport(_) => true,
                ConnectFailure::Status { status } => {
                    *status == 429 || !(400..=499).contains(status)
                }
            },
            Self::ReadError | Self::Timeout => true,
        }
    }
}

/// Result type for streaming operations.
pub type StreamResult<T> = Result<T, StreamError>;
