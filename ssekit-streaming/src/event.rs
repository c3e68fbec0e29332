//! Server-Sent Events frame parsing.
//!
//! An event stream is a sequence of LF (or CRLF) terminated lines. Each line
//! is one of:
//!
//! - `event: <type>`: event type
//! - `data: <payload>`: payload line, repeated lines are joined with `\n`
//! - `id: <id>`: event id
//! - `retry: <millis>`: reconnection hint, passed through as-is
//! - `:<anything>`: comment, usually a keep-alive
//!
//! A blank line ends the frame. [`EventBuilder`] accumulates the lines of
//! one frame and turns them into an [`Event`].

use serde::de::DeserializeOwned;
use tracing::debug;

/// One parsed SSE frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    id: String,
    event_type: String,
    data: String,
    retry: i64,
}

impl Event {
    /// Create an event carrying only data.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// Set the event type.
    #[must_use]
    pub fn with_event(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    /// Set the event id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the retry hint.
    #[must_use]
    pub fn with_retry(mut self, retry: i64) -> Self {
        self.retry = retry;
        self
    }

    /// Event id, empty if the frame had none.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Event type, empty if the frame had none.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Data payload.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Retry hint in milliseconds, `0` if the frame had none.
    pub fn retry(&self) -> i64 {
        self.retry
    }

    /// Check if the server flagged this frame as an error.
    pub fn is_error(&self) -> bool {
        self.event_type == "error"
    }

    /// Check if the frame carried neither an event type nor data.
    ///
    /// Comment-only frames (keep-alives) are empty. They still prove the
    /// connection is alive but are never handed to the callback.
    pub fn is_empty(&self) -> bool {
        self.event_type.is_empty() && self.data.is_empty()
    }

    /// Parse the data as JSON.
    pub fn parse_data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.data)
    }
}

/// Accumulates the lines of one frame.
///
/// The builder is reused across frames: after [`build`](Self::build), call
/// [`reset`](Self::reset) to start the next frame while keeping the
/// allocated buffers.
#[derive(Debug, Default)]
pub struct EventBuilder {
    id: String,
    event_type: String,
    data: String,
    retry: i64,
    has_data: bool,
    lines: usize,
}

impl EventBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line, without its terminator.
    ///
    /// Unknown fields and malformed values are logged and skipped.
    pub fn add_line(&mut self, line: &str) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            return;
        }
        self.lines += 1;

        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => {
                self.event_type.clear();
                self.event_type.push_str(value);
            }
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "id" => {
                if value.contains('\0') {
                    debug!("Ignoring id containing NUL");
                    return;
                }
                self.id.clear();
                self.id.push_str(value);
            }
            "retry" => match value.trim().parse::<i64>() {
                Ok(retry) => self.retry = retry,
                Err(_) => debug!(value, "Ignoring malformed retry field"),
            },
            _ => debug!(field, "Ignoring unknown field"),
        }
    }

    /// Check if any line, comments included, was added since the last reset.
    pub fn has_content(&self) -> bool {
        self.lines > 0
    }

    /// Finalize the accumulated fields into an [`Event`].
    pub fn build(&self) -> Event {
        Event {
            id: self.id.clone(),
            event_type: self.event_type.clone(),
            data: self.data.clone(),
            retry: self.retry,
        }
    }

    /// Clear all fields so the builder can take the next frame.
    pub fn reset(&mut self) {
        self.id.clear();
        self.event_type.clear();
        self.data.clear();
        self.retry = 0;
        self.has_data = false;
        self.lines = 0;
    }
}
