//! Retry classification for error types.

use std::time::Duration;

/// Implemented by errors that can tell whether another attempt makes sense.
pub trait Retryable {
    /// Check if this error is worth another attempt.
    fn is_retryable(&self) -> bool;

    /// Delay suggested by the remote side, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for std::io::Error {
    fn is_retryable(&self) -> bool {
        use std::io::ErrorKind;
        matches!(
            self.kind(),
            ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::BrokenPipe
                | ErrorKind::TimedOut
                | ErrorKind::Interrupted
                | ErrorKind::UnexpectedEof
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_io_error_classification() {
        assert!(Error::from(ErrorKind::ConnectionReset).is_retryable());
        assert!(Error::from(ErrorKind::TimedOut).is_retryable());
        assert!(!Error::from(ErrorKind::PermissionDenied).is_retryable());
        assert_eq!(Error::from(ErrorKind::TimedOut).retry_after(), None);
    }
}
