//! Test error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during testing.
#[derive(Debug, Error)]
pub enum TestError {
    /// Nothing happened within the allowed time.
    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, &'static str),

    /// The peer closed the connection; carries the close code, if any.
    #[error("connection closed (code {0:?})")]
    Closed(Option<u16>),

    /// The WebSocket transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    /// Something arrived that the test did not expect.
    #[error("unexpected: {0}")]
    Unexpected(String),

    /// Response body reading failed.
    #[error("body read error: {0}")]
    BodyRead(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TestError::Timeout(Duration::from_millis(250), "close frame");
        assert_eq!(err.to_string(), "timed out after 250ms waiting for close frame");
        assert_eq!(
            TestError::Closed(Some(1000)).to_string(),
            "connection closed (code Some(1000))"
        );
    }
}
