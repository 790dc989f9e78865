//! Upstream error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to build
//! meaningful log entries.

use thiserror::Error;

/// Errors that can occur while talking to the upstream chat-completion API.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the upstream endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The upstream did not respond within the configured timeout.
    #[error("upstream timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// The response body could not be read to the end.
    #[error("stream error: {reason}")]
    StreamError { reason: String },

    /// Client construction or request building failed.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl InferenceError {
    /// Whether the upstream was never reached (connect refused, DNS, timeout).
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            InferenceError::ConnectionFailed { .. } | InferenceError::Timeout { .. }
        )
    }
}
