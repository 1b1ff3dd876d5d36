//! Error types for the Transitflow client library
//!
//! Every outcome of an outbound call is an explicit variant here: retry and
//! circuit-breaker logic branch on plain values, and a rejected call
//! (`CircuitOpen`) is distinguishable from a completed-but-failed exchange
//! (`Call`) by type, not by field inspection.

use thiserror::Error;

use crate::http::CallError;

/// Main error type for outbound call operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// A completed HTTP exchange with a non-success status
    #[error(transparent)]
    Call(#[from] CallError),

    /// The call was never attempted because the breaker is protecting the
    /// endpoint. Never retryable.
    #[error("circuit breaker is open for {endpoint} - failing fast")]
    CircuitOpen { endpoint: String },

    /// Transport-level failure: no HTTP response at all (connection refused,
    /// DNS failure, timeout). Bypasses retry classification and propagates
    /// on first occurrence.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Response body could not be decoded
    #[error("decode error: {message}")]
    Decode {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Client construction or configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl ClientError {
    /// Whether the retry loop may re-attempt after this error.
    ///
    /// Only a `Call` error whose status code classified as transient is
    /// retryable; circuit-open, transport, and decode failures always
    /// propagate immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Call(call) if call.retryable)
    }

    /// HTTP status code, when the error carries one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Call(call) => call.status_code,
            _ => None,
        }
    }
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::classify;
    use chrono::Utc;

    fn call_error(status: u16) -> ClientError {
        ClientError::Call(CallError {
            message: "upstream rejected the request".to_string(),
            endpoint: "/api/ml/status".to_string(),
            method: "GET".to_string(),
            status_code: Some(status),
            retryable: classify(status),
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn retryability_follows_call_classification() {
        assert!(call_error(503).is_retryable());
        assert!(!call_error(404).is_retryable());
    }

    #[test]
    fn circuit_open_is_never_retryable() {
        let err = ClientError::CircuitOpen {
            endpoint: "GET:/api/ml/status".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn transport_errors_are_never_retryable() {
        let err = ClientError::Transport {
            message: "connection refused".to_string(),
            source: None,
        };
        assert!(!err.is_retryable());
    }
}
