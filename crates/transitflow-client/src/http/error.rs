//! Status-code classification and the call error value
//!
//! Normalizes failing upstream responses into a uniform error format carrying
//! a retryability flag derived purely from the HTTP status code.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Classify an HTTP status code as retryable or terminal.
///
/// Retryable: any 5xx, plus 408 (request timeout) and 429 (rate limited).
/// Everything else - notably the remaining 4xx family - is terminal.
pub fn classify(status: u16) -> bool {
    status >= 500 || matches!(status, 408 | 429 | 502 | 503 | 504)
}

/// A completed-but-unsuccessful HTTP exchange
#[derive(Debug, Clone)]
pub struct CallError {
    /// Human-readable message extracted from the response body
    pub message: String,
    /// Endpoint path the request targeted
    pub endpoint: String,
    /// HTTP method of the request
    pub method: String,
    /// HTTP status code, when a response was received
    pub status_code: Option<u16>,
    /// Whether the retry loop may re-attempt this call
    pub retryable: bool,
    /// When the failure was observed
    pub timestamp: DateTime<Utc>,
}

impl CallError {
    /// Build a call error from a failing response, consuming its body.
    ///
    /// The body is parsed as JSON when possible and mined for a message;
    /// otherwise the raw text is used.
    pub async fn from_response(method: &str, endpoint: &str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let details = serde_json::from_str::<Value>(&body).ok();
        let message = extract_message(details.as_ref(), &body);

        Self {
            message,
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            status_code: Some(status),
            retryable: classify(status),
            timestamp: Utc::now(),
        }
    }
}

/// Extract a human-readable error message from a response body.
///
/// Tries the structured shapes the Transitflow backends actually emit
/// (`{"message": ...}`, `{"error": {"message": ...}}`, `{"error": "..."}`)
/// before falling back to the raw body text.
pub(crate) fn extract_message(details: Option<&Value>, body: &str) -> String {
    if let Some(json) = details {
        if let Some(message) = json.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
        if let Some(error) = json.get("error") {
            if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
                return message.to_string();
            }
            if let Some(message) = error.as_str() {
                return message.to_string();
            }
        }
    }
    if body.is_empty() {
        "request failed with no response body".to_string()
    } else {
        body.to_string()
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} failed [{}]: {}",
            self.method,
            self.endpoint,
            self.status_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "no status".to_string()),
            self.message
        )
    }
}

impl std::error::Error for CallError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        assert!(classify(500));
        assert!(classify(502));
        assert!(classify(503));
        assert!(classify(504));
        assert!(classify(599));
    }

    #[test]
    fn timeout_and_rate_limit_are_retryable() {
        assert!(classify(408));
        assert!(classify(429));
    }

    #[test]
    fn other_client_errors_are_terminal() {
        for status in [400, 401, 403, 404, 409, 410, 422] {
            assert!(!classify(status), "status {status} must not be retryable");
        }
    }

    #[test]
    fn success_codes_are_not_retryable() {
        assert!(!classify(200));
        assert!(!classify(204));
        assert!(!classify(304));
    }

    #[test]
    fn message_extraction_prefers_top_level_message() {
        let json = serde_json::json!({
            "status": "error",
            "message": "Missing route data"
        });
        assert_eq!(
            extract_message(Some(&json), "raw body"),
            "Missing route data"
        );
    }

    #[test]
    fn message_extraction_handles_nested_error_object() {
        let json = serde_json::json!({
            "error": { "message": "quota exceeded", "code": "rate_limit" }
        });
        assert_eq!(extract_message(Some(&json), "raw body"), "quota exceeded");
    }

    #[test]
    fn message_extraction_handles_string_error() {
        let json = serde_json::json!({ "error": "bad geometry" });
        assert_eq!(extract_message(Some(&json), "raw body"), "bad geometry");
    }

    #[test]
    fn message_extraction_falls_back_to_raw_body() {
        assert_eq!(extract_message(None, "plain failure text"), "plain failure text");
        assert_eq!(
            extract_message(None, ""),
            "request failed with no response body"
        );
    }
}
