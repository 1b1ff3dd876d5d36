//! Resilient HTTP call layer
//!
//! This module provides the outbound call pipeline:
//! - Status-code classification into retryable vs. terminal errors
//! - Retry loop with exponential backoff and jitter
//! - Per-endpoint circuit breaking
//! - The orchestrating client with body decoding and breaker introspection
//! - A fan-out reporter receiving every terminal failure

pub mod breaker;
pub mod client;
pub mod error;
pub mod reporter;
pub mod retry;

pub use breaker::{BreakerPolicy, BreakerStatus, CircuitBreaker, CircuitState};
pub use client::{ClientConfig, RequestOptions, ResilientClient, ResponseBody};
pub use error::{classify, CallError};
pub use reporter::{ErrorReporter, SubscriptionId};
pub use retry::{compute_delay, execute_with_retry, RetryPolicy};

// Re-export commonly used transport types
pub use reqwest::{Method, StatusCode};
